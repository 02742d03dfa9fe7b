use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};

use super::*;
use crate::config::Platform;
use crate::model::{Ad, AdEvent, ConfirmationType, CreativeAd};
use crate::store::{BrowserConditions, SimulatedAdsClient};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn client() -> SimulatedAdsClient {
    SimulatedAdsClient::new(BrowserConditions {
        catalog_last_updated_at: Some(now() - TimeDelta::hours(1)),
        ..BrowserConditions::default()
    })
}

fn served_events(ages: &[TimeDelta]) -> Vec<AdEvent> {
    let ad = Ad::build(&CreativeAd::notification("ci-1", "cs-1", "finance"));
    ages.iter()
        .map(|age| AdEvent::new(&ad, ConfirmationType::Served, now() - *age))
        .collect()
}

fn check(
    client: &SimulatedAdsClient,
    config: &AdsConfig,
    served_ad_events: &[AdEvent],
    local_now: DateTime<FixedOffset>,
) -> Result<(), PermissionDenied> {
    let context = PermissionContext {
        ads_client: client,
        config,
        served_ad_events,
        now: now(),
        local_now,
    };
    PermissionRules::notification_ads().has_permission(&context)
}

fn denied_rule(result: Result<(), PermissionDenied>) -> &'static str {
    result.expect_err("expected permission to be denied").rule
}

#[test]
fn allows_when_every_condition_holds() {
    assert!(check(&client(), &AdsConfig::default(), &[], now().fixed_offset()).is_ok());
}

#[test]
fn feature_gate_runs_first() {
    let client = client();
    client.update(|c| c.network_connection_available = false);
    let config = AdsConfig {
        serving_enabled: false,
        ..AdsConfig::default()
    };
    assert_eq!(denied_rule(check(&client, &config, &[], now().fixed_offset())), "feature_enabled");
}

#[test]
fn unsupported_version_is_denied() {
    let config = AdsConfig {
        minimum_browser_version: 200,
        ..AdsConfig::default()
    };
    assert_eq!(
        denied_rule(check(&client(), &config, &[], now().fixed_offset())),
        "supported_version"
    );
}

#[test]
fn denials_follow_rule_order() {
    let client = client();
    client.update(|c| {
        c.full_screen = true;
        c.media_playing = true;
    });
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &[], now().fixed_offset())),
        "full_screen_mode"
    );
}

#[test]
fn stale_or_missing_catalog_is_denied() {
    let client = client();
    client.update(|c| c.catalog_last_updated_at = Some(now() - TimeDelta::days(2)));
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &[], now().fixed_offset())),
        "catalog"
    );
    client.update(|c| c.catalog_last_updated_at = None);
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &[], now().fixed_offset())),
        "catalog"
    );
}

#[test]
fn low_token_balance_triggers_refill() {
    let client = client();
    client.update(|c| c.unblinded_tokens = 3);
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &[], now().fixed_offset())),
        "unblinded_tokens"
    );
    assert_eq!(client.refill_requests(), 1);
}

#[test]
fn user_activity_below_threshold_is_denied() {
    let client = client();
    client.update(|c| c.user_activity_score = 0.5);
    let config = AdsConfig {
        user_activity_threshold: 2.0,
        ..AdsConfig::default()
    };
    assert_eq!(denied_rule(check(&client, &config, &[], now().fixed_offset())), "user_activity");
}

#[test]
fn ads_per_hour_and_minimum_wait_time_on_desktop() {
    let client = client();
    client.update(|c| c.maximum_ads_per_hour = 2);

    // 30 minute minimum wait; last ad 10 minutes ago.
    let events = served_events(&[TimeDelta::minutes(10)]);
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &events, now().fixed_offset())),
        "minimum_wait_time"
    );

    let events = served_events(&[TimeDelta::minutes(31)]);
    assert!(check(&client, &AdsConfig::default(), &events, now().fixed_offset()).is_ok());

    let events = served_events(&[TimeDelta::minutes(31), TimeDelta::minutes(50)]);
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &events, now().fixed_offset())),
        "ads_per_hour"
    );
}

#[test]
fn ads_per_day_applies_on_every_platform() {
    let client = client();
    client.update(|c| c.maximum_ads_per_day = 2);
    let events = served_events(&[TimeDelta::hours(2), TimeDelta::hours(20)]);
    for platform in [Platform::Desktop, Platform::Android] {
        let config = AdsConfig {
            platform,
            ..AdsConfig::default()
        };
        assert_eq!(
            denied_rule(check(&client, &config, &events, now().fixed_offset())),
            "ads_per_day"
        );
    }
}

#[test]
fn mobile_bypasses_desktop_only_rules() {
    let client = client();
    client.update(|c| c.maximum_ads_per_hour = 1);
    let config = AdsConfig {
        platform: Platform::Android,
        ..AdsConfig::default()
    };
    let events = served_events(&[TimeDelta::minutes(1)]);
    assert!(check(&client, &config, &events, now().fixed_offset()).is_ok());
}

#[test]
fn do_not_disturb_at_night_on_mobile_when_backgrounded() {
    let client = client();
    client.update(|c| c.browser_active = false);
    let config = AdsConfig {
        platform: Platform::Android,
        ..AdsConfig::default()
    };
    let offset = FixedOffset::east_opt(0).unwrap();
    let night = offset.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap();
    let early = offset.with_ymd_and_hms(2024, 5, 1, 5, 59, 0).unwrap();
    let morning = offset.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();

    assert_eq!(denied_rule(check(&client, &config, &[], night)), "do_not_disturb");
    assert_eq!(denied_rule(check(&client, &config, &[], early)), "do_not_disturb");
    assert!(check(&client, &config, &[], morning).is_ok());

    client.update(|c| c.browser_active = true);
    assert!(check(&client, &config, &[], night).is_ok());
}

#[test]
fn inactive_browser_is_denied_on_desktop_only() {
    let client = client();
    client.update(|c| c.browser_active = false);
    assert_eq!(
        denied_rule(check(&client, &AdsConfig::default(), &[], now().fixed_offset())),
        "browser_is_active"
    );
}
