use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::AdsConfig;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Delay before the first attempt after serving starts.
///
/// Without a persisted serve time this is the first run. A persisted time in the past
/// (or closer than the minimum delay) is clamped to the minimum delay.
pub fn initial_delay(
    config: &AdsConfig,
    persisted_serve_ad_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(serve_ad_at) = persisted_serve_ad_at else {
        return config.serve_first_ad_after;
    };
    let remaining = (serve_ad_at - now).to_std().unwrap_or(Duration::ZERO);
    remaining.max(config.minimum_delay_before_serving)
}

/// Interval between ads when serving at regular intervals, `None` when ads are off.
pub fn regular_interval(maximum_ads_per_hour: u32) -> Option<Duration> {
    if maximum_ads_per_hour == 0 {
        return None;
    }
    Some(HOUR / maximum_ads_per_hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_run_waits_longer() {
        let config = AdsConfig::default();
        assert_eq!(initial_delay(&config, None, now()), Duration::from_secs(120));
    }

    #[test]
    fn past_serve_time_clamps_to_minimum_delay() {
        let config = AdsConfig::default();
        let past = now() - TimeDelta::hours(3);
        assert_eq!(initial_delay(&config, Some(past), now()), Duration::from_secs(60));
    }

    #[test]
    fn future_serve_time_is_kept() {
        let config = AdsConfig::default();
        let future = now() + TimeDelta::minutes(10);
        assert_eq!(initial_delay(&config, Some(future), now()), Duration::from_secs(600));
    }

    #[test]
    fn interval_divides_the_hour() {
        assert_eq!(regular_interval(4), Some(Duration::from_secs(15 * 60)));
        assert_eq!(regular_interval(0), None);
    }
}
