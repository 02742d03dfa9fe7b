//! Reminds users who keep clicking the same ad that clicks are not needed to earn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::HistoryEvent;
use crate::frequency_capping::{occurrences_within, to_time_delta};
use crate::model::adapters::{AdsClient, ReminderType};
use crate::model::{ConfirmationType, HistoryItem};

pub struct Reminder {
    ads_client: Arc<dyn AdsClient>,
    threshold: usize,
    window: Duration,
    clicks: HashMap<String, Vec<DateTime<Utc>>>,
}

impl Reminder {
    /// Fires every `threshold`-th click on one creative within `window`.
    pub fn new(ads_client: Arc<dyn AdsClient>, threshold: u32, window: Duration) -> Self {
        Self {
            ads_client,
            threshold: threshold.max(1) as usize,
            window,
            clicks: HashMap::new(),
        }
    }

    /// Counts clicks already present in persisted history.
    pub fn seed(&mut self, history_items: &[HistoryItem]) {
        for item in history_items.iter().filter(|item| is_click(item)) {
            self.clicks
                .entry(item.ad_content.creative_instance_id.clone())
                .or_default()
                .push(item.created_at);
        }
    }

    /// Returns `true` when a reminder was shown for `item`.
    pub fn on_did_add_history(&mut self, item: &HistoryItem) -> bool {
        if !is_click(item) {
            return false;
        }

        let creative_instance_id = &item.ad_content.creative_instance_id;
        let clicks = self.clicks.entry(creative_instance_id.clone()).or_default();
        clicks.push(item.created_at);
        if let Some(expired_at) = item.created_at.checked_sub_signed(to_time_delta(self.window)) {
            clicks.retain(|clicked_at| *clicked_at > expired_at);
        }
        let count = occurrences_within(clicks, item.created_at, Some(self.window));

        debug!(%creative_instance_id, count, "Clicked same ad");
        if count == 0 || count % self.threshold != 0 {
            return false;
        }
        info!(%creative_instance_id, count, "Reminding user clicks are not required");
        self.ads_client
            .show_reminder(ReminderType::ClickedSameAdMultipleTimes);
        true
    }

    /// Handles history events until the channel closes.
    pub fn spawn(mut self, mut events: broadcast::Receiver<HistoryEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(HistoryEvent::DidAddHistory(item)) => {
                        self.on_did_add_history(&item);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reminder lagged behind history events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn is_click(item: &HistoryItem) -> bool {
    item.ad_content.confirmation_type == ConfirmationType::Clicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::config::AdsConfig;
    use crate::history::HistoryManager;
    use crate::model::{Ad, CreativeAd};
    use crate::store::{BrowserConditions, InMemoryClientState, SimulatedAdsClient};
    use chrono::{TimeDelta, TimeZone};

    const WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    struct Fixture {
        clock: Arc<MockClock>,
        ads_client: Arc<SimulatedAdsClient>,
        history: HistoryManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let ads_client = Arc::new(SimulatedAdsClient::new(BrowserConditions::default()));
        let history = HistoryManager::new(
            Arc::new(AdsConfig::default()),
            Arc::new(InMemoryClientState::new()),
            clock.clone(),
        );
        Fixture {
            clock,
            ads_client,
            history,
        }
    }

    fn ad(creative_instance_id: &str) -> Ad {
        Ad::build(&CreativeAd::notification(creative_instance_id, "cs-1", "finance"))
    }

    fn click(fixture: &Fixture, reminder: &mut Reminder, ad: &Ad) -> bool {
        fixture.clock.advance(TimeDelta::minutes(1));
        let item = fixture.history.add(ad, ConfirmationType::Clicked).unwrap();
        reminder.on_did_add_history(&item)
    }

    #[test]
    fn fires_every_nth_click_on_same_ad() {
        let fixture = fixture();
        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, WINDOW);
        let ad = ad("ci-1");

        let fired: Vec<bool> = (0..6).map(|_| click(&fixture, &mut reminder, &ad)).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
        assert_eq!(fixture.ads_client.reminders().len(), 2);
    }

    #[test]
    fn clicks_on_other_ads_do_not_count() {
        let fixture = fixture();
        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, WINDOW);
        assert!(!click(&fixture, &mut reminder, &ad("ci-1")));
        assert!(!click(&fixture, &mut reminder, &ad("ci-2")));
        assert!(!click(&fixture, &mut reminder, &ad("ci-1")));
        assert!(fixture.ads_client.reminders().is_empty());
    }

    #[test]
    fn views_are_ignored() {
        let fixture = fixture();
        let mut reminder = Reminder::new(fixture.ads_client.clone(), 1, WINDOW);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        assert!(!reminder.on_did_add_history(&item));
    }

    #[test]
    fn clicks_outside_window_are_forgotten() {
        let fixture = fixture();
        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, Duration::from_secs(60 * 60));
        let ad = ad("ci-1");
        click(&fixture, &mut reminder, &ad);
        click(&fixture, &mut reminder, &ad);
        fixture.clock.advance(TimeDelta::hours(2));
        assert!(!click(&fixture, &mut reminder, &ad));
    }

    #[test]
    fn seeded_history_counts_towards_threshold() {
        let fixture = fixture();
        let ad = ad("ci-1");
        let mut scratch = Reminder::new(fixture.ads_client.clone(), 100, WINDOW);
        click(&fixture, &mut scratch, &ad);
        click(&fixture, &mut scratch, &ad);

        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, WINDOW);
        reminder.seed(&fixture.history.items());
        assert!(click(&fixture, &mut reminder, &ad));
    }

    #[test]
    fn zero_window_never_fires() {
        let fixture = fixture();
        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, Duration::ZERO);
        let ad = ad("ci-1");
        for _ in 0..3 {
            assert!(!click(&fixture, &mut reminder, &ad));
        }
        assert!(fixture.ads_client.reminders().is_empty());
    }

    #[test]
    fn seeded_clicks_out_of_order_are_counted_by_time() {
        let fixture = fixture();
        let ad = ad("ci-1");
        let now = fixture.clock.now();
        let mut seeded = Vec::new();
        for age in [TimeDelta::hours(1), TimeDelta::days(40), TimeDelta::hours(2)] {
            let mut item = fixture.history.add(&ad, ConfirmationType::Clicked).unwrap();
            item.created_at = now - age;
            seeded.push(item);
        }

        let mut reminder = Reminder::new(fixture.ads_client.clone(), 3, WINDOW);
        reminder.seed(&seeded);
        assert!(click(&fixture, &mut reminder, &ad));
        let kept = &reminder.clicks["ci-1"];
        assert_eq!(kept.len(), 3);
        assert!(!kept.contains(&(now - TimeDelta::days(40))));
    }

    #[tokio::test]
    async fn spawned_reminder_listens_to_history() {
        let fixture = fixture();
        let reminder = Reminder::new(fixture.ads_client.clone(), 3, WINDOW);
        let handle = reminder.spawn(fixture.history.subscribe());

        let ad = ad("ci-1");
        for _ in 0..3 {
            fixture.history.add(&ad, ConfirmationType::Clicked);
        }
        drop(fixture.history);
        handle.await.unwrap();
        assert_eq!(
            fixture.ads_client.reminders(),
            vec![ReminderType::ClickedSameAdMultipleTimes]
        );
    }
}
