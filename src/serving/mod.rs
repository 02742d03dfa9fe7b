//! The serve-next-ad state machine.
//!
//! At most one attempt is in flight at a time; a second call while serving returns
//! [`ServeAdOutcome::AlreadyServing`] without side effects. Every failure schedules
//! exactly one retry after `retry_serving_ad_after`.

pub mod delay;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use crate::ads::AdsServices;
use crate::config::AdsConfig;
use crate::eligible_ads::EligibleAds;
use crate::error::{AdsError, ConfigError, FailureReason, ServeAdOutcome};
use crate::frequency_capping::permission_rules::{PermissionContext, PermissionRules};
use crate::frequency_capping::to_time_delta;
use crate::history::HistoryManager;
use crate::logging::{LogManager, ServingLog};
use crate::model::{Ad, AdEvent, AdType, ConfirmationType};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ServingEvent {
    /// Inventory existed for the user; carries the user's top segments.
    OpportunityAroseToServeAd { segments: Vec<String> },
    DidServeAd(Ad),
    FailedToServeAd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingState {
    Idle,
    Serving,
    Scheduled(DateTime<Utc>),
}

/// Clears the in-flight flag when the attempt ends, including on cancellation.
struct ServingGuard<'a>(&'a AtomicBool);

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Serving {
    ad_type: AdType,
    config: Arc<AdsConfig>,
    services: AdsServices,
    eligible_ads: EligibleAds,
    permission_rules: PermissionRules,
    history: Arc<HistoryManager>,
    is_serving: AtomicBool,
    serve_ad_at: Mutex<Option<DateTime<Utc>>>,
    rearm: Notify,
    events: broadcast::Sender<ServingEvent>,
    audit_log: Option<Arc<LogManager>>,
}

impl Serving {
    pub fn new(
        config: Arc<AdsConfig>,
        services: AdsServices,
        history: Arc<HistoryManager>,
    ) -> Result<Self, ConfigError> {
        let eligible_ads = EligibleAds::new(config.clone(), services.clone())?;
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            ad_type: AdType::NotificationAd,
            config,
            services,
            eligible_ads,
            permission_rules: PermissionRules::notification_ads(),
            history,
            is_serving: AtomicBool::new(false),
            serve_ad_at: Mutex::new(None),
            rearm: Notify::new(),
            events,
            audit_log: None,
        })
    }

    /// Writes a [`ServingLog`] line for every attempt.
    pub fn with_audit_log(mut self, audit_log: Arc<LogManager>) -> Self {
        self.audit_log = Some(audit_log);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServingEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ServingState {
        if self.is_serving.load(Ordering::SeqCst) {
            return ServingState::Serving;
        }
        match *self.lock_schedule() {
            Some(serve_ad_at) => ServingState::Scheduled(serve_ad_at),
            None => ServingState::Idle,
        }
    }

    /// Arms the timer unless it is already running. Returns the scheduled time.
    pub fn start_serving_ads_at_regular_intervals(&self) -> DateTime<Utc> {
        if let Some(serve_ad_at) = *self.lock_schedule() {
            debug!(%serve_ad_at, "Already serving ads at regular intervals");
            return serve_ad_at;
        }
        let now = self.services.clock.now();
        let delay = delay::initial_delay(&self.config, self.services.client_state.serve_ad_at(), now);
        info!(delay_secs = delay.as_secs(), "Start serving ads at regular intervals");
        self.schedule_after(delay)
    }

    /// Cancels the timer. Idempotent.
    pub fn stop_serving_ads_at_regular_intervals(&self) {
        if self.lock_schedule().take().is_some() {
            info!("Stopped serving ads at regular intervals");
        }
        self.rearm.notify_one();
    }

    /// Arms the timer for an explicit time.
    pub fn schedule_serve_ad_at(&self, serve_ad_at: DateTime<Utc>) {
        *self.lock_schedule() = Some(serve_ad_at);
        self.services.client_state.set_serve_ad_at(Some(serve_ad_at));
        debug!(%serve_ad_at, "Scheduled ad serving");
        self.rearm.notify_one();
    }

    /// Reacts to a change of the maximum ads per hour preference.
    pub fn on_maximum_ads_per_hour_changed(&self) {
        let maximum_ads_per_hour = self.services.ads_client.maximum_notification_ads_per_hour();
        match delay::regular_interval(maximum_ads_per_hour) {
            None => self.stop_serving_ads_at_regular_intervals(),
            Some(interval) if self.config.should_serve_at_regular_intervals() => {
                info!(maximum_ads_per_hour, "Maximum ads per hour changed");
                self.schedule_after(interval);
            }
            Some(_) => {}
        }
    }

    /// Runs one serving attempt.
    pub async fn maybe_serve_ad(&self) -> ServeAdOutcome {
        let mut log = ServingLog::new(self.ad_type, self.services.clock.now());

        if self
            .is_serving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Already serving an ad");
            log.set_already_serving();
            self.write_audit_log(&log).await;
            return ServeAdOutcome::AlreadyServing;
        }
        let guard = ServingGuard(&self.is_serving);

        let outcome = match self.serve_ad(&mut log).await {
            Ok(ad) => {
                log.set_served(&ad);
                // The ad must count against caps before another attempt may start.
                self.record_served_ad(&ad).await;
                drop(guard);
                self.successfully_served_ad(&ad);
                ServeAdOutcome::Served(ad)
            }
            Err(reason) => {
                drop(guard);
                log.set_failed(reason.to_string());
                self.failed_to_serve_ad(&reason);
                ServeAdOutcome::Failed(reason)
            }
        };
        self.write_audit_log(&log).await;
        outcome
    }

    /// Serves whenever the timer comes due, until `shutdown` completes.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let serve_ad_at = *self.lock_schedule();
            let sleep_for = serve_ad_at.map(|serve_ad_at| {
                (serve_ad_at - self.services.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Ad serving driver stopped");
                    break;
                }
                _ = self.rearm.notified() => continue,
                _ = tokio::time::sleep(sleep_for.unwrap_or(Duration::ZERO)), if sleep_for.is_some() => {
                    if self.take_due_schedule() {
                        self.maybe_serve_ad().await;
                    }
                }
            }
        }
    }

    async fn serve_ad(&self, log: &mut ServingLog) -> Result<Ad, FailureReason> {
        let services = &self.services;
        let now = services.clock.now();
        let served_ad_events = services
            .ad_event_store
            .get_ad_events(
                Some(self.ad_type),
                Some(ConfirmationType::Served),
                Some(now - TimeDelta::days(1)),
            )
            .await
            .map_err(|e| FailureReason::Collaborator(e.to_string()))?;

        let context = PermissionContext {
            ads_client: services.ads_client.as_ref(),
            config: &self.config,
            served_ad_events: &served_ad_events,
            now,
            local_now: services.clock.local_now(),
        };
        self.permission_rules
            .has_permission(&context)
            .map_err(|denied| FailureReason::PermissionDenied(denied.to_string()))?;

        let user_model = services.user_model_source.build_user_model().await;
        let eligible = self
            .eligible_ads
            .get_for_user_model(&user_model)
            .await
            .map_err(|e| FailureReason::Collaborator(e.to_string()))?;
        log.set_eligible(
            eligible.had_opportunity,
            eligible.creative_ads.len(),
            &eligible.excluded_counts,
        );

        if eligible.had_opportunity {
            let segments = user_model.top_segments(self.config.top_segments_count);
            log.segments = segments.clone();
            self.notify(ServingEvent::OpportunityAroseToServeAd { segments });
        }

        if eligible.creative_ads.is_empty() {
            return Err(FailureReason::NoEligibleAds);
        }
        let index = services.random.index(eligible.creative_ads.len());
        let ad = Ad::build(&eligible.creative_ads[index]);
        ad.validate().map_err(|e| match e {
            AdsError::InvalidAd(message) => FailureReason::InvalidAd(message),
            other => FailureReason::InvalidAd(other.to_string()),
        })?;
        Ok(ad)
    }

    async fn record_served_ad(&self, ad: &Ad) {
        let services = &self.services;
        let now = services.clock.now();
        if let Err(e) = services
            .ad_event_store
            .record_ad_event(AdEvent::new(ad, ConfirmationType::Served, now))
            .await
        {
            warn!(error = %e, placement_id = %ad.placement_id, "Failed to record served ad event");
        }
        self.history.add(ad, ConfirmationType::Served);
        services
            .client_state
            .mark_ad_as_seen(ad.ad_type, &ad.creative_instance_id);
        services.client_state.set_last_served_ad(ad);

        info!(
            placement_id = %ad.placement_id,
            creative_instance_id = %ad.creative_instance_id,
            segment = %ad.segment,
            "Served ad"
        );
    }

    fn successfully_served_ad(&self, ad: &Ad) {
        self.notify(ServingEvent::DidServeAd(ad.clone()));

        if !self.config.should_serve_at_regular_intervals() {
            self.lock_schedule().take();
            return;
        }
        let maximum_ads_per_hour = self
            .services
            .ads_client
            .maximum_notification_ads_per_hour();
        match delay::regular_interval(maximum_ads_per_hour) {
            Some(interval) => {
                self.schedule_after(interval);
            }
            None => self.stop_serving_ads_at_regular_intervals(),
        }
    }

    fn failed_to_serve_ad(&self, reason: &FailureReason) {
        info!(%reason, "Failed to serve ad");
        self.notify(ServingEvent::FailedToServeAd);
        let serve_ad_at = self.schedule_after(self.config.retry_serving_ad_after);
        debug!(%serve_ad_at, "Retry serving ad at next interval");
    }

    fn schedule_after(&self, delay: Duration) -> DateTime<Utc> {
        let serve_ad_at = self
            .services
            .clock
            .now()
            .checked_add_signed(to_time_delta(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule_serve_ad_at(serve_ad_at);
        serve_ad_at
    }

    fn take_due_schedule(&self) -> bool {
        let mut schedule = self.lock_schedule();
        match *schedule {
            Some(serve_ad_at) if serve_ad_at <= self.services.clock.now() => {
                *schedule = None;
                true
            }
            _ => false,
        }
    }

    fn notify(&self, event: ServingEvent) {
        if self.events.send(event).is_err() {
            debug!("No serving observers");
        }
    }

    async fn write_audit_log(&self, log: &ServingLog) {
        if let Some(audit_log) = &self.audit_log {
            audit_log.log_record(log).await;
        }
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.serve_ad_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}
