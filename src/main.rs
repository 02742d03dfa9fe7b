use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use clap::Parser;
use tokio::signal;
use tokio::sync::{broadcast::error::RecvError, oneshot};
use tracing::{info, warn};

use brave_ads_serving::ads::{Ads, AdsOptions, AdsServices};
use brave_ads_serving::clock::{MockClock, SystemClock};
use brave_ads_serving::config::ConfigManager;
use brave_ads_serving::eligible_ads::pacing::{RandomSource, SeededRandom, ThreadRandom};
use brave_ads_serving::error::ServeAdOutcome;
use brave_ads_serving::frequency_capping::exclusion_rules::AntiTargetingResource;
use brave_ads_serving::logging::{init_tracing, LogManager};
use brave_ads_serving::model::adapters::load_catalog;
use brave_ads_serving::model::{ConfirmationType, CreativeAd, UserModel};
use brave_ads_serving::serving::ServingEvent;
use brave_ads_serving::store::{
    BrowserConditions, InMemoryAdEventStore, InMemoryAdsDatabase, InMemoryClientState,
    InMemoryServices, SimulatedAdsClient, StaticUserModelSource,
};

#[derive(Parser, Debug)]
#[command(version, about = "Simulates local notification ad serving against a JSON catalog")]
struct CliArgs {
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = "static/catalog.json")]
    catalog: PathBuf,
    /// Missing file means defaults; `BRAVE_ADS_*` variables override it.
    #[arg(long, default_value = "static/ads_config.json")]
    config: PathBuf,
    #[arg(long)]
    anti_targeting: Option<PathBuf>,
    #[arg(long)]
    browser_conditions: Option<PathBuf>,
    /// Interest segments of the simulated user, comma separated.
    #[arg(long, value_delimiter = ',')]
    segments: Vec<String>,
    /// Serving attempts on the mock clock.
    #[arg(short, long, default_value_t = 10)]
    attempts: u32,
    /// Mock clock advance between attempts.
    #[arg(long, default_value_t = 10)]
    advance_minutes: i64,
    /// Click every served ad, to exercise caps and the reminder.
    #[arg(long)]
    click: bool,
    /// Serve on the system clock until Ctrl-C instead of running attempts.
    #[arg(long)]
    realtime: bool,
    #[arg(long)]
    seed: Option<u64>,
}

struct Fixtures {
    catalog: Vec<CreativeAd>,
    conditions: BrowserConditions,
    anti_targeting: AntiTargetingResource,
    user_model: UserModel,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let _guard = init_tracing(&args.log_dir, "brave_ads.json")?;
    info!(?args, "Ads simulator starting");

    let config = ConfigManager::load(&args.config)?.config().clone();
    let fixtures = load_fixtures(&args)?;
    info!(creative_ads = fixtures.catalog.len(), "Loaded catalog");

    let audit_log = LogManager::new(
        &args.log_dir,
        "serving_log.json",
        1000,
        100,
        Duration::from_secs(1),
    );
    let options = AdsOptions {
        audit_log: Some(audit_log.clone()),
        ..AdsOptions::default()
    };
    let random: Arc<dyn RandomSource> = match args.seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(ThreadRandom),
    };

    if args.realtime {
        run_realtime(&args, config, fixtures, options, random).await?;
    } else {
        run_attempts(&args, config, fixtures, options, random).await?;
    }

    audit_log.shutdown().await;
    info!("Ads simulator stopped");
    Ok(())
}

fn load_fixtures(args: &CliArgs) -> Result<Fixtures, Box<dyn Error>> {
    let conditions = match &args.browser_conditions {
        Some(path) => read_json(path)?,
        None => BrowserConditions::default(),
    };
    let anti_targeting = match &args.anti_targeting {
        Some(path) => AntiTargetingResource::load(path)?,
        None => AntiTargetingResource::default(),
    };
    Ok(Fixtures {
        catalog: load_catalog(&args.catalog)?,
        conditions,
        anti_targeting,
        user_model: UserModel::with_interest_segments(args.segments.iter().cloned()),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Runs a fixed number of attempts, advancing a mock clock between them.
async fn run_attempts(
    args: &CliArgs,
    config: brave_ads_serving::AdsConfig,
    fixtures: Fixtures,
    options: AdsOptions,
    random: Arc<dyn RandomSource>,
) -> Result<(), Box<dyn Error>> {
    let harness = InMemoryServices::new(
        fixtures.catalog,
        fixtures.conditions,
        MockClock::new(Utc::now()),
    )
    .with_random(random)
    .with_anti_targeting(fixtures.anti_targeting);
    harness.user_model_source.set(fixtures.user_model);

    let ads = Ads::with_options(config, harness.services(), options)?;
    let _reminder = ads.spawn_reminder();

    for attempt in 1..=args.attempts {
        match ads.serving().maybe_serve_ad().await {
            ServeAdOutcome::Served(ad) => {
                println!("{}", serde_json::to_string(&ad)?);
                if args.click {
                    ads.trigger_ad_event(&ad.placement_id, ConfirmationType::Clicked)
                        .await?;
                }
            }
            ServeAdOutcome::Failed(reason) => info!(attempt, %reason, "No ad served"),
            ServeAdOutcome::AlreadyServing => {}
        }
        harness
            .clock
            .advance(TimeDelta::minutes(args.advance_minutes));
    }

    for reminder in harness.ads_client.reminders() {
        info!(?reminder, "Reminder shown");
    }
    Ok(())
}

/// Serves on the system clock until Ctrl-C.
async fn run_realtime(
    args: &CliArgs,
    config: brave_ads_serving::AdsConfig,
    fixtures: Fixtures,
    options: AdsOptions,
    random: Arc<dyn RandomSource>,
) -> Result<(), Box<dyn Error>> {
    let mut conditions = fixtures.conditions;
    conditions.catalog_last_updated_at.get_or_insert_with(Utc::now);
    let services = AdsServices {
        database: Arc::new(InMemoryAdsDatabase::new(fixtures.catalog)),
        ad_event_store: Arc::new(InMemoryAdEventStore::new()),
        user_model_source: Arc::new(StaticUserModelSource::new(fixtures.user_model)),
        ads_client: Arc::new(SimulatedAdsClient::new(conditions)),
        client_state: Arc::new(InMemoryClientState::new()),
        clock: Arc::new(SystemClock),
        random,
        anti_targeting: Arc::new(fixtures.anti_targeting),
    };

    let ads = Ads::with_options(config, services, options)?;
    let _reminder = ads.spawn_reminder();
    let (stop, stopped) = oneshot::channel::<()>();
    let driver = ads.spawn_driver(async move {
        let _ = stopped.await;
    });

    // Desktop has no interval timer; stand in for the browser's next trigger.
    let on_demand_every = TimeDelta::minutes(args.advance_minutes);
    let serving = ads.serving().clone();
    let mut events = serving.subscribe();
    let printer = tokio::spawn({
        let on_demand = ads.start().is_none();
        async move {
            if on_demand {
                serving.schedule_serve_ad_at(Utc::now());
            }
            loop {
                match events.recv().await {
                    Ok(ServingEvent::DidServeAd(ad)) => {
                        match serde_json::to_string(&ad) {
                            Ok(json) => println!("{json}"),
                            Err(e) => warn!(error = %e, "Failed to print served ad"),
                        }
                        if on_demand {
                            serving.schedule_serve_ad_at(Utc::now() + on_demand_every);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped serving events"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    signal::ctrl_c().await?;
    info!("Shutting down gracefully...");
    let _ = stop.send(());
    driver.await?;
    printer.abort();
    Ok(())
}
