//! Local ad eligibility, frequency capping and serving.
//!
//! The crate decides which notification ad to show next for a user: candidate ads are
//! fetched for the user's segments, filtered by exclusion rules, gated by permission
//! rules, paced and prioritised, and finally served by a small state machine that
//! reschedules itself after every attempt.

pub mod ads;
pub mod clock;
pub mod config;
pub mod eligible_ads;
pub mod error;
pub mod frequency_capping;
pub mod history;
pub mod logging;
pub mod model;
pub mod serving;
pub mod store;

pub use ads::{Ads, AdsOptions, AdsServices};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::config_manager::{AdsConfig, ConfigManager};
pub use error::{AdsError, ConfigError};
