pub mod memory;

pub use memory::{
    BrowserConditions, InMemoryAdEventStore, InMemoryAdsDatabase, InMemoryClientState,
    InMemoryServices, SimulatedAdsClient, StaticUserModelSource,
};
