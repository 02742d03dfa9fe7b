pub mod logger;
pub mod serving_log;

pub use logger::{init_tracing, LogManager};
pub use serving_log::{ExclusionLog, ServingLog};
