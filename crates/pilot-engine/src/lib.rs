pub mod backend;
pub mod config;
pub mod crew;
pub mod executor;
pub mod formatter;
pub mod loader;
pub mod oracle;
pub mod planner;
pub mod report;
pub mod risk;
pub mod runner;
pub mod verifier;

pub use pilot_common::error_mapping;
pub use pilot_common::protocol;
pub use pilot_common::scenario;
