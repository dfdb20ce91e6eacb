pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    ArtifactsConfig, BrowserConfig, LogFormat, LoggingConfig, OracleConfig, PilotConfig,
    PlannerConfig, RunnerConfig, SecurityConfig,
};
