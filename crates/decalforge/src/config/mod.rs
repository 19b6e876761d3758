pub mod loader;
pub mod schema;
pub mod secrets;

pub use loader::{apply_env_overrides, load, load_config, load_config_from_str, validate_config};
pub use schema::{
    ApiKeySource, AppConfig, OpenAiConfig, ReplicateConfig, TimeoutConfig, DEFAULT_PROVIDER,
};
