//! Depwire Config provides a registry of configs that can be required by dependables and path
//! operations.
//!
//! Depwire Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs
//! 2. Config<T>: A wrapper type to be able to resolve and retrieve configs
//!
//! # Examples
//!
//! ```rust
//! use depwire_config::{env, ConfigProvider};
//!
//! struct AppConfig {
//!     app_name: String,
//!     items_per_user: u32,
//! }
//!
//! fn setup_config() -> Result<ConfigProvider, Box<dyn std::error::Error>> {
//!     let app_config = AppConfig {
//!         app_name: env::get_optional_var("DEPWIRE", "APP_NAME")?
//!             .unwrap_or_else(|| "Awesome API".to_string()),
//!         items_per_user: env::get_optional_var("DEPWIRE", "ITEMS_PER_USER")?.unwrap_or(50),
//!     };
//!
//!     let mut config_provider = ConfigProvider::initialize();
//!     config_provider.add_config(app_config)?;
//!     Ok(config_provider)
//! }
//!
//! let config_provider = setup_config().unwrap();
//! let retrieved_config = config_provider.get_config::<AppConfig>().unwrap().unwrap();
//! assert!(!retrieved_config.app_name.is_empty());
//! ```
//!
//! Depwire Config consists of the following components:
//!
//! 1. Config - for requiring a config from a dependable
//! 2. Provider - for creating a registry of configs, adding and retrieving configs
//! 3. Env - for reading config values from the environment
//! 4. Errors - for config errors

pub mod config;
pub mod env;
pub mod errors;
pub mod provider;

pub use config::Config;
pub use errors::{ConfigError, EnvError};
pub use provider::ConfigProvider;
