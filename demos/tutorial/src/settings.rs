use depwire_config::{env, EnvError};
use serde::Serialize;

const PREFIX: &str = "DEPWIRE";

/// Application settings, registered on the [depwire_config::ConfigProvider]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub app_name: String,
    pub admin_email: String,
    pub items_per_user: u32,
    #[serde(skip)]
    pub x_token: String,
    #[serde(skip)]
    pub x_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_name: "Awesome API".to_string(),
            admin_email: "admin@example.com".to_string(),
            items_per_user: 50,
            x_token: "fake-super-secret-token".to_string(),
            x_key: "fake-super-secret-key".to_string(),
        }
    }
}

impl Settings {
    /// Reads `DEPWIRE_*` variables, unset ones keep their default
    pub fn from_env() -> Result<Self, EnvError> {
        let defaults = Settings::default();
        Ok(Settings {
            app_name: env::get_optional_var(PREFIX, "APP_NAME")?.unwrap_or(defaults.app_name),
            admin_email: env::get_optional_var(PREFIX, "ADMIN_EMAIL")?
                .unwrap_or(defaults.admin_email),
            items_per_user: env::get_optional_var(PREFIX, "ITEMS_PER_USER")?
                .unwrap_or(defaults.items_per_user),
            x_token: env::get_optional_var(PREFIX, "X_TOKEN")?.unwrap_or(defaults.x_token),
            x_key: env::get_optional_var(PREFIX, "X_KEY")?.unwrap_or(defaults.x_key),
        })
    }
}
