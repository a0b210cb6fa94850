use depwire_di::TypeInfo;

/// Errors when registering or retrieving a config
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The required Config is not known
    #[error("The required Config type '{0}' is not known")]
    ConfigMissing(TypeInfo),

    /// The Config is already registered
    #[error("The Config type '{0}' is already registered")]
    ConfigAlreadyRegistered(TypeInfo),
}

/// Errors when reading a config value from the environment
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("Required environment variable {0} not present")]
    Missing(String),

    #[error("Invalid value in environment variable {0}")]
    NotUnicode(String),

    #[error("Invalid type in environment variable {name}: {message}")]
    InvalidType { name: String, message: String },
}
