use std::{any::TypeId, collections::HashMap, sync::Arc};

use depwire_di::{Injectable, Instance, TypeInfo};

use crate::errors::ConfigError;

/// A provider to register all configs.
///
/// Configs can be registered and retrieved based on type.
/// Register the provider itself as an application instance to make [crate::Config] resolvable.
#[derive(Default, Debug)]
pub struct ConfigProvider {
    configs: HashMap<TypeId, Instance>,
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn initialize() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type.
    ///
    /// Returns `Ok(None)` if the config type was never registered
    pub fn get_config<T: Injectable>(&self) -> Result<Option<Arc<T>>, ConfigError> {
        let info = TypeInfo::of::<T>();

        self.configs
            .get(&info.type_id)
            .map(|entry| entry.downcast())
            .transpose()
            .map_err(|_| ConfigError::ConfigMissing(info))
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return a
    /// [`ConfigError`] runtime error
    pub fn add_config<T: Injectable>(&mut self, config: T) -> Result<&mut Self, ConfigError> {
        let info = TypeInfo::of::<T>();

        if self.configs.contains_key(&info.type_id) {
            return Err(ConfigError::ConfigAlreadyRegistered(info));
        }

        tracing::debug!("Registered config {}", info);
        self.configs.insert(info.type_id, Instance::new(config));
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Injectable>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Settings {
        admin_email: String,
    }

    #[test]
    fn add_and_get() {
        let mut provider = ConfigProvider::initialize();
        provider
            .add_config(Settings {
                admin_email: "admin@example.com".to_string(),
            })
            .unwrap()
            .maybe_add_config::<u16>(None)
            .unwrap();

        let settings = provider.get_config::<Settings>().unwrap().unwrap();
        assert_eq!(settings.admin_email, "admin@example.com");
        assert_eq!(provider.get_config::<u16>(), Ok(None));
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut provider = ConfigProvider::initialize();
        provider.add_config(8080_u16).unwrap();

        assert_eq!(
            provider.add_config(9090_u16).unwrap_err(),
            ConfigError::ConfigAlreadyRegistered(TypeInfo::of::<u16>())
        );
        assert_eq!(*provider.get_config::<u16>().unwrap().unwrap(), 8080);
    }
}
