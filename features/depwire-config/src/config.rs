use std::{ops::Deref, sync::Arc};

use depwire_di::{Arguments, Dependable, DynError, Injectable, Requirement, TypeInfo};

use crate::{errors::ConfigError, provider::ConfigProvider};

/// A wrapper type to allow for config injections
///
/// This provides a simple way to retrieve configs from the config registry,
/// and require them from a dependable or a path operation
///
/// # Example
/// ```rust
/// use depwire_config::{Config, ConfigProvider};
/// use depwire_di::{App, Arguments, PathOperation, RequestParts};
///
/// pub struct Settings {
///     app_name: String,
/// }
///
/// let mut config_provider = ConfigProvider::initialize();
/// config_provider
///     .add_config(Settings { app_name: "Awesome API".to_string() })
///     .unwrap();
///
/// let info = PathOperation::new("info", |args: Arguments| async move {
///     let settings = args.get::<Config<Settings>>("settings")?;
///     Ok::<_, depwire_di::DynError>(settings.app_name.clone())
/// })
/// .requires(Config::<Settings>::requirement("settings"));
///
/// let app = App::builder().add_instance(config_provider).build();
/// let response = futures::executor::block_on(app.serve(&info, RequestParts::builder().build()));
/// assert_eq!(response.body, "Awesome API");
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// The dependable producing `Config<T>` from the registered [ConfigProvider]
    ///
    /// Keyed by type, so every declaration shares one value per request.
    pub fn dependable() -> Dependable {
        Dependable::plain(std::any::type_name::<Config<T>>(), |args: Arguments| async move {
            let config_provider = args.get::<ConfigProvider>("config_provider")?;

            let config: Arc<T> = config_provider
                .get_config::<T>()?
                .ok_or(ConfigError::ConfigMissing(TypeInfo::of::<T>()))?;

            Ok::<_, DynError>(Config { inner: config })
        })
        .requires(Requirement::state::<ConfigProvider>("config_provider"))
        .keyed::<Config<T>>()
        .build()
    }

    /// Requires `Config<T>` under `name`
    pub fn requirement(name: &str) -> Requirement {
        Requirement::depends(name, &Self::dependable())
    }
}
