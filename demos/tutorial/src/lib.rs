//! A tutorial application served through Depwire DI.
//!
//! Every chapter of the tutorial is a set of [PathOperation]s registered on one [Router]:
//! shared query parameters, sub dependencies, decorator dependencies, route groups, security,
//! database sessions, background tasks, testing with overrides and custom error handlers.

pub mod catalog;
pub mod db;
pub mod dependencies;
pub mod notifications;
pub mod operations;
pub mod router;
pub mod security;
pub mod settings;
pub mod store;

use std::sync::Arc;

use depwire_config::{ConfigError, ConfigProvider, EnvError};
use depwire_di::{App, DependencyGraphErrors, PathOperation};
use http::Method;

use crate::{
    catalog::Catalog,
    dependencies::{verify_token, ValueCounter},
    notifications::NotificationLog,
    operations::*,
    router::{RouteGroup, Router},
    settings::Settings,
    store::Store,
};

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("Failed to register route: {0}")]
    Route(#[from] matchit::InsertError),
    #[error(transparent)]
    Graph(#[from] DependencyGraphErrors),
}

/// The application together with the state it shares between requests
pub struct Tutorial {
    pub app: App,
    pub router: Router,
    pub store: Arc<Store>,
    pub notifications: Arc<NotificationLog>,
    pub catalog: Arc<Catalog>,
    pub values: Arc<ValueCounter>,
}

impl Tutorial {
    pub fn new(settings: Settings) -> Result<Self, SetupError> {
        let store = Arc::new(Store::new());
        let notifications = Arc::new(NotificationLog::new());
        let catalog = Arc::new(Catalog::default());
        let values = Arc::new(ValueCounter::new());

        let mut config_provider = ConfigProvider::initialize();
        config_provider.add_config(settings)?;

        let app = App::builder()
            .add_instance(config_provider)
            .add_shared_instance(store.clone())
            .add_shared_instance(notifications.clone())
            .add_shared_instance(catalog.clone())
            .add_shared_instance(values.clone())
            .on_error::<UnicornError, _>(unicorn_response)
            .build();

        let tutorial = Tutorial {
            app,
            router: routes()?,
            store,
            notifications,
            catalog,
            values,
        };
        tutorial.check()?;
        Ok(tutorial)
    }

    /// Reads the settings from the environment
    pub fn from_env() -> Result<Self, SetupError> {
        Self::new(Settings::from_env()?)
    }

    /// Checks the dependency graph of every routed operation
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        self.router
            .operations()
            .try_for_each(|operation: &PathOperation| self.app.check(operation).map(|_| ()))
    }
}

fn routes() -> Result<Router, matchit::InsertError> {
    Router::new()
        .on(Method::GET, "/items/", read_items())?
        .on(Method::GET, "/users/", read_users())?
        .on(Method::GET, "/query/", read_query())?
        .on(Method::GET, "/needy/", read_needy())?
        .on(Method::GET, "/protected-items/", read_protected_items())?
        .on(Method::GET, "/users/me", read_users_me())?
        .on(
            Method::POST,
            "/send-notification/{email}",
            send_notification(),
        )?
        .on(Method::POST, "/db/users/", create_user())?
        .on(Method::GET, "/db/users/", read_db_users())?
        .on(Method::GET, "/db/users/{user_id}", read_db_user())?
        .on(
            Method::POST,
            "/db/users/{user_id}/items/",
            create_item_for_user(),
        )?
        .on(Method::GET, "/db/items/", read_db_items())?
        .on(Method::GET, "/sessions/", read_sessions())?
        .on(Method::GET, "/catalog/{item_id}", read_catalog_item())?
        .on(Method::POST, "/catalog/", create_catalog_item())?
        .on(Method::GET, "/errors/items/{item_id}", read_error_item())?
        .on(Method::GET, "/unicorns/{name}", read_unicorn())?
        .on(Method::GET, "/info", read_info())?
        .include(inventory())
}

/// Every inventory route requires a valid `X-Token` header
fn inventory() -> RouteGroup {
    RouteGroup::new("/inventory")
        .dependency(&verify_token())
        .on(Method::GET, "/", read_inventory_items())
        .on(Method::GET, "/{item_id}", read_inventory_item())
        .on(Method::PUT, "/{item_id}", update_inventory_item())
}
