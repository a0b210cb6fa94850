//! Method and path routing onto [PathOperation]s.
//!
//! One radix tree per HTTP method. Routes sharing a prefix and dependencies are declared
//! as a [RouteGroup] and included in one go.

use std::{collections::HashMap, sync::Arc};

use depwire_di::{App, Dependable, Handled, PathOperation, RequestParts, Response};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

/// Routes declared relative to a common prefix, all guarded by the same dependencies
///
/// The group's dependencies run before the decorator dependencies of each operation,
/// which run before its parameters. A group can be included more than once.
#[derive(Clone, Debug)]
pub struct RouteGroup {
    prefix: String,
    dependencies: Vec<Dependable>,
    routes: Vec<(Method, String, PathOperation)>,
}

impl RouteGroup {
    /// `prefix` starts with `/`, a trailing `/` is dropped
    pub fn new(prefix: &str) -> Self {
        RouteGroup {
            prefix: prefix.trim_end_matches('/').to_string(),
            dependencies: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Adds a dependency to every route of the group, for its effects only
    pub fn dependency(mut self, dependable: &Dependable) -> Self {
        self.dependencies.push(dependable.clone());
        self
    }

    /// Adds a route, `path` is relative to the prefix
    pub fn on(mut self, method: Method, path: &str, operation: PathOperation) -> Self {
        self.routes.push((method, path.to_string(), operation));
        self
    }
}

#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<PathOperation>>>,
    operations: Vec<Arc<PathOperation>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and are available to path extractors.
    pub fn on(
        mut self,
        method: Method,
        path: &str,
        operation: PathOperation,
    ) -> Result<Self, matchit::InsertError> {
        let operation = Arc::new(operation);
        self.routes
            .entry(method)
            .or_default()
            .insert(path, operation.clone())?;
        self.operations.push(operation);
        Ok(self)
    }

    /// Registers every route of `group` under its prefix
    pub fn include(self, group: RouteGroup) -> Result<Self, matchit::InsertError> {
        let RouteGroup {
            prefix,
            dependencies,
            routes,
        } = group;

        routes
            .into_iter()
            .try_fold(self, |router, (method, path, operation)| {
                router.on(
                    method,
                    &format!("{prefix}{path}"),
                    operation.prepend_dependencies(&dependencies),
                )
            })
    }

    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<PathOperation>, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let operation = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((operation, params))
    }

    /// Every registered operation, in registration order
    pub fn operations(&self) -> impl Iterator<Item = &PathOperation> {
        self.operations.iter().map(|operation| operation.as_ref())
    }

    /// Routes and handles the request, `None` if no operation matches
    pub async fn dispatch(&self, app: &App, request: http::Request<Vec<u8>>) -> Option<Handled> {
        let Some((operation, params)) = self.lookup(request.method(), request.uri().path()) else {
            tracing::debug!("No route for {} {}", request.method(), request.uri().path());
            return None;
        };

        let parts = RequestParts::from_http(request, params);
        Some(app.handle(&operation, parts).await)
    }

    /// Routes, handles and runs background tasks, unmatched requests are answered with 404
    pub async fn serve(&self, app: &App, request: http::Request<Vec<u8>>) -> Response {
        match self.dispatch(app, request).await {
            Some(handled) => {
                handled.background.run().await;
                handled.response
            }
            None => Response::detail(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}
