use std::{any::TypeId, collections::HashMap, error::Error, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::{
    arguments::Arguments,
    background::BackgroundTasks,
    container::AppState,
    context::{AbandonedTeardowns, ResolutionContext},
    dependable::Dependable,
    dependency_graph::{DependencyGraph, DependencyGraphErrors},
    errors::{ResolveError, TeardownFailure},
    extract::ValidationErrors,
    overrides::Overrides,
    request::RequestParts,
    requirement::Requirement,
    response::{ErrorHandlers, Response},
    types::{DynError, Injectable, Instance},
};

type OperationFn = dyn Fn(Arguments) -> BoxFuture<'static, Result<Value, DynError>> + Send + Sync;

/// A handler together with everything it requires
#[derive(Clone)]
pub struct PathOperation {
    name: &'static str,
    /// Decorator level dependencies, resolved first and not meant to be read by the handler
    dependencies: usize,
    requirements: Vec<Requirement>,
    status: StatusCode,
    handler: Arc<OperationFn>,
}

impl std::fmt::Debug for PathOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathOperation")
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .field("status", &self.status)
            .finish()
    }
}

impl PathOperation {
    /// An operation whose successful result is serialized as the JSON body
    pub fn new<T, E, F, Fut>(name: &'static str, handler: F) -> Self
    where
        T: Serialize,
        E: Into<DynError>,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handler = move |args: Arguments| -> BoxFuture<'static, Result<Value, DynError>> {
            handler(args)
                .map(|result| -> Result<Value, DynError> {
                    let body = result.map_err(Into::<DynError>::into)?;
                    Ok(serde_json::to_value(body)?)
                })
                .boxed()
        };

        PathOperation {
            name,
            dependencies: 0,
            requirements: Vec::new(),
            status: StatusCode::OK,
            handler: Arc::new(handler),
        }
    }

    /// Adds a parameter, available to the handler under its name
    pub fn requires(mut self, requirement: impl Into<Requirement>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    /// Adds a dependency which runs for its effects only
    ///
    /// All of them are resolved before the parameters, in the order they were added.
    pub fn dependency(mut self, dependable: &Dependable) -> Self {
        let name = format!("dependencies[{}]", self.dependencies);
        self.requirements
            .insert(self.dependencies, Requirement::depends(&name, dependable));
        self.dependencies += 1;
        self
    }

    /// Puts `dependables` ahead of the decorator dependencies added so far
    ///
    /// Used for dependencies shared by a group of operations, they run before everything else.
    pub fn prepend_dependencies(mut self, dependables: &[Dependable]) -> Self {
        let decorators: Vec<Dependable> = self
            .requirements
            .drain(..self.dependencies)
            .filter_map(|requirement| match requirement {
                Requirement::Depends { dependable, .. } => Some(dependable),
                _ => None,
            })
            .collect();

        self.dependencies = 0;
        dependables
            .iter()
            .chain(decorators.iter())
            .fold(self, |operation, dependable| operation.dependency(dependable))
    }

    /// Status of a successful response
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

/// Outcome of one handled request
#[derive(Debug)]
pub struct Handled {
    pub response: Response,
    /// Tasks to run after the response was sent, empty if the request failed
    pub background: BackgroundTasks,
    /// Teardowns that failed after the response was finalized
    pub teardown_failures: Vec<TeardownFailure>,
    /// The error the response was produced from, if any
    pub error: Option<ResolveError>,
}

impl Handled {
    fn failed(response: Response, error: ResolveError) -> Self {
        Handled {
            response,
            background: BackgroundTasks::new(),
            teardown_failures: Vec::new(),
            error: Some(error),
        }
    }
}

/// Serves path operations with application scoped state, overrides and error handlers
#[derive(Clone, Debug, Default)]
pub struct App {
    state: AppState,
    overrides: Overrides,
    error_handlers: ErrorHandlers,
    /// Teardowns of requests dropped mid flight, released before the next request
    abandoned: AbandonedTeardowns,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Overrides can be changed at any time, they apply to requests handled afterwards
    pub fn overrides_mut(&mut self) -> &mut Overrides {
        &mut self.overrides
    }

    /// Resolves the operation's requirements, runs its handler and tears everything down
    ///
    /// If the returned future is dropped before completion, the teardowns registered so far
    /// are queued and run by the next call to [App::handle] or [App::release_abandoned].
    pub async fn handle(&self, operation: &PathOperation, request: RequestParts) -> Handled {
        self.release_abandoned().await;

        let span = tracing::debug_span!(
            "handle",
            operation = operation.name,
            method = %request.method(),
            path = request.path()
        );

        self.handle_in_context(operation, request)
            .instrument(span)
            .await
    }

    async fn handle_in_context(&self, operation: &PathOperation, request: RequestParts) -> Handled {
        let mut ctx = ResolutionContext::new(request, self.state.clone(), self.overrides.clone())
            .release_abandoned_into(self.abandoned.clone());

        let args = match ctx.resolve(&operation.requirements).await {
            Ok(args) => args,
            Err(error) => return self.failed(error),
        };

        if let Err(error) = ctx.enter_handler() {
            let error = ctx.abort(error).await;
            return self.failed(error);
        }

        tracing::debug!("Running handler");
        let body = match (operation.handler)(args).await {
            Ok(body) => body,
            Err(error) => {
                let error = ResolveError::Handler {
                    operation: operation.name,
                    error,
                };
                let error = ctx.abort(error).await;
                return self.failed(error);
            }
        };

        // The response is final from here on
        let response = Response::json(operation.status, body);
        let teardown_failures = ctx.finish().await;

        Handled {
            response,
            background: ctx.background_tasks(),
            teardown_failures,
            error: None,
        }
    }

    /// Runs the teardowns of dropped requests, returning the ones that failed
    pub async fn release_abandoned(&self) -> Vec<TeardownFailure> {
        if self.abandoned.is_empty() {
            return Vec::new();
        }
        self.abandoned.release().await
    }

    /// Dropped requests whose teardowns have not run yet
    pub fn abandoned_requests(&self) -> usize {
        self.abandoned.len()
    }

    fn failed(&self, error: ResolveError) -> Handled {
        match &error {
            ResolveError::Validation(_) | ResolveError::Setup { .. } => {
                tracing::debug!("Request rejected: {}", error)
            }
            _ => tracing::error!("Request failed: {}", error),
        }
        Handled::failed(self.error_handlers.respond(&error), error)
    }

    /// Handles the request, then runs its background tasks
    pub async fn serve(&self, operation: &PathOperation, request: RequestParts) -> Response {
        let handled = self.handle(operation, request).await;
        handled.background.run().await;
        handled.response
    }

    /// Builds the operation's dependency graph with the current overrides
    pub fn graph(&self, operation: &PathOperation) -> DependencyGraph {
        DependencyGraph::new(
            operation.name,
            &operation.requirements,
            &self.overrides,
            &self.state,
        )
    }

    /// Checks the operation for circular dependencies, conflicting extractors and missing state
    pub fn check(&self, operation: &PathOperation) -> Result<DependencyGraph, DependencyGraphErrors> {
        let graph = self.graph(operation);
        graph.check()?;
        Ok(graph)
    }
}

/// Registers application scoped instances, overrides and error handlers
#[derive(Default)]
pub struct AppBuilder {
    /// Registered already created instances
    registered_instances: HashMap<TypeId, Instance>,
    overrides: Overrides,
    error_handlers: ErrorHandlers,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance<T: Injectable>(mut self, instance: T) -> Self {
        if self
            .registered_instances
            .insert(TypeId::of::<T>(), Instance::new(instance))
            .is_some()
        {
            tracing::warn!(
                "Instance of {} registered twice, keeping the last one",
                std::any::type_name::<T>()
            );
        }
        self
    }

    /// Registers an already shared instance, it is required as `T`
    pub fn add_shared_instance<T: Injectable>(mut self, instance: Arc<T>) -> Self {
        self.registered_instances
            .insert(TypeId::of::<T>(), Instance::from_arc(instance));
        self
    }

    pub fn override_dependable(mut self, original: &Dependable, replacement: Dependable) -> Self {
        self.overrides.insert(original, replacement);
        self
    }

    pub fn on_error<E, F>(mut self, handler: F) -> Self
    where
        E: Error + Send + Sync + 'static,
        F: Fn(&E) -> Response + Send + Sync + 'static,
    {
        self.error_handlers.on::<E, F>(handler);
        self
    }

    pub fn on_validation<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ValidationErrors) -> Response + Send + Sync + 'static,
    {
        self.error_handlers.on_validation(handler);
        self
    }

    pub fn build(self) -> App {
        App {
            state: AppState::new(self.registered_instances),
            overrides: self.overrides,
            error_handlers: self.error_handlers,
            abandoned: AbandonedTeardowns::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::{Arc, Mutex},
    };

    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::{extract::Extractor, response::HttpError};

    type Log = Arc<Mutex<Vec<String>>>;

    fn session(log: &Log, fail_teardown: bool) -> Dependable {
        let setup_log = log.clone();
        let teardown_log = log.clone();
        Dependable::scoped(
            "get_db",
            move |_| {
                let log = setup_log.clone();
                async move {
                    log.lock().unwrap().push("open".to_string());
                    Ok::<_, Infallible>(())
                }
            },
            move |_: Arc<()>| {
                let log = teardown_log.clone();
                async move {
                    log.lock().unwrap().push("close".to_string());
                    match fail_teardown {
                        true => Err("close failed"),
                        false => Ok(()),
                    }
                }
            },
        )
        .build()
    }

    fn verify_token() -> Dependable {
        Dependable::plain("verify_token", |args: Arguments| async move {
            let token = args.get::<String>("x_token")?;
            if token.as_str() != "fake-super-secret-token" {
                return Err(DynError::from(HttpError::new(
                    StatusCode::BAD_REQUEST,
                    "X-Token header invalid",
                )));
            }
            Ok::<(), DynError>(())
        })
        .requires(Extractor::header::<String>("x_token"))
        .build()
    }

    #[test]
    fn handles_request_and_tears_down_after_response() {
        let log = Log::default();
        let db = session(&log, false);
        let handler_log = log.clone();
        let operation = PathOperation::new("read_items", move |args: Arguments| {
            let log = handler_log.clone();
            async move {
                args.get::<()>("db")?;
                log.lock().unwrap().push("handler".to_string());
                Ok::<_, DynError>(json!([{"item_id": "Foo"}]))
            }
        })
        .requires(Requirement::depends("db", &db))
        .status(StatusCode::CREATED);

        let app = App::builder().build();
        let handled = block_on(app.handle(&operation, RequestParts::builder().build()));

        assert_eq!(handled.response.status, StatusCode::CREATED);
        assert_eq!(handled.response.body, json!([{"item_id": "Foo"}]));
        assert!(handled.error.is_none());
        assert_eq!(*log.lock().unwrap(), vec!["open", "handler", "close"]);
    }

    #[test]
    fn decorator_dependencies_run_first() {
        let operation = PathOperation::new("read_items", |_| async {
            Ok::<_, Infallible>(json!([{"item": "Foo"}, {"item": "Bar"}]))
        })
        .requires(Extractor::query::<u32>("limit").with_default(100_u32))
        .dependency(&verify_token());
        let app = App::builder().build();

        assert_eq!(operation.requirements()[0].name(), "dependencies[0]");

        let request = RequestParts::builder()
            .header("x-token", "fake-super-secret-token")
            .build();
        let handled = block_on(app.handle(&operation, request));
        assert_eq!(handled.response.status, StatusCode::OK);

        let request = RequestParts::builder().header("x-token", "wrong").build();
        let handled = block_on(app.handle(&operation, request));
        assert_eq!(handled.response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            handled.response.body,
            json!({"detail": "X-Token header invalid"})
        );

        // A missing header and an invalid limit are reported together
        let request = RequestParts::builder().query("limit", "lots").build();
        let handled = block_on(app.handle(&operation, request));
        assert_eq!(handled.response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(handled.response.body["detail"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn shared_dependencies_run_before_decorators() {
        let log = Log::default();
        let db = session(&log, false);
        let operation = PathOperation::new("read_items", |_| async { Ok::<_, Infallible>(()) })
            .requires(Extractor::query::<u32>("limit").with_default(100_u32))
            .dependency(&verify_token())
            .prepend_dependencies(&[db]);

        let names: Vec<&str> = operation.requirements().iter().map(Requirement::name).collect();
        assert_eq!(names, vec!["dependencies[0]", "dependencies[1]", "limit"]);
        let dependables: Vec<&str> = operation
            .requirements()
            .iter()
            .filter_map(|requirement| match requirement {
                Requirement::Depends { dependable, .. } => Some(dependable.name()),
                _ => None,
            })
            .collect();
        assert_eq!(dependables, vec!["get_db", "verify_token"]);

        // A later decorator still lands behind the shared ones
        let operation = operation.dependency(&verify_token());
        assert_eq!(operation.requirements()[2].name(), "dependencies[2]");
        assert_eq!(operation.requirements()[3].name(), "limit");

        let app = App::builder().build();
        let request = RequestParts::builder().header("x-token", "wrong").build();
        let handled = block_on(app.handle(&operation, request));
        assert_eq!(handled.response.status, StatusCode::BAD_REQUEST);
        // The shared session was opened first and released on the failure
        assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
    }

    #[test]
    fn dropped_request_releases_its_dependables_later() {
        use futures::future::{self, Either};

        let log = Log::default();
        let db = session(&log, false);
        let operation = PathOperation::new("read_items", |args: Arguments| async move {
            args.get::<()>("db")?;
            future::pending::<()>().await;
            Ok::<_, DynError>(())
        })
        .requires(Requirement::depends("db", &db));
        let app = App::builder().build();

        // The client went away while the handler was running
        block_on(async {
            let handling = app.handle(&operation, RequestParts::builder().build()).boxed_local();
            let raced = future::select(handling, future::ready(())).await;
            assert!(matches!(raced, Either::Right(_)));
        });

        assert_eq!(*log.lock().unwrap(), vec!["open"]);
        assert_eq!(app.abandoned_requests(), 1);

        let failures = block_on(app.release_abandoned());
        assert!(failures.is_empty());
        assert_eq!(app.abandoned_requests(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
    }

    #[test]
    fn next_request_releases_dropped_requests_first() {
        use futures::future;

        let log = Log::default();
        let db = session(&log, false);
        let stalled = PathOperation::new("stalled", |args: Arguments| async move {
            args.get::<()>("db")?;
            future::pending::<()>().await;
            Ok::<_, DynError>(())
        })
        .requires(Requirement::depends("db", &db));
        let quick = PathOperation::new("quick", |_| async { Ok::<_, Infallible>("done") });
        let app = App::builder().build();

        block_on(async {
            let handling = app.handle(&stalled, RequestParts::builder().build()).boxed_local();
            let _ = future::select(handling, future::ready(())).await;
        });
        assert_eq!(*log.lock().unwrap(), vec!["open"]);

        let handled = block_on(app.handle(&quick, RequestParts::builder().build()));
        assert_eq!(handled.response.body, json!("done"));
        assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
        assert_eq!(app.abandoned_requests(), 0);
    }

    #[test]
    fn handler_error_is_surfaced_after_teardown() {
        let log = Log::default();
        let db = session(&log, false);
        let operation = PathOperation::new("read_item", |_| async {
            Err::<(), _>(HttpError::new(StatusCode::NOT_FOUND, "Item not found"))
        })
        .requires(Requirement::depends("db", &db));

        let app = App::builder().build();
        let handled = block_on(app.handle(&operation, RequestParts::builder().build()));

        assert_eq!(handled.response.status, StatusCode::NOT_FOUND);
        assert!(matches!(handled.error, Some(ResolveError::Handler { .. })));
        assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
    }

    #[test]
    fn teardown_failure_after_response_keeps_response() {
        let log = Log::default();
        let db = session(&log, true);
        let operation = PathOperation::new("read_items", |_| async { Ok::<_, Infallible>("ok") })
            .requires(Requirement::depends("db", &db));

        let app = App::builder().build();
        let handled = block_on(app.handle(&operation, RequestParts::builder().build()));

        assert_eq!(handled.response.status, StatusCode::OK);
        assert_eq!(handled.teardown_failures.len(), 1);
        assert_eq!(handled.teardown_failures[0].dependable, "get_db");
    }

    #[test]
    fn overrides_and_background_tasks() {
        let log = Log::default();
        let real = Dependable::plain("common_parameters", |_| async {
            Ok::<_, Infallible>("real".to_string())
        })
        .build();
        let fake = Dependable::plain("override_dependency", |_| async {
            Ok::<_, Infallible>("fake".to_string())
        })
        .build();

        let handler_log = log.clone();
        let operation = PathOperation::new("read_items", move |args: Arguments| {
            let log = handler_log.clone();
            async move {
                let commons = args.cloned::<String>("commons")?;
                let task_log = log.clone();
                let message = commons.clone();
                args.get::<BackgroundTasks>("tasks")?
                    .add_task(async move { task_log.lock().unwrap().push(message) });
                Ok::<_, DynError>(commons)
            }
        })
        .requires(Requirement::depends("commons", &real))
        .requires(Requirement::background_tasks("tasks"));

        let mut app = App::builder().override_dependable(&real, fake).build();
        let response = block_on(app.serve(&operation, RequestParts::builder().build()));
        assert_eq!(response.body, json!("fake"));
        assert_eq!(*log.lock().unwrap(), vec!["fake"]);

        app.overrides_mut().remove(&real);
        let response = block_on(app.serve(&operation, RequestParts::builder().build()));
        assert_eq!(response.body, json!("real"));
    }

    #[test]
    fn check_reports_graph_errors() {
        let operation = PathOperation::new("read_items", |_| async { Ok::<_, Infallible>(()) })
            .requires(Requirement::state::<String>("db"));

        let app = App::builder().build();
        assert!(app.check(&operation).is_err());

        let app = App::builder().add_instance("db".to_string()).build();
        let graph = app.check(&operation).unwrap();
        assert!(graph.extractors().is_empty());
    }
}
