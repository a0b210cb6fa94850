use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    arguments::Arguments,
    background::BackgroundTasks,
    container::AppState,
    dependable::{Dependable, TeardownFn},
    errors::{ResolveError, TeardownFailure},
    extract::{ValidationError, ValidationErrors},
    overrides::Overrides,
    request::RequestParts,
    requirement::Requirement,
    types::{CachePolicy, DependableKey, Instance},
};

/// Lifecycle of a [ResolutionContext]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Resolving,
    HandlerRunning,
    TearingDown,
    Done,
}

struct TeardownEntry {
    dependable: &'static str,
    value: Instance,
    teardown: Arc<TeardownFn>,
}

type Release = BoxFuture<'static, Vec<TeardownFailure>>;

/// Teardowns of dropped contexts, waiting for someone to drive them
///
/// A context dropped while its request is in flight cannot block on its teardowns,
/// it hands them over here instead. Clones share the same queue.
#[derive(Clone, Default)]
pub struct AbandonedTeardowns {
    pending: Arc<Mutex<Vec<Release>>>,
}

impl std::fmt::Debug for AbandonedTeardowns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbandonedTeardowns")
            .field("pending", &self.len())
            .finish()
    }
}

impl AbandonedTeardowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dropped contexts whose teardowns have not run yet
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, release: Release) {
        self.pending().push(release);
    }

    /// Runs every queued teardown, oldest dropped context first
    pub async fn release(&self) -> Vec<TeardownFailure> {
        let queued = std::mem::take(&mut *self.pending());
        if !queued.is_empty() {
            tracing::info!("Releasing teardowns of {} dropped requests", queued.len());
        }

        let mut failures = Vec::new();
        for release in queued {
            failures.extend(release.await);
        }
        failures
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Vec<Release>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs every teardown top to bottom, a failing teardown does not stop the others
async fn unwind(mut entries: Vec<TeardownEntry>) -> Vec<TeardownFailure> {
    let mut failures = Vec::new();
    while let Some(entry) = entries.pop() {
        tracing::debug!("Tearing down {}", entry.dependable);
        if let Err(error) = (entry.teardown)(entry.value).await {
            tracing::error!("Teardown of {} failed: {}", entry.dependable, error);
            failures.push(TeardownFailure {
                dependable: entry.dependable,
                error,
            });
        }
    }
    failures
}

/// Pending releases, last acquired on top
#[derive(Default)]
struct TeardownStack {
    entries: Vec<TeardownEntry>,
    /// Where the entries go if the stack is dropped before being unwound
    abandoned: Option<AbandonedTeardowns>,
}

impl TeardownStack {
    fn push(&mut self, entry: TeardownEntry) {
        self.entries.push(entry);
    }

    async fn unwind(&mut self) -> Vec<TeardownFailure> {
        unwind(std::mem::take(&mut self.entries)).await
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        // The request was abandoned, acquired resources must still be released
        let pending = self.entries.len();
        let release = unwind(std::mem::take(&mut self.entries)).boxed();
        if let Some(abandoned) = &self.abandoned {
            tracing::warn!(
                "Resolution context dropped with {pending} pending teardowns, queueing their release"
            );
            abandoned.push(release);
            return;
        }

        match futures::executor::enter() {
            Ok(enter) => {
                drop(enter);
                tracing::warn!(
                    "Resolution context dropped with {pending} pending teardowns, releasing them now"
                );
                futures::executor::block_on(release);
            }
            Err(_) => tracing::error!(
                "Resolution context dropped inside an executor, {pending} teardowns never run"
            ),
        }
    }
}

/// Per request state: resolved values, pending teardowns and background tasks
///
/// One context serves exactly one request and is never shared between requests.
pub struct ResolutionContext {
    state: ContextState,
    request: Arc<RequestParts>,
    app_state: AppState,
    overrides: Overrides,
    cache: HashMap<DependableKey, Instance>,
    teardown: TeardownStack,
    background: BackgroundTasks,
    /// Validation errors collected so far, no dependable runs once this is non empty
    errors: Vec<ValidationError>,
    /// Dependables currently being resolved, outermost first
    chain: Vec<(DependableKey, &'static str)>,
}

impl ResolutionContext {
    pub fn new(request: RequestParts, app_state: AppState, overrides: Overrides) -> Self {
        ResolutionContext {
            state: ContextState::Created,
            request: Arc::new(request),
            app_state,
            overrides,
            cache: HashMap::new(),
            teardown: TeardownStack::default(),
            background: BackgroundTasks::new(),
            errors: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// Teardowns still pending when this context is dropped go to `abandoned`
    pub fn release_abandoned_into(mut self, abandoned: AbandonedTeardowns) -> Self {
        self.teardown.abandoned = Some(abandoned);
        self
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn request(&self) -> &Arc<RequestParts> {
        &self.request
    }

    pub fn background_tasks(&self) -> BackgroundTasks {
        self.background.clone()
    }

    pub fn pending_teardowns(&self) -> usize {
        self.teardown.entries.len()
    }

    /// Resolves `requirements` depth first, reusing cached values
    ///
    /// On failure every teardown registered so far has already run when this returns.
    pub async fn resolve(&mut self, requirements: &[Requirement]) -> Result<Arguments, ResolveError> {
        self.transition(
            &[ContextState::Created, ContextState::Resolving],
            ContextState::Resolving,
        )?;

        let result = match self.resolve_requirements(requirements).await {
            Ok(args) if self.errors.is_empty() => Ok(args),
            Ok(_) => Err(ValidationErrors {
                errors: std::mem::take(&mut self.errors),
            }
            .into()),
            Err(e) => Err(e),
        };

        match result {
            Ok(args) => Ok(args),
            Err(error) => Err(self.abort(error).await),
        }
    }

    /// Marks the start of the handler
    pub fn enter_handler(&mut self) -> Result<(), ResolveError> {
        self.transition(
            &[ContextState::Resolving, ContextState::Created],
            ContextState::HandlerRunning,
        )
    }

    /// Unwinds the teardown stack after the response was finalized
    ///
    /// Teardown failures can no longer change the response, they are logged and returned.
    pub async fn finish(&mut self) -> Vec<TeardownFailure> {
        if self.state == ContextState::Done {
            tracing::warn!("Resolution context already finished");
            return Vec::new();
        }

        self.state = ContextState::TearingDown;
        let failures = self.teardown.unwind().await;
        self.state = ContextState::Done;
        failures
    }

    /// Unwinds the teardown stack before any response was finalized
    ///
    /// If a teardown fails its error replaces `error`, the last failing teardown wins.
    pub async fn abort(&mut self, error: ResolveError) -> ResolveError {
        tracing::debug!("Aborting request: {}", error);
        self.state = ContextState::TearingDown;
        let failures = self.teardown.unwind().await;
        self.state = ContextState::Done;

        match failures.into_iter().last() {
            Some(failure) => ResolveError::Teardown {
                dependable: failure.dependable,
                error: failure.error,
                superseded: Some(Box::new(error)),
            },
            None => error,
        }
    }

    fn transition(
        &mut self,
        allowed: &[ContextState],
        next: ContextState,
    ) -> Result<(), ResolveError> {
        if !allowed.contains(&self.state) {
            return Err(ResolveError::InvalidState {
                expected: allowed[0],
                actual: self.state,
            });
        }

        if self.state != next {
            tracing::debug!("Resolution context {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        Ok(())
    }

    fn resolve_requirements<'a>(
        &'a mut self,
        requirements: &'a [Requirement],
    ) -> BoxFuture<'a, Result<Arguments, ResolveError>> {
        async move {
            let mut args = Arguments::default();
            for requirement in requirements {
                let value = match requirement {
                    Requirement::Extract(extractor) => match extractor.extract(&self.request) {
                        Ok(value) => value,
                        Err(error) => {
                            tracing::debug!("Invalid request value: {}", error);
                            self.errors.push(error);
                            None
                        }
                    },
                    Requirement::Depends {
                        dependable, policy, ..
                    } => self.resolve_dependable(dependable, *policy).await?,
                    Requirement::State { info, .. } => Some(self.app_state.instance(*info)?),
                    Requirement::Request { .. } => Some(Instance::from_arc(self.request.clone())),
                    Requirement::BackgroundTasks { .. } => {
                        Some(Instance::new(self.background.clone()))
                    }
                };
                args.push(requirement.name(), value);
            }
            Ok(args)
        }
        .boxed()
    }

    /// Returns `None` if the dependable was skipped because the request is invalid
    fn resolve_dependable<'a>(
        &'a mut self,
        declared: &'a Dependable,
        policy: Option<CachePolicy>,
    ) -> BoxFuture<'a, Result<Option<Instance>, ResolveError>> {
        async move {
            let dependable = self.overrides.effective(declared);
            let key = dependable.key();
            let name = dependable.name();
            let policy = policy.unwrap_or(dependable.policy());

            if policy == CachePolicy::Cached {
                if let Some(value) = self.cache.get(&key) {
                    tracing::trace!("Reusing cached value of {}", name);
                    return Ok(Some(value.clone()));
                }
            }

            if self.chain.iter().any(|(in_progress, _)| *in_progress == key) {
                let mut chain: Vec<_> = self.chain.iter().map(|(_, name)| *name).collect();
                chain.push(name);
                return Err(ResolveError::CircularDependency { chain });
            }

            self.chain.push((key, name));
            let args = self.resolve_requirements(dependable.requirements()).await;
            self.chain.pop();
            let args = args?;

            if !self.errors.is_empty() {
                tracing::debug!("Skipping {} - the request has invalid values", name);
                return Ok(None);
            }

            tracing::debug!("Invoking {}", name);
            let acquired = dependable
                .acquire(args)
                .await
                .map_err(|error| ResolveError::Setup {
                    dependable: name,
                    error,
                })?;

            // Registered right after acquisition, so later failures still release it
            if let Some(teardown) = acquired.teardown {
                self.teardown.push(TeardownEntry {
                    dependable: name,
                    value: acquired.value.clone(),
                    teardown,
                });
            }

            // A fresh value still fills an empty slot, later cached references reuse it
            if policy == CachePolicy::Cached || !self.cache.contains_key(&key) {
                self.cache.insert(key, acquired.value.clone());
            }

            Ok(Some(acquired.value))
        }
        .boxed()
    }
}
