use std::{any::type_name, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    arguments::Arguments,
    requirement::Requirement,
    types::{CachePolicy, DependableKey, DynError, Injectable, Instance, TypeInfo},
};

/// Future producing a dependable's value
pub type DependableFuture = BoxFuture<'static, Result<Instance, DynError>>;
/// Future releasing a scoped dependable's value
pub type TeardownFuture = BoxFuture<'static, Result<(), DynError>>;

pub(crate) type CallFn = dyn Fn(Arguments) -> DependableFuture + Send + Sync;
pub(crate) type TeardownFn = dyn Fn(Instance) -> TeardownFuture + Send + Sync;
type ConstructFn = dyn Fn(&Arguments) -> Result<Instance, DynError> + Send + Sync;

/// A type which can be constructed from resolved requirements
///
/// The type itself is the dependable: every declaration of it shares one cache slot per request.
pub trait Construct: Injectable + Sized {
    /// Returns the requirements the constructor needs, in order
    fn requirements() -> Vec<Requirement>;

    /// Constructs the instance from the resolved requirements
    fn construct(args: &Arguments) -> Result<Self, DynError>;
}

/// How a dependable produces its value
pub(crate) enum DependableKind {
    /// A single async call
    Plain(Arc<CallFn>),
    /// Setup yields a value, teardown releases it once the request is done
    Scoped {
        setup: Arc<CallFn>,
        teardown: Arc<TeardownFn>,
    },
    /// A type constructed from its requirements
    Constructible(Arc<ConstructFn>),
}

/// The value of a successful invocation
pub(crate) struct Acquired {
    pub value: Instance,
    pub teardown: Option<Arc<TeardownFn>>,
}

/// A declared unit of work resolvable into a value
///
/// Cheap to clone, clones share the same identity.
#[derive(Clone)]
pub struct Dependable(Arc<DependableInner>);
struct DependableInner {
    key: DependableKey,
    name: &'static str,
    requirements: Vec<Requirement>,
    policy: CachePolicy,
    kind: DependableKind,
}

impl std::fmt::Debug for Dependable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.0.kind {
            DependableKind::Plain(_) => "plain",
            DependableKind::Scoped { .. } => "scoped",
            DependableKind::Constructible(_) => "constructible",
        };
        f.debug_struct("Dependable")
            .field("name", &self.0.name)
            .field("key", &self.0.key)
            .field("kind", &kind)
            .field("policy", &self.0.policy)
            .finish()
    }
}

impl Dependable {
    /// A dependable returning a single value
    pub fn plain<T, E, F, Fut>(name: &'static str, call: F) -> DependableBuilder
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        DependableBuilder::new(name, DependableKind::Plain(boxed_call(call)))
    }

    /// A dependable whose value must be released after the request
    ///
    /// `teardown` receives the value produced by `setup` and runs in reverse acquisition order.
    pub fn scoped<T, E, F, Fut, TE, D, DFut>(
        name: &'static str,
        setup: F,
        teardown: D,
    ) -> DependableBuilder
    where
        T: Injectable,
        E: Into<DynError>,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        TE: Into<DynError>,
        D: Fn(Arc<T>) -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<(), TE>> + Send + 'static,
    {
        let teardown = move |instance: Instance| -> TeardownFuture {
            match instance.downcast::<T>() {
                Ok(value) => teardown(value).map(|r| r.map_err(Into::into)).boxed(),
                Err(actual_type) => {
                    let msg = format!(
                        "teardown expected '{}' but got '{}'",
                        type_name::<T>(),
                        actual_type
                    );
                    async move { Err::<(), DynError>(msg.into()) }.boxed()
                }
            }
        };

        DependableBuilder::new(
            name,
            DependableKind::Scoped {
                setup: boxed_call(setup),
                teardown: Arc::new(teardown),
            },
        )
    }

    /// The type `T` as a dependable, keyed by its type
    pub fn constructible<T: Construct>() -> DependableBuilder {
        let construct = |args: &Arguments| T::construct(args).map(Instance::new);
        let mut builder = DependableBuilder::new(
            type_name::<T>(),
            DependableKind::Constructible(Arc::new(construct)),
        )
        .keyed::<T>();
        builder.requirements = T::requirements();
        builder
    }

    pub fn key(&self) -> DependableKey {
        self.0.key
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.0.requirements
    }

    pub fn policy(&self) -> CachePolicy {
        self.0.policy
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self.0.kind, DependableKind::Scoped { .. })
    }

    /// Invokes the underlying callable with resolved requirements
    pub(crate) async fn acquire(&self, args: Arguments) -> Result<Acquired, DynError> {
        match &self.0.kind {
            DependableKind::Plain(call) => Ok(Acquired {
                value: call(args).await?,
                teardown: None,
            }),
            DependableKind::Scoped { setup, teardown } => Ok(Acquired {
                value: setup(args).await?,
                teardown: Some(teardown.clone()),
            }),
            DependableKind::Constructible(construct) => Ok(Acquired {
                value: construct(&args)?,
                teardown: None,
            }),
        }
    }
}

fn boxed_call<T, E, F, Fut>(call: F) -> Arc<CallFn>
where
    T: Injectable,
    E: Into<DynError>,
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |args: Arguments| -> DependableFuture {
        call(args)
            .map(|result| result.map(Instance::new).map_err(Into::into))
            .boxed()
    })
}

/// Declares a [Dependable]
pub struct DependableBuilder {
    key: DependableKey,
    name: &'static str,
    requirements: Vec<Requirement>,
    policy: CachePolicy,
    kind: DependableKind,
}

impl DependableBuilder {
    fn new(name: &'static str, kind: DependableKind) -> Self {
        DependableBuilder {
            key: DependableKey::unique(),
            name,
            requirements: Vec::new(),
            policy: CachePolicy::Cached,
            kind,
        }
    }

    /// Adds a requirement, requirements are resolved in the order they are added
    pub fn requires(mut self, requirement: impl Into<Requirement>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    /// Invoke on every reference instead of once per request
    pub fn fresh(mut self) -> Self {
        self.policy = CachePolicy::Fresh;
        self
    }

    /// Key the dependable by a type, so separate declarations share one cache slot
    pub fn keyed<K: 'static + ?Sized>(mut self) -> Self {
        self.key = DependableKey::Type(TypeInfo::of::<K>());
        self
    }

    pub fn build(self) -> Dependable {
        Dependable(Arc::new(DependableInner {
            key: self.key,
            name: self.name,
            requirements: self.requirements,
            policy: self.policy,
            kind: self.kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::executor::block_on;

    use super::*;
    use crate::extract::Extractor;

    struct Commons {
        skip: u32,
    }
    impl Construct for Commons {
        fn requirements() -> Vec<Requirement> {
            vec![Extractor::query::<u32>("skip").with_default(0_u32).into()]
        }

        fn construct(args: &Arguments) -> Result<Self, DynError> {
            Ok(Commons {
                skip: args.cloned("skip")?,
            })
        }
    }

    #[test]
    fn constructible_is_keyed_by_type() {
        let first = Dependable::constructible::<Commons>().build();
        let second = Dependable::constructible::<Commons>().build();

        assert_eq!(first.key(), second.key());
        assert_eq!(first.key(), DependableKey::Type(TypeInfo::of::<Commons>()));
        assert_eq!(first.requirements().len(), 1);
    }

    #[test]
    fn plain_declarations_are_unique() {
        let a = Dependable::plain("value", |_| async { Ok::<_, Infallible>(1_u8) }).build();
        let b = Dependable::plain("value", |_| async { Ok::<_, Infallible>(1_u8) }).build();

        assert_ne!(a.key(), b.key());
        assert_eq!(a.clone().key(), a.key());
    }

    #[test]
    fn acquire_by_kind() {
        let scoped = Dependable::scoped(
            "session",
            |_| async { Ok::<_, Infallible>("open".to_string()) },
            |_: Arc<String>| async { Ok::<_, Infallible>(()) },
        )
        .build();
        assert!(scoped.is_scoped());

        let acquired = block_on(scoped.acquire(Arguments::default())).unwrap();
        assert_eq!(*acquired.value.downcast::<String>().unwrap(), "open");
        assert!(acquired.teardown.is_some());

        let mut args = Arguments::default();
        args.push("skip", Some(Instance::new(3_u32)));
        let commons = Dependable::constructible::<Commons>().build();
        let acquired = block_on(commons.acquire(args)).unwrap();
        assert_eq!(acquired.value.downcast::<Commons>().unwrap().skip, 3);
        assert!(acquired.teardown.is_none());
    }
}
