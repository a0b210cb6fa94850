use std::{
    any::{Any, TypeId},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Errors raised by user supplied dependables and handlers
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Requests may be served on a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// A resolved value, type erased
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}

impl Instance {
    pub fn new<Value: Injectable>(instance: Value) -> Self {
        Instance {
            info: TypeInfo::of::<Value>(),
            instance: Arc::new(instance),
        }
    }

    /// Wraps an already shared value without another allocation
    pub fn from_arc<Value: Injectable>(instance: Arc<Value>) -> Self {
        Instance {
            info: TypeInfo::of::<Value>(),
            instance,
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Identity of a dependable, used as the per request cache key
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum DependableKey {
    /// Allocated once per declaration
    Unique(u64),
    /// Shared by every declaration for the same type
    Type(TypeInfo),
}

impl DependableKey {
    pub(crate) fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DependableKey::Unique(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whether a dependable is reused within a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Invoked at most once per request
    #[default]
    Cached,
    /// Invoked once per reference
    Fresh,
}
