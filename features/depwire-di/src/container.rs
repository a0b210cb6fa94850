use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use crate::{
    errors::RequireError,
    types::{Injectable, Instance, TypeInfo},
};

/// Application scoped instances shared by every request
///
/// This is the explicitly owned home of long lived state such as stores and configs.
/// Requests only ever get shared handles to it.
#[derive(Clone, Default)]
pub struct AppState(Arc<AppStateInner>);
#[derive(Default)]
pub struct AppStateInner {
    instances: HashMap<TypeId, Instance>,
}
impl Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for instance in self.0.instances.values() {
            list.entry(&instance.info.type_name);
        }
        list.finish()
    }
}

impl AppState {
    pub(crate) fn new(instances: HashMap<TypeId, Instance>) -> Self {
        Self(Arc::new(AppStateInner { instances }))
    }

    /// Attempts to get the requested type
    pub fn require<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        let instance = self.instance(TypeInfo::of::<T>())?;
        instance
            .downcast()
            .map_err(|actual_type| RequireError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    /// Type erased lookup
    pub fn instance(&self, info: TypeInfo) -> Result<Instance, RequireError> {
        self.0
            .instances
            .get(&info.type_id)
            .cloned()
            .ok_or(RequireError::TypeMissing(info.type_name))
    }

    pub fn contains(&self, info: TypeInfo) -> bool {
        self.0.instances.contains_key(&info.type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_registered_and_missing() {
        let mut instances = HashMap::new();
        instances.insert(TypeId::of::<String>(), Instance::new("db".to_string()));
        let state = AppState::new(instances);

        assert_eq!(*state.require::<String>().unwrap(), "db");
        assert!(state.contains(TypeInfo::of::<String>()));
        assert!(matches!(
            state.require::<u32>(),
            Err(RequireError::TypeMissing(_))
        ));
    }

    #[test]
    fn clones_share_instances() {
        let mut instances = HashMap::new();
        instances.insert(TypeId::of::<String>(), Instance::new("db".to_string()));
        let state = AppState::new(instances);
        let clone = state.clone();

        assert!(Arc::ptr_eq(
            &state.require::<String>().unwrap(),
            &clone.require::<String>().unwrap()
        ));
    }
}
