use std::{collections::HashMap, sync::Arc};

use crate::{dependable::Dependable, types::DependableKey};

/// Replacements for dependables, applied everywhere in the dependency tree
///
/// Mostly useful in tests, to swap a database session or a token check for a fake.
#[derive(Clone, Default, Debug)]
pub struct Overrides(Arc<HashMap<DependableKey, Dependable>>);

impl Overrides {
    /// Resolve `replacement` wherever `original` is required
    pub fn insert(&mut self, original: &Dependable, replacement: Dependable) {
        tracing::debug!(
            "Overriding dependable {} with {}",
            original.name(),
            replacement.name()
        );
        Arc::make_mut(&mut self.0).insert(original.key(), replacement);
    }

    pub fn remove(&mut self, original: &Dependable) -> Option<Dependable> {
        Arc::make_mut(&mut self.0).remove(&original.key())
    }

    pub fn get(&self, original: &Dependable) -> Option<&Dependable> {
        self.0.get(&original.key())
    }

    /// The dependable which actually runs in place of `declared`
    pub fn effective(&self, declared: &Dependable) -> Dependable {
        self.get(declared).unwrap_or(declared).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn effective_falls_back_to_declared() {
        let real = Dependable::plain("db", |_| async { Ok::<_, Infallible>("real") }).build();
        let fake = Dependable::plain("fake_db", |_| async { Ok::<_, Infallible>("fake") }).build();

        let mut overrides = Overrides::default();
        assert_eq!(overrides.effective(&real).key(), real.key());

        overrides.insert(&real, fake.clone());
        assert_eq!(overrides.effective(&real).key(), fake.key());
        assert_eq!(overrides.effective(&fake).key(), fake.key());

        let snapshot = overrides.clone();
        overrides.remove(&real);
        assert!(overrides.is_empty());
        assert!(!snapshot.is_empty());
    }
}
