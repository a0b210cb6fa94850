use crate::{
    dependable::Dependable,
    extract::Extractor,
    types::{CachePolicy, Injectable, TypeInfo},
};

/// One declared parameter of a dependant
///
/// Every requirement is bound to a name, under which its resolved value is found in [crate::Arguments].
#[derive(Clone, Debug)]
pub enum Requirement {
    /// A value pulled from the request
    Extract(Extractor),
    /// A sub dependable
    Depends {
        name: String,
        dependable: Dependable,
        /// Overrides the dependable's own policy for this reference only
        policy: Option<CachePolicy>,
    },
    /// An application scoped instance registered on the [crate::AppState]
    State { name: String, info: TypeInfo },
    /// The request itself
    Request { name: String },
    /// The request's [crate::BackgroundTasks]
    BackgroundTasks { name: String },
}

impl Requirement {
    pub fn depends(name: &str, dependable: &Dependable) -> Self {
        Requirement::Depends {
            name: name.to_string(),
            dependable: dependable.clone(),
            policy: None,
        }
    }

    /// Invokes the dependable for this reference even if it already ran in this request
    pub fn depends_fresh(name: &str, dependable: &Dependable) -> Self {
        Requirement::Depends {
            name: name.to_string(),
            dependable: dependable.clone(),
            policy: Some(CachePolicy::Fresh),
        }
    }

    pub fn state<T: Injectable>(name: &str) -> Self {
        Requirement::State {
            name: name.to_string(),
            info: TypeInfo::of::<T>(),
        }
    }

    pub fn request(name: &str) -> Self {
        Requirement::Request {
            name: name.to_string(),
        }
    }

    pub fn background_tasks(name: &str) -> Self {
        Requirement::BackgroundTasks {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Requirement::Extract(extractor) => extractor.name(),
            Requirement::Depends { name, .. }
            | Requirement::State { name, .. }
            | Requirement::Request { name }
            | Requirement::BackgroundTasks { name } => name,
        }
    }
}

impl From<Extractor> for Requirement {
    fn from(extractor: Extractor) -> Self {
        Requirement::Extract(extractor)
    }
}
