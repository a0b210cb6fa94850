use std::{any::type_name, sync::Arc};

use crate::types::{Injectable, Instance};

/// Errors when reading a resolved argument
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// No requirement with this name was declared
    #[error("No argument named '{0}' was declared")]
    Unknown(String),
    /// The requirement is optional and was not present
    #[error("Argument '{0}' is absent")]
    Absent(String),
    #[error("Argument '{name}' has type '{actual_type}', not '{required_type}'")]
    DowncastFailed {
        name: String,
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// The resolved values of a dependant's requirements, in declaration order
#[derive(Clone, Default, Debug)]
pub struct Arguments {
    values: Vec<(String, Option<Instance>)>,
}

impl Arguments {
    pub(crate) fn push(&mut self, name: &str, value: Option<Instance>) {
        self.values.push((name.to_string(), value));
    }

    fn lookup(&self, name: &str) -> Result<&Option<Instance>, ArgumentError> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ArgumentError::Unknown(name.to_string()))
    }

    /// Gets a present argument
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>, ArgumentError> {
        self.optional(name)?
            .ok_or_else(|| ArgumentError::Absent(name.to_string()))
    }

    /// Gets an argument which may be absent
    pub fn optional<T: Injectable>(&self, name: &str) -> Result<Option<Arc<T>>, ArgumentError> {
        let Some(instance) = self.lookup(name)? else {
            return Ok(None);
        };

        instance
            .downcast::<T>()
            .map(Some)
            .map_err(|actual_type| ArgumentError::DowncastFailed {
                name: name.to_string(),
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    /// Gets a present argument by value
    pub fn cloned<T: Injectable + Clone>(&self, name: &str) -> Result<T, ArgumentError> {
        self.get::<T>(name).map(|value| T::clone(&value))
    }

    /// Gets an argument which may be absent by value
    pub fn cloned_optional<T: Injectable + Clone>(
        &self,
        name: &str,
    ) -> Result<Option<T>, ArgumentError> {
        Ok(self.optional::<T>(name)?.map(|value| T::clone(&value)))
    }

    /// The raw instance, `None` if absent
    pub fn instance(&self, name: &str) -> Result<Option<&Instance>, ArgumentError> {
        self.lookup(name).map(Option::as_ref)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
