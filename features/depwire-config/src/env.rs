//! Utilities to read configs from environment variables.

use std::{env, fmt::Display, str::FromStr};

use crate::errors::EnvError;

/// Gets a required environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
pub fn get_required_var<T>(prefix: &str, suffix: &str) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: Display,
{
    let name = format!("{}_{}", prefix, suffix);
    get_optional_var(prefix, suffix)?.ok_or(EnvError::Missing(name))
}

/// Gets an optional environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
///
/// An unset variable is `Ok(None)`, a present but invalid one is still an error.
pub fn get_optional_var<T>(prefix: &str, suffix: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: Display,
{
    let name = format!("{}_{}", prefix, suffix);
    match env::var(&name) {
        Ok(value) => match value.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(EnvError::InvalidType {
                name,
                message: e.to_string(),
            }),
        },
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(EnvError::NotUnicode(name)),
    }
}
