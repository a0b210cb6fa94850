use std::{borrow::Cow, fmt::Display, str::FromStr, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    request::RequestParts,
    types::{Injectable, Instance, TypeInfo},
};

/// Where in the request a value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}
impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Body => "body",
        })
    }
}

/// Raw, not yet coerced request value
enum Raw<'a> {
    Text(Cow<'a, str>),
    TextList(Vec<&'a str>),
    Json(&'a serde_json::Value),
}

type ParseFn = dyn Fn(Raw<'_>) -> Result<Instance, String> + Send + Sync;

/// What happens when the value is absent
#[derive(Clone)]
enum Presence {
    Required,
    Optional,
    Default(Instance),
}

/// A request derived parameter: source, name, type and presence rules
#[derive(Clone)]
pub struct Extractor {
    source: Source,
    name: String,
    alias: String,
    target: TypeInfo,
    presence: Presence,
    /// Embedded body fields are looked up by name, otherwise the whole body is used
    embed: bool,
    /// Collects every occurrence of a repeated query parameter
    multi: bool,
    parse: Arc<ParseFn>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("source", &self.source)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("target", &self.target.type_name)
            .finish()
    }
}

impl Extractor {
    fn text<T>(source: Source, name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Extractor {
            source,
            name: name.to_string(),
            alias: name.to_string(),
            target: TypeInfo::of::<T>(),
            presence: Presence::Required,
            embed: true,
            multi: false,
            parse: Arc::new(|raw: Raw<'_>| match raw {
                Raw::Text(text) => text
                    .parse::<T>()
                    .map(Instance::new)
                    .map_err(|e| e.to_string()),
                Raw::TextList(_) => Err("expected a single value".to_string()),
                Raw::Json(_) => Err("expected a text value".to_string()),
            }),
        }
    }

    pub fn path<T>(name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Self::text::<T>(Source::Path, name)
    }

    pub fn query<T>(name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Self::text::<T>(Source::Query, name)
    }

    /// A repeated query parameter, resolved as `Vec<T>`
    pub fn query_list<T>(name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Extractor {
            parse: Arc::new(|raw: Raw<'_>| match raw {
                Raw::TextList(values) => values
                    .into_iter()
                    .map(|value| value.parse::<T>().map_err(|e| e.to_string()))
                    .collect::<Result<Vec<T>, _>>()
                    .map(Instance::new),
                Raw::Text(text) => text
                    .parse::<T>()
                    .map(|v| Instance::new(vec![v]))
                    .map_err(|e| e.to_string()),
                Raw::Json(_) => Err("expected a text value".to_string()),
            }),
            target: TypeInfo::of::<Vec<T>>(),
            multi: true,
            ..Self::text::<T>(Source::Query, name)
        }
    }

    /// Header names are matched case insensitively, underscores in `name` become hyphens
    pub fn header<T>(name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Self::text::<T>(Source::Header, name).alias(&name.replace('_', "-"))
    }

    pub fn cookie<T>(name: &str) -> Self
    where
        T: FromStr + Injectable,
        T::Err: Display,
    {
        Self::text::<T>(Source::Cookie, name)
    }

    /// A single field of a json body
    pub fn body_field<T: DeserializeOwned + Injectable>(name: &str) -> Self {
        Extractor {
            source: Source::Body,
            name: name.to_string(),
            alias: name.to_string(),
            target: TypeInfo::of::<T>(),
            presence: Presence::Required,
            embed: true,
            multi: false,
            parse: Arc::new(|raw: Raw<'_>| match raw {
                Raw::Json(value) => serde_json::from_value::<T>(value.clone())
                    .map(Instance::new)
                    .map_err(|e| e.to_string()),
                _ => Err("expected a json value".to_string()),
            }),
        }
    }

    /// The whole json body, deserialized as `T`
    pub fn body<T: DeserializeOwned + Injectable>(name: &str) -> Self {
        Extractor {
            embed: false,
            ..Self::body_field::<T>(name)
        }
    }

    /// Absent values resolve to `None`
    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    /// Absent values resolve to `value`
    pub fn with_default<T: Injectable>(mut self, value: T) -> Self {
        debug_assert_eq!(
            TypeInfo::of::<T>(),
            self.target,
            "default value type must match the extracted type"
        );
        self.presence = Presence::Default(Instance::new(value));
        self
    }

    /// Look the value up under a different name than the argument name
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// The name the value is bound to in [crate::Arguments]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name the value is looked up with in the request
    pub fn lookup_name(&self) -> &str {
        &self.alias
    }

    pub fn target(&self) -> TypeInfo {
        self.target
    }

    pub fn is_required(&self) -> bool {
        matches!(self.presence, Presence::Required)
    }

    /// Pulls the value from the request and coerces it to the target type
    ///
    /// Returns `Ok(None)` for absent optional values. A json `null` counts as absent.
    pub fn extract(&self, request: &RequestParts) -> Result<Option<Instance>, ValidationError> {
        let raw = match self.raw(request)? {
            Some(Raw::Json(serde_json::Value::Null)) if !self.is_required() => None,
            raw => raw,
        };
        let raw = match raw {
            Some(raw) => raw,
            None => {
                return match &self.presence {
                    Presence::Required => Err(self.error(
                        ValidationErrorKind::Missing,
                        "field required".to_string(),
                    )),
                    Presence::Optional => Ok(None),
                    Presence::Default(value) => Ok(Some(value.clone())),
                }
            }
        };

        (self.parse)(raw)
            .map(Some)
            .map_err(|msg| self.error(ValidationErrorKind::TypeError, msg))
    }

    fn raw<'r>(&self, request: &'r RequestParts) -> Result<Option<Raw<'r>>, ValidationError> {
        let raw = match self.source {
            Source::Path => request
                .path_param(&self.alias)
                .map(|value| Raw::Text(Cow::Borrowed(value))),
            Source::Header => request
                .header(&self.alias)
                .map(|value| Raw::Text(Cow::Borrowed(value))),
            Source::Cookie => request
                .cookie(&self.alias)
                .map(|value| Raw::Text(Cow::Owned(value))),
            Source::Query if self.multi => {
                let values: Vec<&str> = request.query_params(&self.alias).collect();
                (!values.is_empty()).then_some(Raw::TextList(values))
            }
            Source::Query => request
                .query_param(&self.alias)
                .map(|value| Raw::Text(Cow::Borrowed(value))),
            Source::Body => {
                let body = request.json().map_err(|msg| {
                    self.error(ValidationErrorKind::JsonInvalid, msg.to_string())
                })?;
                match (body, self.embed) {
                    (Some(body), true) => body.get(&self.alias).map(Raw::Json),
                    (Some(body), false) => Some(Raw::Json(body)),
                    (None, _) => None,
                }
            }
        };

        Ok(raw)
    }

    fn error(&self, kind: ValidationErrorKind, msg: String) -> ValidationError {
        ValidationError {
            loc: (self.source, self.alias.clone()),
            msg,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    #[serde(rename = "value_error.missing")]
    Missing,
    #[serde(rename = "type_error")]
    TypeError,
    #[serde(rename = "value_error.jsondecode")]
    JsonInvalid,
}

/// A request value failed to extract
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{loc:?}: {msg}")]
pub struct ValidationError {
    pub loc: (Source, String),
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
}

/// All validation errors collected while resolving one request
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}
impl Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The request had one or more invalid values:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}
