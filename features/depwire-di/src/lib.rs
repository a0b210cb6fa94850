//! Depwire DI resolves request scoped dependencies for async handlers.
//!
//! Handlers and dependables declare what they require: request values, other dependables,
//! application scoped instances, the request itself or its background tasks.
//! A [ResolutionContext] resolves these depth first for one request, caches dependables that
//! are referenced more than once and releases scoped dependables in reverse order once the
//! response is final.
//!
//! # Examples
//!
//! ```rust
//! use depwire_di::{App, Arguments, Dependable, Extractor, PathOperation, RequestParts, Requirement};
//!
//! let common_parameters = Dependable::plain("common_parameters", |args: Arguments| async move {
//!     let skip = args.cloned::<u32>("skip")?;
//!     let limit = args.cloned::<u32>("limit")?;
//!     Ok::<_, depwire_di::DynError>((skip, limit))
//! })
//! .requires(Extractor::query::<u32>("skip").with_default(0_u32))
//! .requires(Extractor::query::<u32>("limit").with_default(100_u32))
//! .build();
//!
//! let read_items = PathOperation::new("read_items", |args: Arguments| async move {
//!     let (skip, limit) = args.cloned::<(u32, u32)>("commons")?;
//!     Ok::<_, depwire_di::DynError>(serde_json::json!({ "skip": skip, "limit": limit }))
//! })
//! .requires(Requirement::depends("commons", &common_parameters));
//!
//! let app = App::builder().build();
//! let request = RequestParts::builder().query("limit", "10").build();
//! let response = futures::executor::block_on(app.serve(&read_items, request));
//!
//! assert_eq!(response.body, serde_json::json!({ "skip": 0, "limit": 10 }));
//! ```
//!
//! Depwire DI consists of the following components:
//!
//! 1. Dependable and Requirement - for declaring units of work and what they need
//! 2. Extractor - for reading and validating request values
//! 3. ResolutionContext - for resolving, caching and tearing down within one request
//! 4. App and PathOperation - for handling requests and mapping errors to responses

pub mod arguments;
pub mod background;
pub mod container;
pub mod context;
pub mod dependable;
pub mod dependency_graph;
pub mod errors;
pub mod extract;
pub mod handling;
pub mod overrides;
pub mod request;
pub mod requirement;
pub mod response;
pub mod security;
pub mod types;

pub use arguments::{ArgumentError, Arguments};
pub use background::BackgroundTasks;
pub use container::AppState;
pub use context::{AbandonedTeardowns, ContextState, ResolutionContext};
pub use dependable::{Construct, Dependable, DependableBuilder};
pub use dependency_graph::{DependencyGraph, DependencyGraphError, DependencyGraphErrors};
pub use errors::{RequireError, ResolveError, TeardownFailure};
pub use extract::{Extractor, Source, ValidationError, ValidationErrorKind, ValidationErrors};
pub use handling::{App, AppBuilder, Handled, PathOperation};
pub use overrides::Overrides;
pub use request::{RequestParts, RequestPartsBuilder};
pub use requirement::Requirement;
pub use response::{ErrorHandlers, HttpError, Response};
pub use types::{CachePolicy, DependableKey, DynError, Injectable, Instance, TypeInfo};
