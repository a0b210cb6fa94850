use std::{any::TypeId, error::Error, fmt::Display, sync::Arc};

use http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::{errors::ResolveError, extract::ValidationErrors};

/// A finalized response: status, headers and a JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    pub fn json(status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Response {
            status,
            headers,
            body,
        }
    }

    /// `{"detail": detail}`
    pub fn detail(status: StatusCode, detail: impl Into<Value>) -> Self {
        Response::json(status, json!({ "detail": detail.into() }))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// An error which chooses its own client facing response
///
/// Return it from a dependable or a handler to reject a request with `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub status: StatusCode,
    pub detail: Value,
    pub headers: HeaderMap,
}

impl HttpError {
    pub fn new(status: StatusCode, detail: impl Into<Value>) -> Self {
        HttpError {
            status,
            detail: detail.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Ignores headers which are not valid http header names or values
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header '{name}'"),
        }
        self
    }

    pub fn to_response(&self) -> Response {
        let mut response = Response::detail(self.status, self.detail.clone());
        response.headers.extend(self.headers.clone());
        response
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail.as_str() {
            Some(detail) => write!(f, "{}: {}", self.status, detail),
            None => write!(f, "{}: {}", self.status, self.detail),
        }
    }
}

impl Error for HttpError {}

type HandlerFn = dyn Fn(&(dyn Error + Send + Sync + 'static)) -> Option<Response> + Send + Sync;
type ValidationHandlerFn = dyn Fn(&ValidationErrors) -> Response + Send + Sync;

/// Maps failed requests to responses
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    handlers: Vec<(TypeId, &'static str, Arc<HandlerFn>)>,
    validation: Option<Arc<ValidationHandlerFn>>,
}

impl std::fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (_, type_name, _) in &self.handlers {
            list.entry(type_name);
        }
        list.finish()
    }
}

impl ErrorHandlers {
    /// Handles every dependable or handler error of type `E`
    ///
    /// A handler registered later for the same type replaces the earlier one.
    pub fn on<E, F>(&mut self, handler: F)
    where
        E: Error + Send + Sync + 'static,
        F: Fn(&E) -> Response + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let erased: Arc<HandlerFn> =
            Arc::new(move |error: &(dyn Error + Send + Sync + 'static)| {
                error.downcast_ref::<E>().map(&handler)
            });
        self.handlers.retain(|(id, _, _)| *id != type_id);
        self.handlers
            .push((type_id, std::any::type_name::<E>(), erased));
    }

    /// Replaces the default 422 response for invalid requests
    pub fn on_validation<F>(&mut self, handler: F)
    where
        F: Fn(&ValidationErrors) -> Response + Send + Sync + 'static,
    {
        self.validation = Some(Arc::new(handler));
    }

    pub fn respond(&self, error: &ResolveError) -> Response {
        if let Some(user_error) = error.user_error() {
            for (_, _, handler) in &self.handlers {
                if let Some(response) = handler(user_error) {
                    return response;
                }
            }
        }

        match error {
            ResolveError::Validation(errors) => match &self.validation {
                Some(handler) => handler(errors),
                None => Response::json(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "detail": errors.errors }),
                ),
            },
            ResolveError::Setup { dependable, error } => match http_error(error.as_ref()) {
                Some(http) => http.to_response(),
                None => Response::json(
                    StatusCode::BAD_REQUEST,
                    json!({ "detail": error.to_string(), "dependable": dependable }),
                ),
            },
            ResolveError::Handler { error, .. } => match http_error(error.as_ref()) {
                Some(http) => http.to_response(),
                None => internal_server_error(),
            },
            ResolveError::Teardown { .. }
            | ResolveError::State(_)
            | ResolveError::CircularDependency { .. }
            | ResolveError::InvalidState { .. } => internal_server_error(),
        }
    }
}

fn http_error<'e>(error: &'e (dyn Error + Send + Sync + 'static)) -> Option<&'e HttpError> {
    error.downcast_ref::<HttpError>()
}

pub(crate) fn internal_server_error() -> Response {
    Response::detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

#[cfg(test)]
mod tests {
    use http::header::WWW_AUTHENTICATE;

    use super::*;
    use crate::extract::{Source, ValidationError, ValidationErrorKind};

    #[derive(thiserror::Error, Debug)]
    #[error("unicorn {0}")]
    struct UnicornError(String);

    fn setup(error: impl Into<crate::types::DynError>) -> ResolveError {
        ResolveError::Setup {
            dependable: "verify_token",
            error: error.into(),
        }
    }

    #[test]
    fn validation_is_unprocessable() {
        let error = ResolveError::Validation(ValidationErrors {
            errors: vec![ValidationError {
                loc: (Source::Header, "x-token".to_string()),
                msg: "field required".to_string(),
                kind: ValidationErrorKind::Missing,
            }],
        });

        let response = ErrorHandlers::default().respond(&error);
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.body,
            json!({"detail": [{"loc": ["header", "x-token"], "msg": "field required", "type": "value_error.missing"}]})
        );

        let mut handlers = ErrorHandlers::default();
        handlers.on_validation(|errors| {
            Response::detail(StatusCode::BAD_REQUEST, errors.errors.len())
        });
        assert_eq!(handlers.respond(&error).status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn http_errors_choose_their_response() {
        let error = setup(
            HttpError::new(StatusCode::UNAUTHORIZED, "Not authenticated")
                .with_header("www-authenticate", "Bearer"),
        );

        let response = ErrorHandlers::default().respond(&error);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body, json!({"detail": "Not authenticated"}));
        assert_eq!(response.header(WWW_AUTHENTICATE.as_str()), Some("Bearer"));
    }

    #[test]
    fn other_errors_fall_back() {
        let handlers = ErrorHandlers::default();

        let response = handlers.respond(&setup("no db"));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body,
            json!({"detail": "no db", "dependable": "verify_token"})
        );

        let response = handlers.respond(&ResolveError::Handler {
            operation: "read_items",
            error: "boom".into(),
        });
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, json!({"detail": "Internal Server Error"}));

        let response = handlers.respond(&ResolveError::CircularDependency {
            chain: vec!["a", "a"],
        });
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn custom_handlers_win() {
        let mut handlers = ErrorHandlers::default();
        handlers.on::<UnicornError, _>(|e| {
            Response::json(
                StatusCode::IM_A_TEAPOT,
                json!({ "message": format!("Oops! {} did something.", e.0) }),
            )
        });

        let response = handlers.respond(&ResolveError::Handler {
            operation: "read_unicorn",
            error: Box::new(UnicornError("yolo".to_string())),
        });
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(
            response.body,
            json!({"message": "Oops! yolo did something."})
        );

        // Other error types are untouched
        assert_eq!(
            handlers.respond(&setup("no db")).status,
            StatusCode::BAD_REQUEST
        );
    }
}
