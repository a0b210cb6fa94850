use http::{header::AUTHORIZATION, StatusCode};

use crate::{
    arguments::Arguments, dependable::Dependable, request::RequestParts,
    requirement::Requirement, response::HttpError, types::DynError,
};

/// Reads an OAuth2 bearer token from the `Authorization` header
///
/// The produced dependable yields the token as `String`. With `auto_error(false)` it yields
/// `Option<String>` instead and leaves rejecting the request to its dependants.
#[derive(Debug, Clone)]
pub struct OAuth2PasswordBearer {
    token_url: String,
    auto_error: bool,
}

impl OAuth2PasswordBearer {
    pub fn new(token_url: &str) -> Self {
        OAuth2PasswordBearer {
            token_url: token_url.to_string(),
            auto_error: true,
        }
    }

    pub fn auto_error(mut self, auto_error: bool) -> Self {
        self.auto_error = auto_error;
        self
    }

    /// The URL clients obtain tokens from
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn into_dependable(self) -> Dependable {
        let builder = if self.auto_error {
            Dependable::plain("oauth2_scheme", |args: Arguments| async move {
                let request = args.get::<RequestParts>("request")?;
                bearer_token(&request).ok_or_else(|| DynError::from(not_authenticated()))
            })
        } else {
            Dependable::plain("oauth2_scheme", |args: Arguments| async move {
                let request = args.get::<RequestParts>("request")?;
                Ok::<_, DynError>(bearer_token(&request))
            })
        };

        builder.requires(Requirement::request("request")).build()
    }
}

fn not_authenticated() -> HttpError {
    HttpError::new(StatusCode::UNAUTHORIZED, "Not authenticated")
        .with_header("www-authenticate", "Bearer")
}

fn bearer_token(request: &RequestParts) -> Option<String> {
    let authorization = request.header(AUTHORIZATION.as_str())?;
    let (scheme, token) = authorization.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}
