use std::sync::OnceLock;

use depwire_di::{
    security::OAuth2PasswordBearer, Arguments, Dependable, DynError, HttpError, Requirement,
};
use http::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub disabled: bool,
}

/// Users known to the fake token decoder
fn fake_users_db(username: &str) -> Option<User> {
    match username {
        "johndoe" => Some(User {
            username: "johndoe".to_string(),
            email: Some("johndoe@example.com".to_string()),
            full_name: Some("John Doe".to_string()),
            disabled: false,
        }),
        "alice" => Some(User {
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            full_name: Some("Alice Wonderson".to_string()),
            disabled: true,
        }),
        _ => None,
    }
}

/// Tokens are plain usernames
fn fake_decode_token(token: &str) -> Option<User> {
    fake_users_db(token)
}

pub fn oauth2_scheme() -> Dependable {
    static OAUTH2_SCHEME: OnceLock<Dependable> = OnceLock::new();
    OAUTH2_SCHEME
        .get_or_init(|| OAuth2PasswordBearer::new("token").into_dependable())
        .clone()
}

pub fn get_current_user() -> Dependable {
    static CURRENT_USER: OnceLock<Dependable> = OnceLock::new();
    CURRENT_USER
        .get_or_init(|| {
            Dependable::plain("get_current_user", |args: Arguments| async move {
                let token = args.get::<String>("token")?;
                fake_decode_token(&token).ok_or_else(|| {
                    DynError::from(
                        HttpError::new(
                            StatusCode::UNAUTHORIZED,
                            "Invalid authentication credentials",
                        )
                        .with_header("WWW-Authenticate", "Bearer"),
                    )
                })
            })
            .requires(Requirement::depends("token", &oauth2_scheme()))
            .build()
        })
        .clone()
}

pub fn get_current_active_user() -> Dependable {
    static CURRENT_ACTIVE_USER: OnceLock<Dependable> = OnceLock::new();
    CURRENT_ACTIVE_USER
        .get_or_init(|| {
            Dependable::plain("get_current_active_user", |args: Arguments| async move {
                let current_user = args.cloned::<User>("current_user")?;
                if current_user.disabled {
                    return Err(DynError::from(HttpError::new(
                        StatusCode::BAD_REQUEST,
                        "Inactive user",
                    )));
                }
                Ok::<_, DynError>(current_user)
            })
            .requires(Requirement::depends("current_user", &get_current_user()))
            .build()
        })
        .clone()
}
