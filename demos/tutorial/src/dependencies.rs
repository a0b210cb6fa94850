use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

use depwire_config::Config;
use depwire_di::{
    Arguments, Construct, Dependable, DynError, Extractor, HttpError, Requirement,
};
use http::StatusCode;
use serde::Serialize;

use crate::settings::Settings;

/// Paging parameters shared by the listing operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonQueryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

impl Construct for CommonQueryParams {
    fn requirements() -> Vec<Requirement> {
        vec![
            Extractor::query::<String>("q").optional().into(),
            Extractor::query::<usize>("skip").with_default(0_usize).into(),
            Extractor::query::<usize>("limit").with_default(100_usize).into(),
        ]
    }

    fn construct(args: &Arguments) -> Result<Self, DynError> {
        Ok(CommonQueryParams {
            q: args.cloned_optional("q")?,
            skip: args.cloned("skip")?,
            limit: args.cloned("limit")?,
        })
    }
}

pub fn common_query_params() -> Dependable {
    Dependable::constructible::<CommonQueryParams>().build()
}

pub fn query_extractor() -> Dependable {
    static QUERY_EXTRACTOR: OnceLock<Dependable> = OnceLock::new();
    QUERY_EXTRACTOR
        .get_or_init(|| {
            Dependable::plain("query_extractor", |args: Arguments| async move {
                args.cloned_optional::<String>("q")
            })
            .requires(Extractor::query::<String>("q").optional())
            .build()
        })
        .clone()
}

/// The `q` query parameter, or the `last_query` cookie if `q` is empty
pub fn query_or_cookie_extractor() -> Dependable {
    static QUERY_OR_COOKIE: OnceLock<Dependable> = OnceLock::new();
    QUERY_OR_COOKIE
        .get_or_init(|| {
            Dependable::plain("query_or_cookie_extractor", |args: Arguments| async move {
                let q = args.cloned::<Option<String>>("q")?;
                match q {
                    Some(q) if !q.is_empty() => Ok::<_, DynError>(Some(q)),
                    _ => Ok(args.cloned_optional::<String>("last_query")?),
                }
            })
            .requires(Requirement::depends("q", &query_extractor()))
            .requires(Extractor::cookie::<String>("last_query").optional())
            .build()
        })
        .clone()
}

/// Numbers the values handed out by [get_value], one counter per application
#[derive(Debug, Default)]
pub struct ValueCounter {
    calls: AtomicUsize,
}

impl ValueCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_call(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Counts its invocations, so the cached and fresh uses can be told apart
pub fn get_value() -> Dependable {
    static GET_VALUE: OnceLock<Dependable> = OnceLock::new();
    GET_VALUE
        .get_or_init(|| {
            Dependable::plain("get_value", |args: Arguments| async move {
                let call = args.get::<ValueCounter>("counter")?.next_call();
                Ok::<_, DynError>(format!("VALUE! #{call}"))
            })
            .requires(Requirement::state::<ValueCounter>("counter"))
            .build()
        })
        .clone()
}

/// Wants a new value of [get_value] even if the request already has one
pub fn needy_dependency() -> Dependable {
    static NEEDY: OnceLock<Dependable> = OnceLock::new();
    NEEDY
        .get_or_init(|| {
            Dependable::plain("needy_dependency", |args: Arguments| async move {
                let fresh_value = args.cloned::<String>("fresh_value")?;
                Ok::<_, DynError>(serde_json::json!({ "fresh_value": fresh_value }))
            })
            .requires(Requirement::depends_fresh("fresh_value", &get_value()))
            .build()
        })
        .clone()
}

pub fn verify_token() -> Dependable {
    static VERIFY_TOKEN: OnceLock<Dependable> = OnceLock::new();
    VERIFY_TOKEN
        .get_or_init(|| {
            Dependable::plain("verify_token", |args: Arguments| async move {
                let settings = args.get::<Config<Settings>>("settings")?;
                let x_token = args.get::<String>("x_token")?;
                if *x_token != settings.x_token {
                    return Err(DynError::from(HttpError::new(
                        StatusCode::BAD_REQUEST,
                        "X-Token header invalid",
                    )));
                }
                Ok::<(), DynError>(())
            })
            .requires(Extractor::header::<String>("x_token"))
            .requires(Config::<Settings>::requirement("settings"))
            .build()
        })
        .clone()
}

/// Returns the key, though as a decorator dependency its value is never read
pub fn verify_key() -> Dependable {
    static VERIFY_KEY: OnceLock<Dependable> = OnceLock::new();
    VERIFY_KEY
        .get_or_init(|| {
            Dependable::plain("verify_key", |args: Arguments| async move {
                let settings = args.get::<Config<Settings>>("settings")?;
                let x_key = args.cloned::<String>("x_key")?;
                if x_key != settings.x_key {
                    return Err(DynError::from(HttpError::new(
                        StatusCode::BAD_REQUEST,
                        "X-Key header invalid",
                    )));
                }
                Ok::<_, DynError>(x_key)
            })
            .requires(Extractor::header::<String>("x_key"))
            .requires(Config::<Settings>::requirement("settings"))
            .build()
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use depwire_config::ConfigProvider;
    use depwire_di::{App, AppState, RequestParts, ResolutionContext, ResolveError};
    use futures::executor::block_on;

    use super::*;

    fn state() -> AppState {
        let mut config_provider = ConfigProvider::initialize();
        config_provider.add_config(Settings::default()).unwrap();
        App::builder()
            .add_instance(config_provider)
            .add_instance(ValueCounter::new())
            .build()
            .state()
            .clone()
    }

    fn resolve(
        requirements: &[Requirement],
        request: RequestParts,
    ) -> Result<Arguments, ResolveError> {
        let mut ctx = ResolutionContext::new(request, state(), Default::default());
        block_on(ctx.resolve(requirements))
    }

    #[test]
    fn common_query_params_defaults() {
        let request = RequestParts::builder().query("q", "foo").query("limit", "2").build();
        let args = resolve(&[Requirement::depends("commons", &common_query_params())], request)
            .unwrap();

        assert_eq!(
            args.cloned::<CommonQueryParams>("commons").unwrap(),
            CommonQueryParams {
                q: Some("foo".to_string()),
                skip: 0,
                limit: 2,
            }
        );
    }

    #[test]
    fn empty_query_falls_back_to_cookie() {
        let request = RequestParts::builder()
            .query("q", "")
            .cookie("last_query", "from cookie")
            .build();
        let args = resolve(
            &[Requirement::depends("query_or_default", &query_or_cookie_extractor())],
            request,
        )
        .unwrap();

        assert_eq!(
            args.cloned::<Option<String>>("query_or_default").unwrap(),
            Some("from cookie".to_string())
        );
    }

    #[test]
    fn fresh_value_is_not_shared() {
        let args = resolve(
            &[
                Requirement::depends("value", &get_value()),
                Requirement::depends("needy", &needy_dependency()),
                Requirement::depends("value_again", &get_value()),
            ],
            RequestParts::builder().build(),
        )
        .unwrap();

        let needy = args.get::<serde_json::Value>("needy").unwrap();
        assert_eq!(
            args.cloned::<String>("value").unwrap(),
            args.cloned::<String>("value_again").unwrap()
        );
        assert_ne!(needy["fresh_value"], args.cloned::<String>("value").unwrap());
    }

    #[test]
    fn verify_token_rejects_wrong_token() {
        let request = RequestParts::builder().header("x-token", "wrong").build();
        let err = resolve(&[Requirement::depends("token", &verify_token())], request)
            .unwrap_err();

        let error = err.user_error().and_then(|e| e.downcast_ref::<HttpError>());
        assert_eq!(
            error.map(|e| e.detail.clone()),
            Some(serde_json::json!("X-Token header invalid"))
        );
    }

    #[test]
    fn value_counter_belongs_to_the_application() {
        let first = state();
        let second = state();
        let value = [Requirement::depends("value", &get_value())];

        for expected in ["VALUE! #1", "VALUE! #2"] {
            let mut ctx = ResolutionContext::new(
                RequestParts::builder().build(),
                first.clone(),
                Default::default(),
            );
            let args = block_on(ctx.resolve(&value)).unwrap();
            assert_eq!(args.cloned::<String>("value").unwrap(), expected);
        }

        // Another application starts counting on its own
        let mut ctx =
            ResolutionContext::new(RequestParts::builder().build(), second.clone(), Default::default());
        let args = block_on(ctx.resolve(&value)).unwrap();
        assert_eq!(args.cloned::<String>("value").unwrap(), "VALUE! #1");
        assert_eq!(first.require::<ValueCounter>().unwrap().calls(), 2);
    }
}
