//! The path operations of the tutorial, one function per operation.

use depwire_config::Config;
use depwire_di::{
    Arguments, BackgroundTasks, DynError, Extractor, HttpError, PathOperation, Requirement,
    Response,
};
use http::StatusCode;
use serde_json::{json, Value};

use crate::{
    catalog::{Catalog, CatalogItem, FAKE_SECRET_TOKEN},
    db::{dependency_c, get_db, DbSession},
    dependencies::{
        common_query_params, get_value, needy_dependency, query_or_cookie_extractor, verify_key,
        verify_token, CommonQueryParams,
    },
    notifications::{get_query, write_log, NotificationLog},
    security::{get_current_active_user, User},
    settings::Settings,
    store::{ItemCreate, StoreError, UserCreate},
};

const FAKE_ITEMS_DB: [&str; 3] = ["Foo", "Bar", "Baz"];

/// `GET /items/`
pub fn read_items() -> PathOperation {
    PathOperation::new("read_items", |args: Arguments| async move {
        let commons = args.get::<CommonQueryParams>("commons")?;
        let items: Vec<Value> = FAKE_ITEMS_DB
            .iter()
            .skip(commons.skip)
            .take(commons.limit)
            .map(|name| json!({ "item_name": name }))
            .collect();

        let mut response = json!({ "items": items });
        if let Some(q) = &commons.q {
            response["q"] = json!(q);
        }
        Ok::<_, DynError>(response)
    })
    .requires(Requirement::depends("commons", &common_query_params()))
}

/// `GET /users/`
pub fn read_users() -> PathOperation {
    PathOperation::new("read_users", |args: Arguments| async move {
        args.cloned::<CommonQueryParams>("commons")
    })
    .requires(Requirement::depends("commons", &common_query_params()))
}

/// `GET /query/`
pub fn read_query() -> PathOperation {
    PathOperation::new("read_query", |args: Arguments| async move {
        let query_or_default = args.cloned::<Option<String>>("query_or_default")?;
        Ok::<_, DynError>(json!({ "q_or_cookie": query_or_default }))
    })
    .requires(Requirement::depends(
        "query_or_default",
        &query_or_cookie_extractor(),
    ))
}

/// `GET /needy/`
pub fn read_needy() -> PathOperation {
    PathOperation::new("read_needy", |args: Arguments| async move {
        let value = args.cloned::<String>("value")?;
        let needy = args.cloned::<Value>("needy")?;
        Ok::<_, DynError>(json!({ "value": value, "needy": needy }))
    })
    .requires(Requirement::depends("value", &get_value()))
    .requires(Requirement::depends("needy", &needy_dependency()))
}

/// `GET /protected-items/`
pub fn read_protected_items() -> PathOperation {
    PathOperation::new("read_protected_items", |_| async {
        Ok::<_, DynError>(json!([{ "item": "Foo" }, { "item": "Bar" }]))
    })
    .dependency(&verify_token())
    .dependency(&verify_key())
}

/// `GET /users/me`
pub fn read_users_me() -> PathOperation {
    PathOperation::new("read_users_me", |args: Arguments| async move {
        args.cloned::<User>("current_user")
    })
    .requires(Requirement::depends(
        "current_user",
        &get_current_active_user(),
    ))
}

/// `POST /send-notification/{email}`
pub fn send_notification() -> PathOperation {
    PathOperation::new("send_notification", |args: Arguments| async move {
        let email = args.cloned::<String>("email")?;
        let background_tasks = args.get::<BackgroundTasks>("background_tasks")?;
        let log = args.get::<NotificationLog>("log")?;

        background_tasks.add_task(write_log(log, format!("message to {email}\n")));
        Ok::<_, DynError>(json!({ "message": "Message sent" }))
    })
    .requires(Extractor::path::<String>("email"))
    .requires(Requirement::background_tasks("background_tasks"))
    .requires(Requirement::depends("q", &get_query()))
    .requires(Requirement::state::<NotificationLog>("log"))
}

fn paging(operation: PathOperation) -> PathOperation {
    operation
        .requires(Extractor::query::<usize>("skip").with_default(0_usize))
        .requires(Extractor::query::<usize>("limit").with_default(100_usize))
}

fn store_error(error: StoreError) -> DynError {
    let status = match error {
        StoreError::EmailAlreadyRegistered(_) => StatusCode::BAD_REQUEST,
        StoreError::UserNotFound(_) => StatusCode::NOT_FOUND,
    };
    HttpError::new(status, error.to_string()).into()
}

/// `POST /db/users/`
pub fn create_user() -> PathOperation {
    PathOperation::new("create_user", |args: Arguments| async move {
        let db = args.get::<DbSession>("db")?;
        let user = args.cloned::<UserCreate>("user")?;
        db.create_user(user).map_err(store_error)
    })
    .requires(Extractor::body::<UserCreate>("user"))
    .requires(Requirement::depends("db", &get_db()))
}

/// `GET /db/users/`
pub fn read_db_users() -> PathOperation {
    paging(PathOperation::new("read_db_users", |args: Arguments| async move {
        let db = args.get::<DbSession>("db")?;
        Ok::<_, DynError>(db.get_users(args.cloned("skip")?, args.cloned("limit")?))
    }))
    .requires(Requirement::depends("db", &get_db()))
}

/// `GET /db/users/{user_id}`
pub fn read_db_user() -> PathOperation {
    PathOperation::new("read_db_user", |args: Arguments| async move {
        let db = args.get::<DbSession>("db")?;
        let user_id = args.cloned::<u32>("user_id")?;
        db.get_user(user_id)
            .ok_or_else(|| store_error(StoreError::UserNotFound(user_id)))
    })
    .requires(Extractor::path::<u32>("user_id"))
    .requires(Requirement::depends("db", &get_db()))
}

/// `POST /db/users/{user_id}/items/`
pub fn create_item_for_user() -> PathOperation {
    PathOperation::new("create_item_for_user", |args: Arguments| async move {
        let db = args.get::<DbSession>("db")?;
        let item = args.cloned::<ItemCreate>("item")?;
        db.create_user_item(item, args.cloned("user_id")?)
            .map_err(store_error)
    })
    .requires(Extractor::path::<u32>("user_id"))
    .requires(Extractor::body::<ItemCreate>("item"))
    .requires(Requirement::depends("db", &get_db()))
}

/// `GET /db/items/`
pub fn read_db_items() -> PathOperation {
    paging(PathOperation::new("read_db_items", |args: Arguments| async move {
        let db = args.get::<DbSession>("db")?;
        Ok::<_, DynError>(db.get_items(args.cloned("skip")?, args.cloned("limit")?))
    }))
    .requires(Requirement::depends("db", &get_db()))
}

/// `GET /sessions/`
pub fn read_sessions() -> PathOperation {
    PathOperation::new("read_sessions", |args: Arguments| async move {
        let c = args.get::<DbSession>("dep_c")?;
        let b = c.parent();
        let a = b.and_then(DbSession::parent);
        Ok::<_, DynError>(json!({
            "a": a.map(DbSession::id),
            "b": b.map(DbSession::id),
            "c": c.id(),
        }))
    })
    .requires(Requirement::depends("dep_c", &dependency_c()))
}

fn check_token(args: &Arguments) -> Result<(), DynError> {
    if args.get::<String>("x_token")?.as_str() != FAKE_SECRET_TOKEN {
        return Err(HttpError::new(StatusCode::BAD_REQUEST, "Invalid X-Token header").into());
    }
    Ok(())
}

/// `GET /catalog/{item_id}`
pub fn read_catalog_item() -> PathOperation {
    PathOperation::new("read_catalog_item", |args: Arguments| async move {
        check_token(&args)?;
        let catalog = args.get::<Catalog>("catalog")?;
        catalog
            .get(&args.cloned::<String>("item_id")?)
            .ok_or_else(|| DynError::from(HttpError::new(StatusCode::NOT_FOUND, "Item not found")))
    })
    .requires(Extractor::path::<String>("item_id"))
    .requires(Extractor::header::<String>("x_token"))
    .requires(Requirement::state::<Catalog>("catalog"))
}

/// `POST /catalog/`
pub fn create_catalog_item() -> PathOperation {
    PathOperation::new("create_catalog_item", |args: Arguments| async move {
        check_token(&args)?;
        let catalog = args.get::<Catalog>("catalog")?;
        catalog
            .insert(args.cloned::<CatalogItem>("item")?)
            .map_err(|exists| DynError::from(HttpError::new(StatusCode::BAD_REQUEST, exists.to_string())))
    })
    .requires(Extractor::body::<CatalogItem>("item"))
    .requires(Extractor::header::<String>("x_token"))
    .requires(Requirement::state::<Catalog>("catalog"))
}

/// `GET /inventory/`, guarded by the inventory group's token check
pub fn read_inventory_items() -> PathOperation {
    PathOperation::new("read_inventory_items", |_| async {
        Ok::<_, DynError>(json!([{ "name": "Item Foo" }, { "name": "item Bar" }]))
    })
}

/// `GET /inventory/{item_id}`
pub fn read_inventory_item() -> PathOperation {
    PathOperation::new("read_inventory_item", |args: Arguments| async move {
        let item_id = args.cloned::<String>("item_id")?;
        Ok::<_, DynError>(json!({ "name": "Fake Specific Item", "item_id": item_id }))
    })
    .requires(Extractor::path::<String>("item_id"))
}

/// `PUT /inventory/{item_id}`
pub fn update_inventory_item() -> PathOperation {
    PathOperation::new("update_inventory_item", |args: Arguments| async move {
        let item_id = args.cloned::<String>("item_id")?;
        if item_id != "foo" {
            return Err(DynError::from(HttpError::new(
                StatusCode::FORBIDDEN,
                "You can only update the item: foo",
            )));
        }
        Ok::<_, DynError>(json!({ "item_id": item_id, "name": "The Fighters" }))
    })
    .requires(Extractor::path::<String>("item_id"))
}

/// `GET /errors/items/{item_id}`
pub fn read_error_item() -> PathOperation {
    PathOperation::new("read_error_item", |args: Arguments| async move {
        let item_id = args.cloned::<String>("item_id")?;
        if item_id != "foo" {
            return Err(DynError::from(
                HttpError::new(StatusCode::NOT_FOUND, "Item not found")
                    .with_header("X-Error", "There goes my error"),
            ));
        }
        Ok::<_, DynError>(json!({ "item": "The Foo Wrestlers" }))
    })
    .requires(Extractor::path::<String>("item_id"))
}

/// Raised by [read_unicorn], answered by [unicorn_response]
#[derive(thiserror::Error, Debug)]
#[error("unicorn {name} did something")]
pub struct UnicornError {
    pub name: String,
}

pub fn unicorn_response(error: &UnicornError) -> Response {
    Response::json(
        StatusCode::IM_A_TEAPOT,
        json!({
            "message": format!("Oops! {} did something. There goes a rainbow...", error.name)
        }),
    )
}

/// `GET /unicorns/{name}`
pub fn read_unicorn() -> PathOperation {
    PathOperation::new("read_unicorn", |args: Arguments| async move {
        let name = args.cloned::<String>("name")?;
        if name == "yolo" {
            return Err(DynError::from(UnicornError { name }));
        }
        Ok::<_, DynError>(json!({ "unicorn_name": name }))
    })
    .requires(Extractor::path::<String>("name"))
}

/// `GET /info`
pub fn read_info() -> PathOperation {
    PathOperation::new("read_info", |args: Arguments| async move {
        let settings = args.get::<Config<Settings>>("settings")?;
        Ok::<_, DynError>(Settings::clone(&settings))
    })
    .requires(Config::<Settings>::requirement("settings"))
}
