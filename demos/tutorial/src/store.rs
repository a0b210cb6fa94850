//! In memory users and items, owned by the application and shared through [depwire_di::AppState].

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: u32,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemCreate {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: u32,
    pub email: String,
    #[serde(skip)]
    pub hashed_password: String,
    pub is_active: bool,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Email already registered")]
    EmailAlreadyRegistered(String),
    #[error("User not found")]
    UserNotFound(u32),
}

/// Session events kept by a [Store], older ones are dropped
pub const SESSION_EVENT_HISTORY: usize = 64;

#[derive(Default)]
struct Tables {
    users: BTreeMap<u32, User>,
    items: BTreeMap<u32, Item>,
    next_user_id: u32,
    next_item_id: u32,
}

/// Users and their items
///
/// Handlers reach it through a [crate::db::DbSession], which also records session events.
#[derive(Default)]
pub struct Store {
    tables: Mutex<Tables>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    events: Mutex<VecDeque<String>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("opened", &self.sessions_opened())
            .field("closed", &self.sessions_closed())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn session_opened(&self, label: &str) -> usize {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("open {label}#{id}"));
        id
    }

    pub(crate) fn session_closed(&self, label: &str, id: usize) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.record(format!("close {label}#{id}"));
    }

    fn record(&self, event: String) {
        let mut events = self.events();
        if events.len() == SESSION_EVENT_HISTORY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The latest session opens and closes, oldest first
    pub fn session_events(&self) -> Vec<String> {
        self.events().iter().cloned().collect()
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Every write is a single insert, so poisoned tables are still consistent
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_user(&self, user_id: u32) -> Option<User> {
        let tables = self.tables();
        tables.users.get(&user_id).map(|user| with_items(&tables, user))
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        let tables = self.tables();
        tables
            .users
            .values()
            .find(|user| user.email == email)
            .map(|user| with_items(&tables, user))
    }

    pub fn get_users(&self, skip: usize, limit: usize) -> Vec<User> {
        let tables = self.tables();
        tables
            .users
            .values()
            .skip(skip)
            .take(limit)
            .map(|user| with_items(&tables, user))
            .collect()
    }

    pub fn create_user(&self, user: UserCreate) -> Result<User, StoreError> {
        let mut tables = self.tables();
        if tables.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::EmailAlreadyRegistered(user.email));
        }

        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            email: user.email,
            hashed_password: user.password + "notreallyhashed",
            is_active: true,
            items: Vec::new(),
        };
        tables.users.insert(created.id, created.clone());
        tracing::info!("Created user {}", created.id);
        Ok(created)
    }

    pub fn get_items(&self, skip: usize, limit: usize) -> Vec<Item> {
        self.tables()
            .items
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn create_user_item(&self, item: ItemCreate, user_id: u32) -> Result<Item, StoreError> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound(user_id));
        }

        tables.next_item_id += 1;
        let created = Item {
            id: tables.next_item_id,
            title: item.title,
            description: item.description,
            owner_id: user_id,
        };
        tables.items.insert(created.id, created.clone());
        Ok(created)
    }
}

fn with_items(tables: &Tables, user: &User) -> User {
    let mut user = user.clone();
    user.items = tables
        .items
        .values()
        .filter(|item| item.owner_id == user.id)
        .cloned()
        .collect();
    user
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deadpool() -> UserCreate {
        UserCreate {
            email: "deadpool@example.com".to_string(),
            password: "chimichangas4life".to_string(),
        }
    }

    #[test]
    fn create_user_hashes_and_rejects_duplicates() {
        let store = Store::new();
        let user = store.create_user(deadpool()).unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.hashed_password, "chimichangas4lifenotreallyhashed");
        assert!(user.is_active);
        assert_eq!(
            store.create_user(deadpool()),
            Err(StoreError::EmailAlreadyRegistered(
                "deadpool@example.com".to_string()
            ))
        );
        assert_eq!(store.get_user_by_email("deadpool@example.com"), Some(user));
    }

    #[test]
    fn session_events_keep_only_the_latest() {
        let store = Store::new();
        for _ in 0..SESSION_EVENT_HISTORY {
            let id = store.session_opened("get_db");
            store.session_closed("get_db", id);
        }

        let events = store.session_events();
        assert_eq!(events.len(), SESSION_EVENT_HISTORY);
        let first_kept = SESSION_EVENT_HISTORY / 2 + 1;
        assert_eq!(events[0], format!("open get_db#{first_kept}"));
        assert_eq!(
            events.last().map(String::as_str),
            Some(format!("close get_db#{SESSION_EVENT_HISTORY}").as_str())
        );
        assert_eq!(store.sessions_opened(), SESSION_EVENT_HISTORY);
        assert_eq!(store.sessions_closed(), SESSION_EVENT_HISTORY);
    }

    #[test]
    fn items_belong_to_users() {
        let store = Store::new();
        let user = store.create_user(deadpool()).unwrap();
        let item = ItemCreate {
            title: "Katana".to_string(),
            description: None,
        };

        assert_eq!(
            store.create_user_item(item.clone(), 42),
            Err(StoreError::UserNotFound(42))
        );
        let created = store.create_user_item(item, user.id).unwrap();

        assert_eq!(store.get_user(user.id).unwrap().items, vec![created.clone()]);
        assert_eq!(store.get_items(0, 100), vec![created]);
        assert!(store.get_items(1, 100).is_empty());
        assert_eq!(store.get_users(0, 0), vec![]);
    }
}
