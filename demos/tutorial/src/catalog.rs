use std::{collections::BTreeMap, sync::Mutex};

use serde::{Deserialize, Serialize};

/// The token every catalog request has to send as `X-Token`
pub const FAKE_SECRET_TOKEN: &str = "coneofsilence";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Item already exists")]
pub struct ItemExists(pub String);

/// Items keyed by their id, seeded with `foo` and `bar`
#[derive(Debug)]
pub struct Catalog {
    items: Mutex<BTreeMap<String, CatalogItem>>,
}

impl Default for Catalog {
    fn default() -> Self {
        let seed = [
            ("foo", "Foo", "There goes my hero"),
            ("bar", "Bar", "The bartenders"),
        ];
        let items = seed
            .into_iter()
            .map(|(id, title, description)| {
                let item = CatalogItem {
                    id: id.to_string(),
                    title: title.to_string(),
                    description: Some(description.to_string()),
                };
                (item.id.clone(), item)
            })
            .collect();

        Catalog {
            items: Mutex::new(items),
        }
    }
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<CatalogItem> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn insert(&self, item: CatalogItem) -> Result<CatalogItem, ItemExists> {
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if items.contains_key(&item.id) {
            return Err(ItemExists(item.id));
        }

        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }
}
