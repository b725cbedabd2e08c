use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseUrl;
use crate::core::helpers::{hash_password, now_iso};
use crate::models::models::{Post, User};

pub const USERS_LIST_KEY: &str = "users_list";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

/// JSON document store keyed by string.
///
/// Every read and write is atomic on its own, but nothing groups a
/// read-modify-write sequence: two requests updating the same user can
/// overwrite each other.
pub struct Store {
    path: Option<PathBuf>,
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl Store {
    pub fn memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn open(url: &DatabaseUrl) -> anyhow::Result<Self> {
        match url {
            DatabaseUrl::Memory => {
                info!("Using in-memory store");
                Ok(Self::memory())
            }
            DatabaseUrl::File(path) => Self::open_file(path),
        }
    }

    fn open_file(path: &Path) -> anyhow::Result<Self> {
        let data = if path.exists() {
            let raw = fs::read(path)
                .with_context(|| format!("Failed to read store file {}", path.display()))?;
            if raw.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_slice(&raw)
                    .with_context(|| format!("Corrupt store file {}", path.display()))?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            HashMap::new()
        };
        info!("Opened store {} ({} keys)", path.display(), data.len());
        Ok(Self {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, HashMap<String, serde_json::Value>>> {
        self.data
            .read()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, HashMap<String, serde_json::Value>>> {
        self.data
            .write()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let data = self.read()?;
        match data.get(key) {
            Some(value) => {
                let parsed = serde_json::from_value(value.clone())
                    .with_context(|| format!("Failed to decode '{}'", key))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(value)?;
        let mut data = self.write()?;
        data.insert(key.to_string(), value);
        self.persist(&data)
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut data = self.write()?;
        if data.remove(key).is_some() {
            self.persist(&data)?;
        }
        Ok(())
    }

    pub fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.read()?.contains_key(key))
    }

    fn persist(&self, data: &HashMap<String, serde_json::Value>) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec(data)?;
        fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Persisted {} keys to {}", data.len(), path.display());
        Ok(())
    }
}

/// Creates the `demo` user with one listing unless it already exists.
pub fn seed_demo_data(store: &Store) -> anyhow::Result<()> {
    if store.exists(&username_key("demo"))? {
        return Ok(());
    }

    let now = now_iso();
    let user_id = Uuid::new_v4().to_string();
    let user = User {
        id: user_id.clone(),
        email: "demo@roomly.local".to_string(),
        username: "demo".to_string(),
        password: hash_password("demo")?,
        number: 9876543210,
        city: "Pune".to_string(),
        gender: String::new(),
        profileimage: String::new(),
        posts: vec![Post {
            id: Uuid::new_v4().to_string(),
            kind: "1 BHK".to_string(),
            city: "Pune".to_string(),
            state: "Maharashtra".to_string(),
            location: "Kothrud".to_string(),
            pincode: 411038,
            area: "Paud Road".to_string(),
            description: "Sunny room near the metro, looking for one flatmate.".to_string(),
            price: 9500.0,
            number: 9876543210,
            images: Vec::new(),
            created_at: now.clone(),
            updated_at: now.clone(),
        }],
        save_post: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    };

    store.set_json(&user_key(&user_id), &user)?;
    store.set_json(&username_key(&user.username), &user_id)?;

    let mut users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    users.push(user_id);
    store.set_json(USERS_LIST_KEY, &users)?;

    info!("Seeded demo user");
    Ok(())
}
