//! Durable token record. The file may hold other sections; writes only touch ours.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::lock_or_recover;

const SECTION: &str = "twitch";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store io: {0}")]
    Io(#[from] io::Error),
    #[error("token store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token store root is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

pub trait TokenStore {
    /// `Ok(None)` on first run (nothing stored yet).
    fn load(&self) -> Result<Option<StoredToken>, StoreError>;
    fn save(&self, token: &StoredToken) -> Result<(), StoreError>;
}

/// `{"twitch": {"access_token": .., "refresh_token": .., "login": ..}, ...}` on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_root(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StoreError::NotAnObject),
        }
    }
}

impl TokenStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredToken>, StoreError> {
        let Some(root) = self.read_root()? else {
            return Ok(None);
        };
        let Some(section) = root.get(SECTION) else {
            return Ok(None);
        };
        let token: StoredToken = serde_json::from_value(section.clone())?;
        if token.access_token.is_empty() && token.refresh_token.is_none() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    fn save(&self, token: &StoredToken) -> Result<(), StoreError> {
        let mut root = self.read_root()?.unwrap_or_default();
        let mut section = match root.remove(SECTION) {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        if let Value::Object(fields) = serde_json::to_value(token)? {
            section.extend(fields);
        }
        if token.refresh_token.is_none() {
            section.remove("refresh_token");
        }
        root.insert(SECTION.to_string(), Value::Object(section));

        let mut body = serde_json::to_string_pretty(&Value::Object(root))?;
        body.push('\n');
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Process-local store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    token: Mutex<Option<StoredToken>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new(token: Option<StoredToken>) -> Self {
        Self {
            token: Mutex::new(token),
            saves: Mutex::new(0),
        }
    }

    pub fn current(&self) -> Option<StoredToken> {
        lock_or_recover(&self.token, "memory store").clone()
    }

    pub fn save_count(&self) -> usize {
        *lock_or_recover(&self.saves, "memory store saves")
    }
}

impl TokenStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredToken>, StoreError> {
        Ok(self.current())
    }

    fn save(&self, token: &StoredToken) -> Result<(), StoreError> {
        *lock_or_recover(&self.token, "memory store") = Some(token.clone());
        *lock_or_recover(&self.saves, "memory store saves") += 1;
        Ok(())
    }
}

impl<T: TokenStore + ?Sized> TokenStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<StoredToken>, StoreError> {
        (**self).load()
    }

    fn save(&self, token: &StoredToken) -> Result<(), StoreError> {
        (**self).save(token)
    }
}
