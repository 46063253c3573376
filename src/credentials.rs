//! API key storage
//!
//! The core only ever reads keys through [`CredentialSource`]. Keys are the
//! provider's stable credential key (`openai_api_key`, ...); values are opaque.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::error::CredentialError;
use crate::llm::Provider;

/// Key-value secret store. Must tolerate concurrent reads.
pub trait CredentialSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> bool;

    fn delete(&self, key: &str) -> bool;

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Trimmed value, or None when nothing is left
fn clean(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }
}

impl CredentialSource for MemoryCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Some(value) = clean(value) else {
            return false;
        };
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        true
    }

    fn delete(&self, key: &str) -> bool {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }
}

/// JSON key file, readable by the owner only
#[derive(Debug)]
pub struct FileCredentials {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileCredentials {
    /// Open the key file, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = values.len(), "Opened credential file");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        let mut file = open_owner_only(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Apply a change and write it out; memory is rolled back if the write fails
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> bool {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let previous = values.clone();
        if !change(&mut *values) {
            return false;
        }
        match self.persist(&values) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to write credential file: {}", e);
                *values = previous;
                false
            }
        }
    }
}

/// Open for rewrite with mode 0600 before any content is written.
/// A file left over with wider permissions is narrowed while still empty.
#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl CredentialSource for FileCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Some(value) = clean(value) else {
            return false;
        };
        self.update(|values| {
            values.insert(key.to_string(), value);
            true
        })
    }

    fn delete(&self, key: &str) -> bool {
        self.update(|values| values.remove(key).is_some())
    }
}

/// Read-only lookup of the conventional provider environment variables
#[derive(Debug, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn var_for(key: &str) -> Option<&'static str> {
        if key == Provider::OpenAi.credential_key() {
            Some("OPENAI_API_KEY")
        } else if key == Provider::Claude.credential_key() {
            Some("ANTHROPIC_API_KEY")
        } else if key == Provider::Gemini.credential_key() {
            Some("GEMINI_API_KEY")
        } else {
            None
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn get(&self, key: &str) -> Option<String> {
        let var = Self::var_for(key)?;
        std::env::var(var).ok().and_then(|v| clean(&v))
    }

    fn set(&self, _key: &str, _value: &str) -> bool {
        false
    }

    fn delete(&self, _key: &str) -> bool {
        false
    }
}

/// Reads from each layer in order; writes go to the first
pub struct LayeredCredentials {
    layers: Vec<Arc<dyn CredentialSource>>,
}

impl LayeredCredentials {
    pub fn new(primary: Arc<dyn CredentialSource>) -> Self {
        Self {
            layers: vec![primary],
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn CredentialSource>) -> Self {
        self.layers.push(fallback);
        self
    }
}

impl CredentialSource for LayeredCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.layers.first().is_some_and(|l| l.set(key, value))
    }

    fn delete(&self, key: &str) -> bool {
        self.layers.first().is_some_and(|l| l.delete(key))
    }
}

/// Safe preview of a secret for display
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 16 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
