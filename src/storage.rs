// ABOUTME: Per-user key-value store persisted as one JSON document
// ABOUTME: Handles paths, atomic writes, and dotted-key access

use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STORE_FILE: &str = "store.json";

pub struct Paths {
    pub config_dir: PathBuf,
    pub store_file: PathBuf,
    pub tmp_dir: PathBuf,
}

impl Paths {
    pub fn new(config_dir_override: Option<PathBuf>) -> Result<Self> {
        let config_dir = if let Some(dir) = config_dir_override {
            dir
        } else {
            ProjectDirs::from("", "", "sheetkit")
                .ok_or_else(|| {
                    Error::Filesystem(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "Could not determine config directory",
                    ))
                })?
                .config_dir()
                .to_path_buf()
        };

        Ok(Paths {
            store_file: config_dir.join(STORE_FILE),
            tmp_dir: config_dir.join("tmp"),
            config_dir,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in &[&self.config_dir, &self.tmp_dir] {
            fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o700);
                fs::set_permissions(dir, perms)?;
            }
        }
        Ok(())
    }
}

/// Replace `path` with `content` via a staging file in `tmp_dir` and a rename.
/// The staging file is created owner-only.
pub fn write_atomic(path: &Path, content: &[u8], tmp_dir: &Path) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("sheetkit");
    let staging = tmp_dir.join(format!(".{}.{:08x}.tmp", name, rand::random::<u32>()));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&staging)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

/// Dotted-key access into a single JSON document on disk.
///
/// Every call re-reads the file, so two handles over the same path always
/// observe each other's writes. There is no locking: the last writer wins.
/// A missing, unreadable or corrupt file reads as an empty document.
pub struct KvStore {
    path: PathBuf,
    tmp_dir: PathBuf,
}

impl KvStore {
    pub fn open(paths: &Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        Ok(KvStore {
            path: paths.store_file.clone(),
            tmp_dir: paths.tmp_dir.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let parts = segments(key);
        if parts.is_empty() {
            return None;
        }
        self.load().pointer(&json_pointer(&parts)).cloned()
    }

    /// Like [`KvStore::get`], but a value of the wrong shape also reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "ignoring malformed store entry");
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let parts = segments(key);
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| Error::Config(format!("invalid store key '{}'", key)))?;

        let mut doc = self.load();
        let mut current = &mut doc;
        for segment in parents {
            current = object_mut(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        object_mut(current).insert(last.to_string(), value);

        debug!(key, "store set");
        self.save(&doc)
    }

    /// Removing a key that does not exist is a no-op.
    pub fn delete(&self, key: &str) -> Result<()> {
        let parts = segments(key);
        let Some((last, parents)) = parts.split_last() else {
            return Ok(());
        };

        let mut doc = self.load();
        let removed = doc
            .pointer_mut(&json_pointer(parents))
            .and_then(Value::as_object_mut)
            .and_then(|o| o.remove(*last))
            .is_some();

        if removed {
            debug!(key, "store delete");
            self.save(&doc)?;
        }
        Ok(())
    }

    fn load(&self) -> Value {
        if !self.path.exists() {
            return Value::Object(Map::new());
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(Error::from)
            .and_then(|content| serde_json::from_str::<Value>(&content).map_err(Error::from));

        match parsed {
            Ok(value) if value.is_object() => value,
            Ok(_) => {
                warn!(path = %self.path.display(), "store is not a JSON object, treating as empty");
                Value::Object(Map::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "store unreadable, treating as empty");
                Value::Object(Map::new())
            }
        }
    }

    fn save(&self, doc: &Value) -> Result<()> {
        fs::create_dir_all(&self.tmp_dir)?;
        let content = serde_json::to_string_pretty(doc)?;
        write_atomic(&self.path, content.as_bytes(), &self.tmp_dir)
    }
}

fn segments(key: &str) -> Vec<&str> {
    key.split('.').filter(|s| !s.is_empty()).collect()
}

/// RFC 6901 pointer for a list of object keys; an empty list points at the root.
fn json_pointer(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| format!("/{}", p.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
