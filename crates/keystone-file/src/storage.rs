//! JSON storage plugin.
//!
//! Serializes a partition keyset as a JSON object keyed by full key name.
//! The plugin never chooses where to read or write: it uses the location
//! the resolver left in the parent key's value, which on the set side is
//! the staged temp file.

use keystone_core::{Key, KeySet, KeystoneError, Plugin, Result, SyncVerdict, UpdateVerdict, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// On-disk shape of one key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    binary: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, String>,
}

impl FileEntry {
    fn from_key(key: &Key) -> Self {
        let mut entry = FileEntry {
            meta: key
                .meta_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..FileEntry::default()
        };
        match key.value() {
            Some(Value::Text(s)) => entry.value = Some(s.clone()),
            Some(Value::Binary(b)) => entry.binary = Some(b.clone()),
            None => {}
        }
        entry
    }

    fn into_key(self, name: &str) -> Key {
        let mut key = Key::new(name);
        if let Some(value) = self.value {
            key.set_string(value);
        } else if let Some(binary) = self.binary {
            key.set_binary(binary);
        }
        for (name, value) in self.meta {
            key.set_meta(name, value);
        }
        key
    }
}

pub struct JsonStorage {
    pretty: bool,
}

impl JsonStorage {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn location(parent: &Key) -> Result<&Path> {
        parent
            .string()
            .map(Path::new)
            .ok_or_else(|| {
                KeystoneError::Serialization(format!(
                    "no resolved storage location on parent \"{}\"",
                    parent.name()
                ))
            })
    }
}

impl Plugin for JsonStorage {
    fn name(&self) -> &str {
        "json-storage"
    }

    /// Load every key of the file into the partition keyset. A missing
    /// file is an empty store.
    fn get(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<UpdateVerdict> {
        let path = Self::location(parent)?;
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(UpdateVerdict::Changed)
            }
            Err(e) => return Err(e.into()),
        };
        let entries: BTreeMap<String, FileEntry> = serde_json::from_str(&text)
            .map_err(|e| {
                KeystoneError::Serialization(format!("\"{}\": {e}", path.display()))
            })?;
        for (name, entry) in entries {
            keyset.append(entry.into_key(&name));
        }
        Ok(UpdateVerdict::Changed)
    }

    /// Write the partition keyset to the staged location.
    fn set(&mut self, keyset: &mut KeySet, parent: &mut Key) -> Result<SyncVerdict> {
        let path = Self::location(parent)?;
        let entries: BTreeMap<&str, FileEntry> = keyset
            .iter()
            .map(|k| (k.name(), FileEntry::from_key(k)))
            .collect();
        let text = if self.pretty {
            serde_json::to_string_pretty(&entries)
        } else {
            serde_json::to_string(&entries)
        }
        .map_err(|e| KeystoneError::Serialization(e.to_string()))?;
        fs::write(path, text)?;
        Ok(SyncVerdict::NeedsSync)
    }
}
