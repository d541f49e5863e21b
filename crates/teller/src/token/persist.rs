// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value persistence backends: in-memory and a JSON file with atomic writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;

/// Device key-value storage, as used for the token pair.
///
/// Multi-key writes and removals must be all-or-nothing from a reader's
/// point of view.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()>;
    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()>;
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for (k, v) in entries {
            map.insert((*k).to_owned(), (*v).to_owned());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let mut map = self.entries.lock();
        for k in keys {
            map.remove(*k);
        }
        Ok(())
    }
}

/// A flat JSON object on disk (`{"accessToken": "...", ...}`).
///
/// Every mutation rewrites the whole file through a temp file + rename, so
/// a crash mid-write leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    fn store(&self, map: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create {}", dir.display()))?;
            }
        }
        save_atomic(&self.path, &serde_json::to_string_pretty(map)?)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        for (k, v) in entries {
            map.insert((*k).to_owned(), (*v).to_owned());
        }
        self.store(&map)
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        let before = map.len();
        for k in keys {
            map.remove(*k);
        }
        if map.len() == before {
            return Ok(());
        }
        self.store(&map)
    }
}

/// Write `contents` to `path` atomically (write tmp + rename).
///
/// The temp name carries PID + counter so concurrent writers never share
/// a temp file.
fn save_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
