use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use codebin_core::{model::Snippet, traits::Storage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serde error: {0}")]
    Serde(String),
}

#[derive(Default, Serialize, Deserialize, Clone)]
struct Manifest {
    ids: HashMap<String, String>, // id -> relative path under root
}

/// File-backed backend: one JSON document per snippet under
/// `snippets/`, an id-to-path manifest under `meta/`, and an advisory
/// lock file for cross-process write exclusion.
pub struct LocalStorage {
    root: PathBuf,
    manifest: RwLock<Option<Manifest>>,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let _ = fs::create_dir_all(root.join("snippets"));
        let _ = fs::create_dir_all(root.join("meta"));
        Self {
            root,
            manifest: RwLock::new(None),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("meta").join("MANIFEST.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("meta").join("LOCK")
    }

    fn snippet_rel(id: &str) -> String {
        format!("snippets/{id}.json")
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn load_manifest(path: &Path) -> Result<Manifest, LocalError> {
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let mut s = String::new();
        File::open(path)
            .map_err(|e| LocalError::Io(e.to_string()))?
            .read_to_string(&mut s)
            .map_err(|e| LocalError::Io(e.to_string()))?;
        serde_json::from_str(&s).map_err(|e| LocalError::Serde(e.to_string()))
    }

    /// Run `f` against the cached manifest, loading it lazily.
    fn with_manifest<T>(&self, f: impl FnOnce(&mut Manifest) -> T) -> Result<T, LocalError> {
        let mut guard = self.manifest.write();
        if guard.is_none() {
            *guard = Some(Self::load_manifest(&self.manifest_path())?);
        }
        let manifest = guard.as_mut().map(f);
        manifest.ok_or_else(|| LocalError::Io("manifest unavailable".to_string()))
    }

    fn save_manifest(&self, m: &Manifest) -> Result<(), LocalError> {
        let path = self.manifest_path();
        let dir = path
            .parent()
            .ok_or_else(|| LocalError::Io("manifest has no parent dir".to_string()))?;
        let tmp = dir.join(format!(
            ".tmp-manifest-{}-{}.json",
            std::process::id(),
            unique_suffix()
        ));
        let data = serde_json::to_vec_pretty(m).map_err(|e| LocalError::Serde(e.to_string()))?;
        write_atomic(&tmp, &path, &data)
    }

    fn write_lock(&self) -> Result<File, LocalError> {
        let lockf = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| LocalError::Io(e.to_string()))?;
        fs4::FileExt::lock_exclusive(&lockf).map_err(|e| LocalError::Io(e.to_string()))?;
        Ok(lockf)
    }

    fn read_snippet_file(&self, rel: &str) -> Result<Option<Snippet>, LocalError> {
        let path = self.abs(rel);
        let mut s = String::new();
        match File::open(&path) {
            Ok(mut f) => {
                f.read_to_string(&mut s)
                    .map_err(|e| LocalError::Io(e.to_string()))?;
                let snippet =
                    serde_json::from_str(&s).map_err(|e| LocalError::Serde(e.to_string()))?;
                Ok(Some(snippet))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(rel_path = rel, "snippet file vanished behind manifest");
                Ok(None)
            }
            Err(e) => Err(LocalError::Io(e.to_string())),
        }
    }
}

impl Storage for LocalStorage {
    type Error = LocalError;

    fn put(&self, snippet: &Snippet) -> Result<(), Self::Error> {
        let lockf = self.write_lock()?;
        let res = (|| {
            let rel = Self::snippet_rel(&snippet.id);
            let path = self.abs(&rel);
            let data = serde_json::to_vec_pretty(snippet)
                .map_err(|e| LocalError::Serde(e.to_string()))?;
            let dir = path
                .parent()
                .ok_or_else(|| LocalError::Io("snippet path has no parent dir".to_string()))?;
            let tmp = dir.join(format!(".tmp-{}-{}.json", snippet.id, unique_suffix()));
            debug!(snippet_id = %snippet.id, rel_path = %rel, "local put start");
            write_atomic(&tmp, &path, &data)?;

            let snapshot = self.with_manifest(|m| {
                m.ids.insert(snippet.id.clone(), rel.clone());
                m.clone()
            })?;
            self.save_manifest(&snapshot)?;
            debug!(snippet_id = %snippet.id, rel_path = %rel, "local put committed");
            Ok(())
        })();
        let _ = fs4::FileExt::unlock(&lockf);
        res
    }

    fn get(&self, id: &str) -> Result<Option<Snippet>, Self::Error> {
        let rel = self.with_manifest(|m| m.ids.get(id).cloned())?;
        match rel {
            Some(rel) => self.read_snippet_file(&rel),
            None => Ok(None),
        }
    }

    fn remove(&self, id: &str) -> Result<bool, Self::Error> {
        let lockf = self.write_lock()?;
        let res = (|| {
            let (rel, snapshot) = {
                let pair = self.with_manifest(|m| (m.ids.remove(id), m.clone()))?;
                match pair {
                    (Some(rel), snapshot) => (rel, snapshot),
                    (None, _) => {
                        debug!(snippet_id = id, "local remove miss");
                        return Ok(false);
                    }
                }
            };
            self.save_manifest(&snapshot)?;
            let path = self.abs(&rel);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(snippet_id = id, "manifest entry had no backing file");
                }
                Err(e) => return Err(LocalError::Io(e.to_string())),
            }
            debug!(snippet_id = id, "local remove committed");
            Ok(true)
        })();
        let _ = fs4::FileExt::unlock(&lockf);
        res
    }

    fn list_all(&self) -> Result<Vec<Snippet>, Self::Error> {
        let rels: Vec<String> = self.with_manifest(|m| m.ids.values().cloned().collect())?;
        let mut out = Vec::with_capacity(rels.len());
        for rel in rels {
            if let Some(snippet) = self.read_snippet_file(&rel)? {
                out.push(snippet);
            }
        }
        Ok(out)
    }
}

fn write_atomic(tmp: &Path, final_path: &Path, data: &[u8]) -> Result<(), LocalError> {
    // write to tmp
    {
        let mut f = File::create(tmp).map_err(|e| LocalError::Io(e.to_string()))?;
        f.write_all(data)
            .map_err(|e| LocalError::Io(e.to_string()))?;
        f.sync_all().map_err(|e| LocalError::Io(e.to_string()))?;
    }
    // rename to final
    fs::rename(tmp, final_path).map_err(|e| LocalError::Io(e.to_string()))?;
    // fsync directory
    if let Some(dir) = final_path.parent() {
        let dir_file = File::open(dir).map_err(|e| LocalError::Io(e.to_string()))?;
        dir_file
            .sync_all()
            .map_err(|e| LocalError::Io(e.to_string()))?;
    }
    Ok(())
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_remove_roundtrip() {
        let root = tempdir().unwrap();
        let store = LocalStorage::new(root.path());
        let mut s = Snippet::new("SELECT 1;");
        s.set_views_limit(Some(3));
        let id = s.id.clone();
        store.put(&s).unwrap();
        let got = store.get(&id).unwrap().unwrap();
        assert_eq!(got, s);
        assert!(store.remove(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
        assert!(!store.remove(&id).unwrap());
    }

    #[test]
    fn manifest_survives_reopen() {
        let root = tempdir().unwrap();
        let s = Snippet::new("persisted");
        let id = s.id.clone();
        {
            let store = LocalStorage::new(root.path());
            store.put(&s).unwrap();
        }
        let store = LocalStorage::new(root.path());
        let got = store.get(&id).unwrap().unwrap();
        assert_eq!(got.code, "persisted");
    }

    #[test]
    fn vanished_file_is_a_miss_not_an_error() {
        let root = tempdir().unwrap();
        let store = LocalStorage::new(root.path());
        let s = Snippet::new("gone soon");
        store.put(&s).unwrap();
        fs::remove_file(root.path().join(format!("snippets/{}.json", s.id))).unwrap();
        assert!(store.get(&s.id).unwrap().is_none());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_all_returns_everything_put() {
        let root = tempdir().unwrap();
        let store = LocalStorage::new(root.path());
        let snippets: Vec<Snippet> = (0..3).map(|i| Snippet::new(&format!("s{i}"))).collect();
        for s in &snippets {
            store.put(s).unwrap();
        }
        let mut listed: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        listed.sort();
        let mut expected: Vec<String> = snippets.iter().map(|s| s.id.clone()).collect();
        expected.sort();
        assert_eq!(listed, expected);
    }
}
