use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;

/// Keyed storage for captured documents. Keys are profile ids.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, key: &str) -> bool;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// One `<key>.html` file per document under a directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create artifact directory {}", root.display()))?;
        Ok(FsStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.html", encode_key(key)))
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to move {}", path.display()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "html") {
                match path.file_stem().and_then(|s| s.to_str()).and_then(decode_key) {
                    Some(key) => keys.push(key),
                    None => warn!("Ignoring {}: not a stored key", path.display()),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.items
            .lock()
            .map(|items| items.contains_key(key))
            .unwrap_or(false)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("artifact store lock poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("artifact store lock poisoned"))?;
        Ok(items.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("artifact store lock poisoned"))?;
        Ok(items.keys().cloned().collect())
    }
}

// Every byte outside [A-Za-z0-9_-] becomes %XX, so file names are safe and map back
// to exactly one key.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else if bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b'_' {
            out.push(bytes[i]);
            i += 1;
        } else {
            return None;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path().join("pages")).unwrap();
        assert!(!store.exists("jdoe"));
        assert_eq!(store.get("jdoe").unwrap(), None);

        store.put("jdoe", "<html>1</html>").unwrap();
        store.put("jdoe", "<html>2</html>").unwrap();
        store.put("maria-lopez", "<html>3</html>").unwrap();
        std::fs::write(store.root().join("notes.txt"), "ignored").unwrap();

        assert!(store.exists("jdoe"));
        assert_eq!(store.get("jdoe").unwrap().as_deref(), Some("<html>2</html>"));
        assert_eq!(store.keys().unwrap(), vec!["jdoe".to_string(), "maria-lopez".to_string()]);
    }

    #[test]
    fn fs_store_keys_survive_escaping() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.put("jos%C3%A9-garcia", "ok").unwrap();
        store.put("a/../b", "ok").unwrap();
        assert!(store.exists("jos%C3%A9-garcia"));
        assert!(dir.path().join("jos%25C3%25A9-garcia.html").is_file());
        assert!(dir.path().join("a%2F%2E%2E%2Fb.html").is_file());
        assert_eq!(
            store.keys().unwrap(),
            vec!["a/../b".to_string(), "jos%C3%A9-garcia".to_string()]
        );
    }

    #[test]
    fn undecodable_file_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad%G1.html"), "x").unwrap();
        std::fs::write(dir.path().join("not.ours.html"), "x").unwrap();
        store.put("jdoe", "ok").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["jdoe".to_string()]);
    }

    #[test]
    fn memory_store() {
        let store = MemoryStore::default();
        store.put("a", "1").unwrap();
        assert!(store.exists("a"));
        assert!(!store.exists("b"));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);
    }
}
