// Selection stores - Durable last-selected runtime ids
use crate::application::target_selector::SelectionStore;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// JSON file of `{storage_key: kit_id}` pairs, rewritten on every save
pub struct FileSelectionStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileSelectionStore {
    /// Open the store, starting empty if the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt selection file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SelectionStore for FileSelectionStore {
    fn load(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn save(&self, key: &str, kit_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).map(String::as_str) == Some(kit_id) {
            return;
        }
        entries.insert(key.to_string(), kit_id.to_string());
        if let Err(e) = self.write(&entries) {
            tracing::warn!("Failed to persist selection {}: {}", key, e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MemorySelectionStore {
        entries: Mutex<HashMap<String, String>>,
    }

    impl SelectionStore for MemorySelectionStore {
        fn load(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        fn save(&self, key: &str, kit_id: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), kit_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemorySelectionStore;
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("runtime-connector-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_file("selection.json");
        let _ = std::fs::remove_file(&path);

        let store = FileSelectionStore::open(&path);
        assert_eq!(store.load("last-wizard-rt-runtime-"), None);
        store.save("last-wizard-rt-runtime-", "runtime-2");
        store.save("last-rt", "kit-1");

        let reopened = FileSelectionStore::open(&path);
        assert_eq!(
            reopened.load("last-wizard-rt-runtime-").as_deref(),
            Some("runtime-2")
        );
        assert_eq!(reopened.load("last-rt").as_deref(), Some("kit-1"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let path = temp_file("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = FileSelectionStore::open(&path);
        assert_eq!(store.load("last-rt"), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemorySelectionStore::default();
        store.save("k", "a");
        store.save("k", "b");
        assert_eq!(store.load("k").as_deref(), Some("b"));
    }
}
