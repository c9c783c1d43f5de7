// Active-target selection over the current runtime roster
use crate::application::error::ConnectorError;
use crate::domain::runtime::RuntimeEndpoint;
use std::sync::Arc;
use tokio::sync::watch;

/// Durable client-side storage for the last selected runtime id
pub trait SelectionStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, kit_id: &str);
}

pub struct TargetSelector {
    storage_key: String,
    store: Arc<dyn SelectionStore>,
    active: watch::Sender<Option<String>>,
}

impl TargetSelector {
    pub fn new(storage_key: impl Into<String>, store: Arc<dyn SelectionStore>) -> Self {
        Self {
            storage_key: storage_key.into(),
            store,
            active: watch::Sender::new(None),
        }
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.active.subscribe()
    }

    /// Re-run automatic selection after a roster refresh.
    ///
    /// An active id that is still online is kept untouched. Otherwise the
    /// persisted id wins if it is online, then the first online entry.
    pub fn reselect(&self, roster: &[RuntimeEndpoint]) -> Option<String> {
        let online: Vec<&RuntimeEndpoint> = roster.iter().filter(|r| r.is_online).collect();

        if let Some(current) = self.active_id() {
            if online.iter().any(|r| r.kit_id == current) {
                return Some(current);
            }
            tracing::info!("Active runtime {} is no longer online", current);
        }

        let Some(first) = online.first() else {
            self.set_active(None);
            return None;
        };

        let chosen = self
            .store
            .load(&self.storage_key)
            .filter(|remembered| online.iter().any(|r| &r.kit_id == remembered))
            .unwrap_or_else(|| first.kit_id.clone());

        self.store.save(&self.storage_key, &chosen);
        self.set_active(Some(chosen.clone()));
        tracing::info!("Selected runtime {} ({})", chosen, self.storage_key);
        Some(chosen)
    }

    /// Manual selection; the runtime must be online in `roster`
    pub fn select(&self, kit_id: &str, roster: &[RuntimeEndpoint]) -> Result<(), ConnectorError> {
        let endpoint = roster
            .iter()
            .find(|r| r.kit_id == kit_id)
            .ok_or_else(|| ConnectorError::UnknownRuntime(kit_id.to_string()))?;
        if !endpoint.is_online {
            return Err(ConnectorError::RuntimeOffline(kit_id.to_string()));
        }

        self.store.save(&self.storage_key, kit_id);
        self.set_active(Some(kit_id.to_string()));
        Ok(())
    }

    fn set_active(&self, kit_id: Option<String>) {
        self.active.send_if_modified(|current| {
            if *current == kit_id {
                false
            } else {
                *current = kit_id;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::selection_store::testing::MemorySelectionStore;

    const KEY: &str = "last-wizard-rt-runtime-";

    fn roster(entries: &[(&str, bool)]) -> Vec<RuntimeEndpoint> {
        entries
            .iter()
            .map(|(id, online)| RuntimeEndpoint::new(*id, *id, *online))
            .collect()
    }

    fn selector() -> (TargetSelector, Arc<MemorySelectionStore>) {
        let store = Arc::new(MemorySelectionStore::default());
        (TargetSelector::new(KEY, store.clone()), store)
    }

    #[test]
    fn test_first_online_selected_and_persisted() {
        let (selector, store) = selector();
        let current = roster(&[("runtime-2", true), ("runtime-5", true), ("runtime-1", false)]);

        assert_eq!(selector.reselect(&current).as_deref(), Some("runtime-2"));
        assert_eq!(store.load(KEY).as_deref(), Some("runtime-2"));
    }

    #[test]
    fn test_remembered_selection_wins() {
        let (selector, store) = selector();
        store.save(KEY, "runtime-5");
        let current = roster(&[("runtime-2", true), ("runtime-5", true)]);

        assert_eq!(selector.reselect(&current).as_deref(), Some("runtime-5"));
    }

    #[test]
    fn test_stale_remembered_selection_falls_back() {
        let (selector, store) = selector();
        store.save(KEY, "runtime-9");
        let current = roster(&[("runtime-2", true), ("runtime-9", false)]);

        assert_eq!(selector.reselect(&current).as_deref(), Some("runtime-2"));
        assert_eq!(store.load(KEY).as_deref(), Some("runtime-2"));
    }

    #[test]
    fn test_selection_is_sticky_while_online() {
        let (selector, _) = selector();
        let current = roster(&[("runtime-2", true), ("runtime-5", true)]);
        selector.select("runtime-5", &current).unwrap();

        for _ in 0..3 {
            assert_eq!(selector.reselect(&current).as_deref(), Some("runtime-5"));
        }
        let mut rx = selector.watch();
        selector.reselect(&current);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_offline_active_falls_back_or_clears() {
        let (selector, _) = selector();
        selector.reselect(&roster(&[("runtime-2", true), ("runtime-5", true)]));
        assert_eq!(selector.active_id().as_deref(), Some("runtime-2"));

        let next = roster(&[("runtime-2", false), ("runtime-5", true)]);
        assert_eq!(selector.reselect(&next).as_deref(), Some("runtime-5"));

        let empty = roster(&[("runtime-2", false), ("runtime-5", false)]);
        assert_eq!(selector.reselect(&empty), None);
        assert_eq!(selector.active_id(), None);
    }

    #[test]
    fn test_manual_select_rejects_offline_and_unknown() {
        let (selector, _) = selector();
        let current = roster(&[("runtime-2", true), ("runtime-3", false)]);

        assert!(matches!(
            selector.select("runtime-3", &current),
            Err(ConnectorError::RuntimeOffline(_))
        ));
        assert!(matches!(
            selector.select("runtime-7", &current),
            Err(ConnectorError::UnknownRuntime(_))
        ));
        assert_eq!(selector.active_id(), None);
    }
}
