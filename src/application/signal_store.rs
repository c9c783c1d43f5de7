// Shared observable store for live signal values, runtime roster and app log
use crate::domain::runtime::RuntimeEndpoint;
use crate::domain::signal::SignalValueMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

const LOG_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub line: String,
}

struct StoreInner {
    values: watch::Sender<SignalValueMap>,
    runtimes: watch::Sender<Vec<RuntimeEndpoint>>,
    wizard_active: watch::Sender<Option<String>>,
    log: broadcast::Sender<LogEntry>,
    history: Mutex<VecDeque<LogEntry>>,
    writer_claimed: AtomicBool,
    wizard_claimed: AtomicBool,
}

/// Many readers, one writer. Writes go through a claimed [`SignalWriter`].
#[derive(Clone)]
pub struct SignalStore {
    inner: Arc<StoreInner>,
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalStore {
    pub fn new() -> Self {
        let (log, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(StoreInner {
                values: watch::Sender::new(SignalValueMap::new()),
                runtimes: watch::Sender::new(Vec::new()),
                wizard_active: watch::Sender::new(None),
                log,
                history: Mutex::new(VecDeque::new()),
                writer_claimed: AtomicBool::new(false),
                wizard_claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns `None` while another writer is alive
    pub fn claim_writer(&self) -> Option<SignalWriter> {
        claim(&self.inner.writer_claimed).then(|| SignalWriter {
            guard: Arc::new(WriterGuard {
                store: self.clone(),
            }),
        })
    }

    /// Returns `None` while another connector owns the wizard selection
    pub fn claim_wizard_slot(&self) -> Option<WizardSlot> {
        claim(&self.inner.wizard_claimed).then(|| WizardSlot {
            store: self.clone(),
        })
    }

    pub fn values(&self) -> SignalValueMap {
        self.inner.values.borrow().clone()
    }

    pub fn watch_values(&self) -> watch::Receiver<SignalValueMap> {
        self.inner.values.subscribe()
    }

    pub fn runtimes(&self) -> Vec<RuntimeEndpoint> {
        self.inner.runtimes.borrow().clone()
    }

    pub fn watch_runtimes(&self) -> watch::Receiver<Vec<RuntimeEndpoint>> {
        self.inner.runtimes.subscribe()
    }

    pub fn wizard_active_id(&self) -> Option<String> {
        self.inner.wizard_active.borrow().clone()
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.log.subscribe()
    }

    pub fn log_history(&self) -> Vec<LogEntry> {
        match self.inner.history.lock() {
            Ok(history) => history.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn push_log(&self, line: String) {
        let entry = LogEntry {
            at: Utc::now(),
            line,
        };
        {
            let mut history = match self.inner.history.lock() {
                Ok(history) => history,
                Err(poisoned) => poisoned.into_inner(),
            };
            if history.len() == LOG_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(entry.clone());
        }
        let _ = self.inner.log.send(entry);
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

struct WriterGuard {
    store: SignalStore,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.store
            .inner
            .writer_claimed
            .store(false, Ordering::Release);
    }
}

/// Write access to a [`SignalStore`]. Clones share the claim; it is
/// released when the last clone drops.
#[derive(Clone)]
pub struct SignalWriter {
    guard: Arc<WriterGuard>,
}

impl SignalWriter {
    pub fn store(&self) -> &SignalStore {
        &self.guard.store
    }

    /// Merge by key; signals absent from `values` keep their last value
    pub fn merge_values(&self, values: SignalValueMap) {
        if values.is_empty() {
            return;
        }
        self.store().inner.values.send_modify(|current| current.extend(values));
    }

    pub fn publish_runtimes(&self, runtimes: Vec<RuntimeEndpoint>) {
        self.store().inner.runtimes.send_replace(runtimes);
    }

    pub fn append_log(&self, line: impl Into<String>) {
        self.store().push_log(line.into());
    }
}

/// Ownership of the shared wizard active runtime id
pub struct WizardSlot {
    store: SignalStore,
}

impl WizardSlot {
    pub fn set(&self, kit_id: Option<String>) {
        self.store
            .inner
            .wizard_active
            .send_if_modified(|current| {
                if *current == kit_id {
                    false
                } else {
                    *current = kit_id;
                    true
                }
            });
    }
}

impl Drop for WizardSlot {
    fn drop(&mut self) {
        self.store
            .inner
            .wizard_claimed
            .store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::SignalValue;

    fn values(pairs: &[(&str, i64)]) -> SignalValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SignalValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_single_writer() {
        let store = SignalStore::new();
        let writer = store.claim_writer().expect("first claim");
        assert!(store.claim_writer().is_none());

        let clone = writer.clone();
        drop(writer);
        assert!(store.claim_writer().is_none());

        drop(clone);
        assert!(store.claim_writer().is_some());
    }

    #[test]
    fn test_merge_by_key() {
        let store = SignalStore::new();
        let writer = store.claim_writer().unwrap();

        writer.merge_values(values(&[("Vehicle.Speed", 10), ("Vehicle.Gear", 1)]));
        writer.merge_values(values(&[("Vehicle.Speed", 20)]));

        let current = store.values();
        assert_eq!(current["Vehicle.Speed"], SignalValue::from(20));
        assert_eq!(current["Vehicle.Gear"], SignalValue::from(1));
    }

    #[test]
    fn test_log_history_is_bounded() {
        let store = SignalStore::new();
        let writer = store.claim_writer().unwrap();
        for i in 0..(LOG_HISTORY_LIMIT + 5) {
            writer.append_log(format!("line {i}"));
        }

        let history = store.log_history();
        assert_eq!(history.len(), LOG_HISTORY_LIMIT);
        assert_eq!(history[0].line, "line 5");
    }

    #[test]
    fn test_wizard_slot_single_owner() {
        let store = SignalStore::new();
        let slot = store.claim_wizard_slot().unwrap();
        assert!(store.claim_wizard_slot().is_none());

        slot.set(Some("kit-3".to_string()));
        assert_eq!(store.wizard_active_id().as_deref(), Some("kit-3"));

        drop(slot);
        assert!(store.claim_wizard_slot().is_some());
    }
}
