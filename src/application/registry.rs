// Runtime registry - Filtered, sorted view of the broker roster
use crate::domain::runtime::{filter_and_sort, KitInfo, RuntimeEndpoint};
use serde_json::Value;

pub struct RuntimeRegistry {
    prefix: String,
    roster: Vec<RuntimeEndpoint>,
}

impl RuntimeRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            roster: Vec::new(),
        }
    }

    pub fn roster(&self) -> &[RuntimeEndpoint] {
        &self.roster
    }

    /// Replace the roster from a `list-all-kits-result` payload.
    /// A payload that does not parse leaves the previous roster in place.
    pub fn apply_snapshot(&mut self, payload: &Value) -> Result<&[RuntimeEndpoint], serde_json::Error> {
        let kits: Vec<KitInfo> = serde_json::from_value(payload.clone())?;
        let total = kits.len();
        self.roster = filter_and_sort(kits.into_iter().map(RuntimeEndpoint::from), &self.prefix);

        tracing::debug!(
            "Roster for {}: {} of {} kits ({} online)",
            self.prefix,
            self.roster.len(),
            total,
            self.roster.iter().filter(|r| r.is_online).count()
        );
        Ok(&self.roster)
    }
}
