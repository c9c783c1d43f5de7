// Runtime endpoint domain model
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Roster entry as reported by the broker in `list-all-kits-result`
#[derive(Debug, Clone, Deserialize)]
pub struct KitInfo {
    pub kit_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEndpoint {
    pub kit_id: String,
    pub name: String,
    pub is_online: bool,
}

impl From<KitInfo> for RuntimeEndpoint {
    fn from(info: KitInfo) -> Self {
        Self::new(info.kit_id, info.name, info.is_online)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SuffixKey<'a> {
    Numeric(u64),
    Text(&'a str),
}

impl RuntimeEndpoint {
    pub fn new(kit_id: impl Into<String>, name: impl Into<String>, is_online: bool) -> Self {
        Self {
            kit_id: kit_id.into(),
            name: name.into(),
            is_online,
        }
    }

    /// Case-insensitive prefix match on the kit id
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.kit_id
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }

    fn suffix_key(&self) -> SuffixKey<'_> {
        let suffix = self.kit_id.rsplit('-').next().unwrap_or(&self.kit_id);
        match suffix.parse::<u64>() {
            Ok(n) => SuffixKey::Numeric(n),
            Err(_) => SuffixKey::Text(suffix),
        }
    }
}

/// Online entries first, then by the suffix after the last hyphen.
/// Numeric suffixes compare as numbers and come before textual ones.
pub fn roster_order(a: &RuntimeEndpoint, b: &RuntimeEndpoint) -> Ordering {
    b.is_online
        .cmp(&a.is_online)
        .then_with(|| a.suffix_key().cmp(&b.suffix_key()))
        .then_with(|| a.kit_id.cmp(&b.kit_id))
}

/// Keep only the entries owned by `prefix`, sorted for display and selection
pub fn filter_and_sort<I>(roster: I, prefix: &str) -> Vec<RuntimeEndpoint>
where
    I: IntoIterator<Item = RuntimeEndpoint>,
{
    let mut matching: Vec<RuntimeEndpoint> = roster
        .into_iter()
        .filter(|r| r.matches_prefix(prefix))
        .collect();
    matching.sort_by(roster_order);
    matching
}
