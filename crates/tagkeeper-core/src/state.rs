use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::history::OperationHistory;
use crate::rules::RuleTable;
use crate::tags::contains_ci;

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_SUPPRESSION_TTL_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePolicy {
    Ask,
    AlwaysRetag,
    AlwaysLeave,
}

impl MovePolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::AlwaysRetag => "always-retag",
            Self::AlwaysLeave => "always-leave",
        }
    }
}

impl Default for MovePolicy {
    fn default() -> Self {
        Self::Ask
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub protected_tags: Vec<String>,
    pub ignored_paths: Vec<String>,
    pub move_policy: MovePolicy,
    pub apply_on_create: bool,
    pub debounce_ms: u64,
    pub suppression_ttl_ms: u64,
    pub legacy: LegacySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protected_tags: Vec::new(),
            ignored_paths: Vec::new(),
            move_policy: MovePolicy::default(),
            apply_on_create: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            suppression_ttl_ms: DEFAULT_SUPPRESSION_TTL_MS,
            legacy: LegacySettings::default(),
        }
    }
}

impl Settings {
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_paths
            .iter()
            .map(|prefix| prefix.trim_end_matches('/'))
            .filter(|prefix| !prefix.is_empty())
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    }
}

/// Settings for the legacy fixed-depth resolver. Alias values were
/// historically stored as either a scalar or a list; they are normalized
/// to a list here, at the load boundary, and nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LegacySettings {
    pub tag_depth: usize,
    #[serde(deserialize_with = "de_alias_map")]
    pub folder_aliases: BTreeMap<String, Vec<String>>,
}

impl Default for LegacySettings {
    fn default() -> Self {
        Self {
            tag_depth: 1,
            folder_aliases: BTreeMap::new(),
        }
    }
}

fn de_alias_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(folder, alias)| {
            let alias = match alias {
                OneOrMany::One(tag) => vec![tag],
                OneOrMany::Many(tags) => tags,
            };
            (folder, alias)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub auto_tags: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Shadow record of which tags this system (not the user) applied,
/// keyed by document path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingTable {
    entries: BTreeMap<String, TrackingEntry>,
}

impl TrackingTable {
    pub fn get(&self, path: &str) -> Option<&TrackingEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackingEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Union-merge `tags` into the entry, creating it on first write.
    /// Never replaces what is already tracked.
    pub fn union_into(&mut self, path: &str, tags: &[String], now: DateTime<Utc>) {
        if tags.is_empty() {
            return;
        }
        let entry = self.entries.entry(path.to_string()).or_insert(TrackingEntry {
            auto_tags: Vec::new(),
            last_updated: now,
        });
        for tag in tags {
            if !contains_ci(&entry.auto_tags, tag) {
                entry.auto_tags.push(tag.clone());
            }
        }
        entry.last_updated = now;
    }

    /// Strip `tags` from the entry, deleting it when its last tag goes.
    pub fn strip(&mut self, path: &str, tags: &[String], now: DateTime<Utc>) {
        let Some(entry) = self.entries.get_mut(path) else {
            return;
        };
        entry.auto_tags.retain(|t| !contains_ci(tags, t));
        if entry.auto_tags.is_empty() {
            self.entries.remove(path);
        } else {
            entry.last_updated = now;
        }
    }

    /// Replace the entry with an exact snapshot (empty snapshot = delete).
    pub fn replace(&mut self, path: &str, tags: Vec<String>, now: DateTime<Utc>) {
        if tags.is_empty() {
            self.entries.remove(path);
        } else {
            self.entries.insert(
                path.to_string(),
                TrackingEntry {
                    auto_tags: tags,
                    last_updated: now,
                },
            );
        }
    }

    /// Re-key on pure rename; the tag set is never mutated here.
    pub fn rekey(&mut self, old_path: &str, new_path: &str) -> bool {
        match self.entries.remove(old_path) {
            Some(entry) => {
                self.entries.insert(new_path.to_string(), entry);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<TrackingEntry> {
        self.entries.remove(path)
    }
}

/// The one explicit state object; every service borrows it per call.
/// No ambient globals.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub settings: Settings,
    pub rules: RuleTable,
    pub tracking: TrackingTable,
    pub history: OperationHistory,
}

impl EngineState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            rules: RuleTable::default(),
            tracking: TrackingTable::default(),
            history: OperationHistory::default(),
        }
    }
}
