use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::history::OperationHistory;
use crate::history::TagOperation;
use crate::rules::RuleTable;
use crate::state::EngineState;
use crate::state::Settings;
use crate::state::TrackingTable;

/// The persisted shape, opaque JSON to the host. Loading tolerates every
/// legacy variant (missing fields, scalar aliases, `[0]` apply-down) and
/// normalizes at this boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedState {
    pub settings: Settings,
    pub tag_tracking: TrackingTable,
    pub operation_history: Vec<TagOperation>,
    pub folder_rules: RuleTable,
}

pub fn snapshot(state: &EngineState) -> PersistedState {
    PersistedState {
        settings: state.settings.clone(),
        tag_tracking: state.tracking.clone(),
        operation_history: state.history.operations().to_vec(),
        folder_rules: state.rules.clone(),
    }
}

pub fn restore(persisted: PersistedState) -> EngineState {
    EngineState {
        settings: persisted.settings,
        rules: persisted.folder_rules,
        tracking: persisted.tag_tracking,
        history: OperationHistory::from_operations(persisted.operation_history),
    }
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn load(&self) -> io::Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let persisted = serde_json::from_slice::<PersistedState>(&bytes)
            .map_err(|err| io::Error::other(format!("parse state: {err}")))?;
        Ok(Some(persisted))
    }

    pub fn save(&self, persisted: &PersistedState) -> io::Result<()> {
        let encoded = serde_json::to_vec_pretty(persisted)
            .map_err(|err| io::Error::other(format!("serialize state: {err}")))?;
        fs::write(&self.path, encoded)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::history::FileSnapshot;
    use crate::history::OperationKind;
    use crate::history::HISTORY_CAP;
    use crate::rules::ApplyDepth;
    use crate::rules::FolderRule;
    use crate::state::MovePolicy;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempdir().expect("tmpdir");
        let store = StateStore::open(dir.path().join(".tagkeeper/state.json")).expect("open");
        let now = Utc::now();

        let mut state = EngineState::new(Settings {
            protected_tags: tags(&["pinned"]),
            move_policy: MovePolicy::AlwaysLeave,
            ..Settings::default()
        });
        state.rules.insert(
            "Health".to_string(),
            FolderRule {
                tags: tags(&["medical"]),
                inherit_from_ancestors: false,
                ..FolderRule::new(now)
            },
        );
        state.tracking.union_into("Health/a.md", &tags(&["medical"]), now);
        state.history.record(
            OperationKind::Apply,
            "tagged".to_string(),
            vec![FileSnapshot {
                path: "Health/a.md".to_string(),
                tags_before: Vec::new(),
                tags_after: tags(&["medical"]),
                tracking_before: Some(Vec::new()),
            }],
            now,
        );

        store.save(&snapshot(&state)).expect("save");
        let loaded = restore(store.load().expect("load").expect("present"));

        assert_eq!(loaded.settings, state.settings);
        assert_eq!(loaded.rules, state.rules);
        assert_eq!(loaded.tracking, state.tracking);
        assert_eq!(loaded.history.operations(), state.history.operations());
    }

    #[test]
    fn missing_state_file_loads_as_none() {
        let dir = tempdir().expect("tmpdir");
        let store = StateStore::open(dir.path().join("state.json")).expect("open");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn legacy_json_shapes_normalize_at_the_load_boundary() {
        let json = r#"{
            "settings": {
                "movePolicy": "always_retag",
                "legacy": {
                    "tagDepth": 2,
                    "folderAliases": {"Health": "wellness", "Work": ["job"]}
                }
            },
            "tagTracking": {
                "Health/a.md": {"autoTags": ["medical"], "lastUpdated": "2024-03-01T00:00:00Z"}
            },
            "operationHistory": [],
            "folderRules": {
                "": {"folderTagLevels": [1], "applyDownLevels": "all"},
                "Health": {"tags": ["medical"], "applyDownLevels": [0]}
            }
        }"#;
        let persisted: PersistedState = serde_json::from_str(json).unwrap();
        let state = restore(persisted);

        assert_eq!(state.settings.move_policy, MovePolicy::AlwaysRetag);
        assert_eq!(
            state.settings.legacy.folder_aliases["Health"],
            tags(&["wellness"])
        );
        assert_eq!(state.rules[""].apply_down, ApplyDepth::All);
        assert_eq!(state.rules["Health"].apply_down, ApplyDepth::ThisFolderOnly);
        assert!(state.rules["Health"].inherit_from_ancestors);
        assert_eq!(
            state.tracking.get("Health/a.md").unwrap().auto_tags,
            tags(&["medical"])
        );
    }

    #[test]
    fn oversized_history_clamps_to_the_cap_on_load() {
        let now = Utc::now();
        let ops: Vec<TagOperation> = (0..60)
            .map(|i| TagOperation {
                id: format!("op-{i}"),
                kind: OperationKind::Apply,
                description: format!("op {i}"),
                timestamp: now,
                files: Vec::new(),
            })
            .collect();
        let state = restore(PersistedState {
            operation_history: ops,
            ..PersistedState::default()
        });

        assert_eq!(state.history.len(), HISTORY_CAP);
        assert_eq!(state.history.operations()[0].id, "op-0");
    }

    #[test]
    fn persisted_keys_match_the_documented_shape() {
        let mut state = EngineState::new(Settings::default());
        state.tracking.union_into("a.md", &tags(&["x"]), Utc::now());
        let value = serde_json::to_value(snapshot(&state)).unwrap();

        assert!(value.get("tagTracking").is_some());
        assert!(value.get("operationHistory").is_some());
        assert!(value.get("folderRules").is_some());
        assert!(value["tagTracking"]["a.md"].get("autoTags").is_some());
    }
}
