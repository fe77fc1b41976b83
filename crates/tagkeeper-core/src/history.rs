use std::io;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::state::TrackingTable;
use crate::store::DocumentStore;
use crate::tags::contains_ci;

pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Apply,
    Remove,
    Bulk,
    Move,
    Revert,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Remove => "remove",
            Self::Bulk => "bulk",
            Self::Move => "move",
            Self::Revert => "revert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    pub path: String,
    pub tags_before: Vec<String>,
    pub tags_after: Vec<String>,
    /// Absent on operations recorded before tracking snapshots existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_before: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoReport {
    pub restored: usize,
    pub failed: usize,
}

/// Bounded operation log, most recent first. Eviction past the cap is
/// silent and makes evicted operations permanently non-undoable.
#[derive(Debug, Clone, Default)]
pub struct OperationHistory {
    ops: Vec<TagOperation>,
    next_id: u64,
}

impl OperationHistory {
    pub fn from_operations(mut ops: Vec<TagOperation>) -> Self {
        ops.truncate(HISTORY_CAP);
        let next_id = ops
            .iter()
            .filter_map(|op| op.id.strip_prefix("op-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .map_or(1, |n| n.saturating_add(1));
        Self { ops, next_id }
    }

    pub fn operations(&self) -> &[TagOperation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TagOperation> {
        self.ops.iter().find(|op| op.id == id)
    }

    pub fn latest_id(&self) -> Option<&str> {
        self.ops.first().map(|op| op.id.as_str())
    }

    pub fn record(
        &mut self,
        kind: OperationKind,
        description: String,
        files: Vec<FileSnapshot>,
        now: DateTime<Utc>,
    ) -> String {
        let id = format!("op-{}", self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.ops.insert(
            0,
            TagOperation {
                id: id.clone(),
                kind,
                description,
                timestamp: now,
                files,
            },
        );
        self.ops.truncate(HISTORY_CAP);
        id
    }

    /// Repoint snapshots after a pure rename so undo restores the document
    /// where it now lives.
    pub fn rewrite_path(&mut self, old_path: &str, new_path: &str) {
        for op in &mut self.ops {
            for file in &mut op.files {
                if file.path == old_path {
                    file.path = new_path.to_string();
                }
            }
        }
    }

    /// Restore every affected document to exactly its recorded prior
    /// state. Per-file failures are tallied and never abort the rest.
    /// The operation is consumed: single-use, no redo.
    pub fn undo(
        &mut self,
        tracking: &mut TrackingTable,
        store: &mut dyn DocumentStore,
        id: &str,
        now: DateTime<Utc>,
    ) -> io::Result<Option<UndoReport>> {
        let Some(idx) = self.ops.iter().position(|op| op.id == id) else {
            return Ok(None);
        };
        let op = self.ops.remove(idx);

        let mut report = UndoReport::default();
        for file in &op.files {
            match restore_file(store, tracking, file, now) {
                Ok(()) => report.restored += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(Some(report))
    }
}

fn restore_file(
    store: &mut dyn DocumentStore,
    tracking: &mut TrackingTable,
    file: &FileSnapshot,
    now: DateTime<Utc>,
) -> io::Result<()> {
    if !store.exists(&file.path) {
        return Err(io::Error::new(io::ErrorKind::NotFound, file.path.clone()));
    }
    store.write_tags(&file.path, &file.tags_before)?;
    match &file.tracking_before {
        // Replace with the exact snapshot; a later operation may already
        // have mutated tracking and a re-merge would double-count.
        Some(snapshot) => tracking.replace(&file.path, snapshot.clone(), now),
        None => {
            let drop_entry = tracking.get(&file.path).is_some_and(|entry| {
                !entry
                    .auto_tags
                    .iter()
                    .any(|t| contains_ci(&file.tags_before, t))
            });
            if drop_entry {
                tracking.remove(&file.path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn snapshot(path: &str, before: &[&str], after: &[&str]) -> FileSnapshot {
        FileSnapshot {
            path: path.to_string(),
            tags_before: tags(before),
            tags_after: tags(after),
            tracking_before: None,
        }
    }

    #[test]
    fn history_keeps_exactly_the_fifty_most_recent() {
        let mut history = OperationHistory::default();
        let now = Utc::now();
        for i in 0..55 {
            history.record(
                OperationKind::Apply,
                format!("op {i}"),
                Vec::new(),
                now,
            );
        }

        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history.operations()[0].description, "op 54");
        assert_eq!(history.operations()[HISTORY_CAP - 1].description, "op 5");
    }

    #[test]
    fn undo_restores_exact_prior_tags_and_consumes_the_operation() {
        let mut store = MemoryStore::new();
        store.add_doc("a.md", &["x", "extra"]);
        let mut tracking = TrackingTable::default();
        let mut history = OperationHistory::default();
        let now = Utc::now();

        let id = history.record(
            OperationKind::Apply,
            "tagged a.md".to_string(),
            vec![FileSnapshot {
                tracking_before: Some(Vec::new()),
                ..snapshot("a.md", &["x"], &["x", "extra"])
            }],
            now,
        );

        let report = history
            .undo(&mut tracking, &mut store, &id, now)
            .unwrap()
            .unwrap();

        assert_eq!(report, UndoReport { restored: 1, failed: 0 });
        assert_eq!(store.tags_of("a.md"), tags(&["x"]));
        assert!(history.get(&id).is_none());
        assert!(history
            .undo(&mut tracking, &mut store, &id, now)
            .unwrap()
            .is_none());
    }

    #[test]
    fn undo_replaces_tracking_with_the_snapshot_never_merges() {
        // Scenario E: tracking drifted to {z} after the operation.
        let mut store = MemoryStore::new();
        store.add_doc("a.md", &[]);
        let mut tracking = TrackingTable::default();
        let mut history = OperationHistory::default();
        let now = Utc::now();
        tracking.union_into("a.md", &tags(&["z"]), now);

        let id = history.record(
            OperationKind::Revert,
            "removed auto tags".to_string(),
            vec![FileSnapshot {
                tracking_before: Some(tags(&["x", "y"])),
                ..snapshot("a.md", &["x", "y"], &[])
            }],
            now,
        );
        history
            .undo(&mut tracking, &mut store, &id, now)
            .unwrap()
            .unwrap();

        assert_eq!(store.tags_of("a.md"), tags(&["x", "y"]));
        assert_eq!(tracking.get("a.md").unwrap().auto_tags, tags(&["x", "y"]));
    }

    #[test]
    fn legacy_undo_drops_tracking_only_when_nothing_tracked_survives() {
        let mut store = MemoryStore::new();
        store.add_doc("a.md", &["auto"]);
        store.add_doc("b.md", &["auto"]);
        let mut tracking = TrackingTable::default();
        let mut history = OperationHistory::default();
        let now = Utc::now();
        tracking.union_into("a.md", &tags(&["auto"]), now);
        tracking.union_into("b.md", &tags(&["auto"]), now);

        // a.md restores to a set still containing the tracked tag.
        let id = history.record(
            OperationKind::Bulk,
            "legacy".to_string(),
            vec![
                snapshot("a.md", &["auto"], &["auto"]),
                snapshot("b.md", &["manual"], &["auto"]),
            ],
            now,
        );
        history
            .undo(&mut tracking, &mut store, &id, now)
            .unwrap()
            .unwrap();

        assert!(tracking.get("a.md").is_some());
        assert!(tracking.get("b.md").is_none());
    }

    #[test]
    fn per_file_failures_never_abort_the_batch() {
        let mut store = MemoryStore::new();
        store.add_doc("ok.md", &["t"]);
        let mut tracking = TrackingTable::default();
        let mut history = OperationHistory::default();
        let now = Utc::now();

        let id = history.record(
            OperationKind::Bulk,
            "bulk".to_string(),
            vec![
                snapshot("gone.md", &[], &["t"]),
                snapshot("ok.md", &[], &["t"]),
            ],
            now,
        );
        let report = history
            .undo(&mut tracking, &mut store, &id, now)
            .unwrap()
            .unwrap();

        assert_eq!(report, UndoReport { restored: 1, failed: 1 });
        assert!(store.tags_of("ok.md").is_empty());
    }

    #[test]
    fn rewrite_path_repoints_snapshots() {
        let mut history = OperationHistory::default();
        let now = Utc::now();
        let id = history.record(
            OperationKind::Apply,
            "tagged".to_string(),
            vec![snapshot("old.md", &[], &["t"])],
            now,
        );

        history.rewrite_path("old.md", "new.md");
        assert_eq!(history.get(&id).unwrap().files[0].path, "new.md");
    }

    #[test]
    fn restored_ids_continue_the_sequence() {
        let mut ops = Vec::new();
        let now = Utc::now();
        ops.push(TagOperation {
            id: "op-7".to_string(),
            kind: OperationKind::Apply,
            description: "old".to_string(),
            timestamp: now,
            files: Vec::new(),
        });
        let mut history = OperationHistory::from_operations(ops);

        let id = history.record(OperationKind::Apply, "new".to_string(), Vec::new(), now);
        assert_eq!(id, "op-8");
    }
}
