use std::io;

use chrono::DateTime;
use chrono::Utc;

use crate::history::FileSnapshot;
use crate::history::OperationKind;
use crate::rules;
use crate::state::EngineState;
use crate::store::DocumentStore;
use crate::tags;
use crate::tags::contains_ci;
use crate::tags::WriteOutcome;

/// Long batch loops report progress every this many documents, purely for
/// UI responsiveness.
pub const YIELD_EVERY: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub processed: usize,
    pub changed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReport {
    pub resolved: Vec<String>,
    pub outcome: WriteOutcome,
}

/// Tag one document from its folder rules, recording an `Apply` operation
/// when anything changed.
pub fn tag_document(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    path: &str,
    now: DateTime<Utc>,
) -> io::Result<TagReport> {
    let resolved = rules::resolve(path, &state.rules, &state.settings);
    if !store.exists(path) {
        return Ok(TagReport {
            resolved,
            outcome: WriteOutcome::MissingTarget,
        });
    }
    if resolved.is_empty() {
        return Ok(TagReport {
            resolved,
            outcome: WriteOutcome::Applied { changed: false },
        });
    }

    let tags_before = store.read_tags(path)?;
    let tracking_before = state
        .tracking
        .get(path)
        .map(|entry| entry.auto_tags.clone())
        .unwrap_or_default();
    let outcome = tags::apply_tags(store, &mut state.tracking, path, &resolved, now)?;
    if outcome.changed() {
        let tags_after = merged(&tags_before, &resolved);
        state.history.record(
            OperationKind::Apply,
            format!("Tagged {path}"),
            vec![FileSnapshot {
                path: path.to_string(),
                tags_before,
                tags_after,
                tracking_before: Some(tracking_before),
            }],
            now,
        );
    }
    Ok(TagReport { resolved, outcome })
}

/// Entry point for a document-creation signal.
pub fn handle_create(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    path: &str,
    now: DateTime<Utc>,
) -> io::Result<Option<TagReport>> {
    if !state.settings.apply_on_create || state.settings.is_ignored(path) {
        return Ok(None);
    }
    tag_document(state, store, path, now).map(Some)
}

/// Apply folder rules across the vault, or one folder. Records a single
/// `Bulk` operation carrying a snapshot per changed document; a mid-batch
/// failure leaves the partial batch reflected accurately in that list.
pub fn bulk_apply(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    folder: Option<&str>,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let docs = store.list_documents(folder)?;
    let mut summary = BulkSummary::default();
    let mut snapshots: Vec<FileSnapshot> = Vec::new();

    for (index, path) in docs.iter().enumerate() {
        if index > 0 && index % YIELD_EVERY == 0 {
            progress(index);
        }
        summary.processed += 1;
        if state.settings.is_ignored(path) {
            summary.skipped += 1;
            continue;
        }
        let resolved = rules::resolve(path, &state.rules, &state.settings);
        if resolved.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let tags_before = match store.read_tags(path) {
            Ok(tags) => tags,
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };
        let tracking_before = state
            .tracking
            .get(path)
            .map(|entry| entry.auto_tags.clone())
            .unwrap_or_default();
        match tags::apply_tags(store, &mut state.tracking, path, &resolved, now) {
            Ok(WriteOutcome::Applied { changed: true }) => {
                snapshots.push(FileSnapshot {
                    path: path.clone(),
                    tags_after: merged(&tags_before, &resolved),
                    tags_before,
                    tracking_before: Some(tracking_before),
                });
                summary.changed += 1;
            }
            Ok(WriteOutcome::Applied { changed: false }) | Ok(WriteOutcome::MissingTarget) => {
                summary.skipped += 1;
            }
            Err(_) => summary.failed += 1,
        }
    }

    if !snapshots.is_empty() {
        let description = format!("Applied folder tags to {} document(s)", snapshots.len());
        state
            .history
            .record(OperationKind::Bulk, description, snapshots, now);
    }
    Ok(summary)
}

/// Remove every tracked tag from every tracked document.
pub fn remove_all_auto(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let paths = state.tracking.paths();
    remove_tracked(
        state,
        store,
        &paths,
        OperationKind::Revert,
        |n| format!("Removed auto tags from {n} document(s)"),
        progress,
        now,
    )
}

/// Remove tracked tags from documents under one folder.
pub fn remove_by_folder(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    folder: &str,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let folder = folder.trim_end_matches('/');
    let prefix = format!("{folder}/");
    let paths: Vec<String> = state
        .tracking
        .paths()
        .into_iter()
        .filter(|path| path.starts_with(&prefix))
        .collect();
    remove_tracked(
        state,
        store,
        &paths,
        OperationKind::Remove,
        |n| format!("Removed auto tags under {folder} from {n} document(s)"),
        progress,
        now,
    )
}

/// Remove tracked tags from entries last updated at or after `cutoff`.
pub fn remove_since(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    cutoff: DateTime<Utc>,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let paths: Vec<String> = state
        .tracking
        .iter()
        .filter(|(_, entry)| entry.last_updated >= cutoff)
        .map(|(path, _)| path.clone())
        .collect();
    remove_tracked(
        state,
        store,
        &paths,
        OperationKind::Remove,
        |n| format!("Removed auto tags applied since {} from {n} document(s)", cutoff.format("%Y-%m-%d")),
        progress,
        now,
    )
}

/// Destructive: strip every tag, user-entered included, from every
/// document. Protected tags still survive.
pub fn remove_all_tags(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let docs = store.list_documents(None)?;
    let mut summary = BulkSummary::default();
    let mut snapshots: Vec<FileSnapshot> = Vec::new();

    for (index, path) in docs.iter().enumerate() {
        if index > 0 && index % YIELD_EVERY == 0 {
            progress(index);
        }
        summary.processed += 1;
        let tags_before = match store.read_tags(path) {
            Ok(tags) => tags,
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };
        let tags_after: Vec<String> = tags_before
            .iter()
            .filter(|t| contains_ci(&state.settings.protected_tags, t))
            .cloned()
            .collect();
        let tracked = state
            .tracking
            .get(path)
            .map(|entry| entry.auto_tags.clone())
            .unwrap_or_default();
        if tags_after.len() == tags_before.len() && tracked.is_empty() {
            summary.skipped += 1;
            continue;
        }
        if tags_after.len() != tags_before.len() {
            if store.write_tags(path, &tags_after).is_err() {
                summary.failed += 1;
                continue;
            }
        }
        state.tracking.remove(path);
        snapshots.push(FileSnapshot {
            path: path.clone(),
            tags_before,
            tags_after,
            tracking_before: Some(tracked),
        });
        summary.changed += 1;
    }

    if !snapshots.is_empty() {
        let description = format!("Removed all tags from {} document(s)", snapshots.len());
        state
            .history
            .record(OperationKind::Remove, description, snapshots, now);
    }
    Ok(summary)
}

fn remove_tracked(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    paths: &[String],
    kind: OperationKind,
    describe: impl FnOnce(usize) -> String,
    progress: &mut dyn FnMut(usize),
    now: DateTime<Utc>,
) -> io::Result<BulkSummary> {
    let mut summary = BulkSummary::default();
    let mut snapshots: Vec<FileSnapshot> = Vec::new();

    for (index, path) in paths.iter().enumerate() {
        if index > 0 && index % YIELD_EVERY == 0 {
            progress(index);
        }
        summary.processed += 1;
        let Some(entry) = state.tracking.get(path) else {
            summary.skipped += 1;
            continue;
        };
        let tracked = entry.auto_tags.clone();
        if !store.exists(path) {
            // the document vanished; drop the stale entry
            state.tracking.remove(path);
            snapshots.push(FileSnapshot {
                path: path.clone(),
                tags_before: Vec::new(),
                tags_after: Vec::new(),
                tracking_before: Some(tracked),
            });
            summary.skipped += 1;
            continue;
        }
        let tags_before = match store.read_tags(path) {
            Ok(tags) => tags,
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };
        match tags::remove_tags(
            store,
            &mut state.tracking,
            path,
            &tracked,
            true,
            &state.settings.protected_tags,
            now,
        ) {
            Ok(WriteOutcome::Applied { changed }) => {
                let tags_after: Vec<String> = tags_before
                    .iter()
                    .filter(|t| {
                        contains_ci(&state.settings.protected_tags, t)
                            || !contains_ci(&tracked, t)
                    })
                    .cloned()
                    .collect();
                snapshots.push(FileSnapshot {
                    path: path.clone(),
                    tags_before,
                    tags_after,
                    tracking_before: Some(tracked),
                });
                if changed {
                    summary.changed += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            Ok(WriteOutcome::MissingTarget) => summary.skipped += 1,
            Err(_) => summary.failed += 1,
        }
    }

    if !snapshots.is_empty() {
        let description = describe(snapshots.len());
        state.history.record(kind, description, snapshots, now);
    }
    Ok(summary)
}

fn merged(before: &[String], added: &[String]) -> Vec<String> {
    let mut out = before.to_vec();
    for tag in added {
        if !contains_ci(&out, tag) {
            out.push(tag.clone());
        }
    }
    out
}
