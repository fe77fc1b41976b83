use std::collections::HashMap;
use std::io;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::history::FileSnapshot;
use crate::history::OperationKind;
use crate::rules;
use crate::state::EngineState;
use crate::state::MovePolicy;
use crate::store::parent_folder;
use crate::store::DocumentStore;
use crate::tags;

/// One observed relocation, alive only between the rename signal and the
/// batched decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub path: String,
    pub old_path: String,
    pub old_folder: String,
    pub new_folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveBatch {
    pub moves: Vec<PendingMove>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDecision {
    Retag,
    Leave,
    Cancel,
}

impl MoveDecision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Retag => "retag",
            Self::Leave => "leave",
            Self::Cancel => "cancel",
        }
    }
}

/// How a single rename signal was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    SuppressedCorrective,
    IgnoredDestination,
    PureRename,
    PolicyRetagged,
    PolicyLeft,
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub applied: usize,
    pub failed: usize,
}

/// Debounced move orchestration. Owns only ephemeral state: the pending
/// batch (insertion order, keyed by destination), one rearmable debounce
/// deadline, and the corrective-rename suppression set. Deadlines are
/// plain data compared against an injected `now`, so teardown can always
/// cancel them.
#[derive(Debug, Default)]
pub struct MoveHandler {
    pending: Vec<PendingMove>,
    deadline: Option<DateTime<Utc>>,
    suppressed: HashMap<String, DateTime<Utc>>,
}

impl MoveHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Entry point for a rename signal from the host. The document has
    /// already been moved; `new_path` is where it lives now.
    pub fn on_rename(
        &mut self,
        state: &mut EngineState,
        store: &mut dyn DocumentStore,
        old_path: &str,
        new_path: &str,
        now: DateTime<Utc>,
    ) -> io::Result<RenameOutcome> {
        self.purge_expired(now);
        if self.suppressed.remove(new_path).is_some() {
            return Ok(RenameOutcome::SuppressedCorrective);
        }
        if state.settings.is_ignored(new_path) {
            return Ok(RenameOutcome::IgnoredDestination);
        }

        let old_folder = parent_folder(old_path);
        let new_folder = parent_folder(new_path);
        if old_folder == new_folder {
            state.tracking.rekey(old_path, new_path);
            state.history.rewrite_path(old_path, new_path);
            return Ok(RenameOutcome::PureRename);
        }

        let pending = PendingMove {
            path: new_path.to_string(),
            old_path: old_path.to_string(),
            old_folder: old_folder.to_string(),
            new_folder: new_folder.to_string(),
        };
        match state.settings.move_policy {
            MovePolicy::AlwaysRetag => {
                retag_files(state, store, &[pending], now)?;
                Ok(RenameOutcome::PolicyRetagged)
            }
            MovePolicy::AlwaysLeave => {
                state.tracking.rekey(old_path, new_path);
                Ok(RenameOutcome::PolicyLeft)
            }
            MovePolicy::Ask => {
                match self.pending.iter_mut().find(|m| m.path == pending.path) {
                    Some(slot) => *slot = pending,
                    None => self.pending.push(pending),
                }
                self.deadline =
                    Some(now + Duration::milliseconds(state.settings.debounce_ms as i64));
                Ok(RenameOutcome::Queued)
            }
        }
    }

    /// Drain the batch once the debounce window elapsed with no new
    /// arrivals. One decision covers every queued move.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<MoveBatch> {
        self.purge_expired(now);
        let deadline = self.deadline?;
        if now < deadline || self.pending.is_empty() {
            return None;
        }
        self.deadline = None;
        Some(MoveBatch {
            moves: std::mem::take(&mut self.pending),
        })
    }

    /// Apply the user's decision to every non-excluded file in the batch.
    pub fn apply_decision(
        &mut self,
        state: &mut EngineState,
        store: &mut dyn DocumentStore,
        batch: MoveBatch,
        decision: MoveDecision,
        excluded: &[String],
        remember: bool,
        now: DateTime<Utc>,
    ) -> io::Result<MoveReport> {
        if remember {
            state.settings.move_policy = match decision {
                MoveDecision::Retag => MovePolicy::AlwaysRetag,
                MoveDecision::Leave => MovePolicy::AlwaysLeave,
                MoveDecision::Cancel => MovePolicy::Ask,
            };
        }

        let moves: Vec<PendingMove> = batch
            .moves
            .into_iter()
            .filter(|m| !excluded.contains(&m.path))
            .collect();

        match decision {
            MoveDecision::Retag => retag_files(state, store, &moves, now),
            MoveDecision::Leave => {
                let mut report = MoveReport::default();
                for m in &moves {
                    state.tracking.rekey(&m.old_path, &m.path);
                    report.applied += 1;
                }
                Ok(report)
            }
            MoveDecision::Cancel => Ok(self.cancel_moves(state, store, &moves, now)),
        }
    }

    /// Move every file back where it came from. Each original path goes
    /// into the suppression set first so the corrective rename does not
    /// re-enter this handler; the TTL covers a corrective event that
    /// never fires.
    fn cancel_moves(
        &mut self,
        state: &EngineState,
        store: &mut dyn DocumentStore,
        moves: &[PendingMove],
        now: DateTime<Utc>,
    ) -> MoveReport {
        let ttl = Duration::milliseconds(state.settings.suppression_ttl_ms as i64);
        let mut report = MoveReport::default();
        let mut left_folders: Vec<String> = Vec::new();
        for m in moves {
            self.suppressed.insert(m.old_path.clone(), now + ttl);
            match store.rename(&m.path, &m.old_path) {
                Ok(()) => {
                    report.applied += 1;
                    if !m.new_folder.is_empty() && !left_folders.contains(&m.new_folder) {
                        left_folders.push(m.new_folder.clone());
                    }
                }
                Err(_) => report.failed += 1,
            }
        }
        cleanup_folders(store, left_folders);
        report
    }

    /// Cancel every pending batch and timer. Required on teardown so no
    /// deadline fires against a torn-down instance.
    pub fn teardown(&mut self) {
        self.pending.clear();
        self.deadline = None;
        self.suppressed.clear();
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.suppressed.retain(|_, expiry| *expiry > now);
    }
}

fn retag_files(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    moves: &[PendingMove],
    now: DateTime<Utc>,
) -> io::Result<MoveReport> {
    let mut report = MoveReport::default();
    let mut snapshots: Vec<FileSnapshot> = Vec::new();
    for m in moves {
        match retag_one(state, store, m, now) {
            Ok(Some(snapshot)) => {
                snapshots.push(snapshot);
                report.applied += 1;
            }
            Ok(None) => {}
            Err(_) => report.failed += 1,
        }
    }
    if !snapshots.is_empty() {
        let description = match snapshots.as_slice() {
            [only] => format!("Moved {}", only.path),
            many => format!("Moved {} file(s)", many.len()),
        };
        state
            .history
            .record(OperationKind::Move, description, snapshots, now);
    }
    Ok(report)
}

fn retag_one(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    m: &PendingMove,
    now: DateTime<Utc>,
) -> io::Result<Option<FileSnapshot>> {
    if !store.exists(&m.path) {
        // vanished between signal and decision
        return Ok(None);
    }
    let tracked = state
        .tracking
        .get(&m.old_path)
        .map(|entry| entry.auto_tags.clone())
        .unwrap_or_default();
    let tags_before = store.read_tags(&m.path)?;

    tags::remove_tags(
        store,
        &mut state.tracking,
        &m.path,
        &tracked,
        false,
        &state.settings.protected_tags,
        now,
    )?;
    state.tracking.remove(&m.old_path);

    let resolved = rules::resolve(&m.path, &state.rules, &state.settings);
    tags::apply_tags(store, &mut state.tracking, &m.path, &resolved, now)?;

    let tags_after = store.read_tags(&m.path)?;
    Ok(Some(FileSnapshot {
        path: m.path.clone(),
        tags_before,
        tags_after,
        tracking_before: Some(tracked),
    }))
}

/// Best-effort, cosmetic cleanup of emptied destination folders after a
/// cancel. Deepest first, bounded retries, failures silent; runs strictly
/// after all restorative renames and never gates tag correctness.
fn cleanup_folders(store: &mut dyn DocumentStore, mut folders: Vec<String>) {
    folders.sort_by(|a, b| {
        b.matches('/')
            .count()
            .cmp(&a.matches('/').count())
            .then_with(|| a.cmp(b))
    });
    for folder in folders {
        for _ in 0..3 {
            match store.remove_folder_if_empty(&folder) {
                Ok(true) => break,
                Ok(false) | Err(_) => continue,
            }
        }
    }
}
