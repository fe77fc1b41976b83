use std::io;

use chrono::DateTime;
use chrono::Utc;

use crate::state::EngineState;
use crate::store::DocumentStore;
use crate::tags;
use crate::tags::contains_ci;

/// One data-integrity finding on a tracking entry. Detected only by an
/// explicit scan; nothing here runs automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Tracking references a document that no longer exists.
    MissingDocument,
    /// A tracked document now lives under an ignored path.
    IgnoredLocation,
    /// Tracked tags are absent from the document's visible set.
    DriftedTags { missing: Vec<String> },
}

impl IssueKind {
    pub fn describe(&self) -> String {
        match self {
            Self::MissingDocument => "document no longer exists".to_string(),
            Self::IgnoredLocation => "document is under an ignored path".to_string(),
            Self::DriftedTags { missing } => {
                format!("tracked tags missing from document: {}", missing.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueFix {
    Reapply,
    Drop,
}

pub fn scan(state: &EngineState, store: &dyn DocumentStore) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (path, entry) in state.tracking.iter() {
        if !store.exists(path) {
            issues.push(Issue {
                path: path.clone(),
                kind: IssueKind::MissingDocument,
            });
            continue;
        }
        if state.settings.is_ignored(path) {
            issues.push(Issue {
                path: path.clone(),
                kind: IssueKind::IgnoredLocation,
            });
            continue;
        }
        let Ok(visible) = store.read_tags(path) else {
            continue;
        };
        let missing: Vec<String> = entry
            .auto_tags
            .iter()
            .filter(|t| !contains_ci(&visible, t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            issues.push(Issue {
                path: path.clone(),
                kind: IssueKind::DriftedTags { missing },
            });
        }
    }
    issues
}

/// Fix one issue. Returns whether anything changed; a fix that does not
/// apply to the issue kind is a no-op, never an error.
pub fn fix_issue(
    state: &mut EngineState,
    store: &mut dyn DocumentStore,
    issue: &Issue,
    fix: IssueFix,
    now: DateTime<Utc>,
) -> io::Result<bool> {
    match fix {
        IssueFix::Drop => Ok(state.tracking.remove(&issue.path).is_some()),
        IssueFix::Reapply => match &issue.kind {
            IssueKind::DriftedTags { missing } => {
                let outcome =
                    tags::apply_tags(store, &mut state.tracking, &issue.path, missing, now)?;
                Ok(outcome.changed())
            }
            IssueKind::MissingDocument | IssueKind::IgnoredLocation => Ok(false),
        },
    }
}
