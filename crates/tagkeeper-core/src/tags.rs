use std::io;

use chrono::DateTime;
use chrono::Utc;

use crate::state::TrackingTable;
use crate::store::DocumentStore;

/// Strip a leading `#` and surrounding whitespace.
pub fn normalize_tag(t: &str) -> String {
    t.trim().trim_start_matches('#').trim().to_string()
}

pub fn contains_ci(list: &[String], tag: &str) -> bool {
    let needle = tag.to_lowercase();
    list.iter().any(|t| t.to_lowercase() == needle)
}

/// Normalize and deduplicate, case-insensitively, preserving first-seen order.
pub fn dedup_ci(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() && !contains_ci(&out, &tag) {
            out.push(tag);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied { changed: bool },
    MissingTarget,
}

impl WriteOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied { changed: true })
    }
}

/// Merge `tags` into the document's visible tag set and union them into the
/// tracking entry. Existing casing wins on a case-insensitive collision.
pub fn apply_tags(
    store: &mut dyn DocumentStore,
    tracking: &mut TrackingTable,
    path: &str,
    tags: &[String],
    now: DateTime<Utc>,
) -> io::Result<WriteOutcome> {
    if !store.exists(path) {
        return Ok(WriteOutcome::MissingTarget);
    }
    let requested = dedup_ci(tags);
    if requested.is_empty() {
        return Ok(WriteOutcome::Applied { changed: false });
    }

    let current = store.read_tags(path)?;
    let mut merged = current.clone();
    for tag in &requested {
        if !contains_ci(&merged, tag) {
            merged.push(tag.clone());
        }
    }
    let changed = merged.len() != current.len();
    if changed {
        store.write_tags(path, &merged)?;
    }
    tracking.union_into(path, &requested, now);
    Ok(WriteOutcome::Applied { changed })
}

/// Remove `tags` from the document, skipping protected tags. Protected tags
/// can be added but never removed by this system.
pub fn remove_tags(
    store: &mut dyn DocumentStore,
    tracking: &mut TrackingTable,
    path: &str,
    tags: &[String],
    sync_tracking: bool,
    protected: &[String],
    now: DateTime<Utc>,
) -> io::Result<WriteOutcome> {
    if !store.exists(path) {
        return Ok(WriteOutcome::MissingTarget);
    }
    let removable: Vec<String> = dedup_ci(tags)
        .into_iter()
        .filter(|t| !contains_ci(protected, t))
        .collect();
    if removable.is_empty() {
        return Ok(WriteOutcome::Applied { changed: false });
    }

    let current = store.read_tags(path)?;
    let next: Vec<String> = current
        .iter()
        .filter(|t| !contains_ci(&removable, t))
        .cloned()
        .collect();
    let changed = next.len() != current.len();
    if changed {
        store.write_tags(path, &next)?;
    }
    if sync_tracking {
        tracking.strip(path, &removable, now);
    }
    Ok(WriteOutcome::Applied { changed })
}
