use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::state::Settings;
use crate::tags::contains_ci;
use crate::tags::normalize_tag;

/// Folder rules keyed by folder path; `""` is the vault root.
pub type RuleTable = BTreeMap<String, FolderRule>;

/// How far below its own folder a rule pushes tags. The legacy wire shape
/// is preserved exactly: `"all"`, `[0]` (this folder only), or an explicit
/// list of depths-below-rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ApplyDepthWire", into = "ApplyDepthWire")]
pub enum ApplyDepth {
    All,
    ThisFolderOnly,
    Levels(BTreeSet<usize>),
}

impl ApplyDepth {
    /// Documents directly in the rule's folder are always covered.
    pub fn allows(&self, levels_down: usize) -> bool {
        if levels_down == 0 {
            return true;
        }
        match self {
            Self::All => true,
            Self::ThisFolderOnly => false,
            Self::Levels(levels) => levels.contains(&levels_down),
        }
    }
}

impl Default for ApplyDepth {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ApplyDepthWire {
    Keyword(String),
    Levels(Vec<usize>),
}

impl TryFrom<ApplyDepthWire> for ApplyDepth {
    type Error = String;

    fn try_from(wire: ApplyDepthWire) -> Result<Self, Self::Error> {
        match wire {
            ApplyDepthWire::Keyword(keyword) if keyword.eq_ignore_ascii_case("all") => {
                Ok(Self::All)
            }
            ApplyDepthWire::Keyword(keyword) => {
                Err(format!("unknown apply-down keyword: {keyword}"))
            }
            ApplyDepthWire::Levels(levels) if levels == [0] => Ok(Self::ThisFolderOnly),
            ApplyDepthWire::Levels(levels) => Ok(Self::Levels(levels.into_iter().collect())),
        }
    }
}

impl From<ApplyDepth> for ApplyDepthWire {
    fn from(depth: ApplyDepth) -> Self {
        match depth {
            ApplyDepth::All => Self::Keyword("all".to_string()),
            ApplyDepth::ThisFolderOnly => Self::Levels(vec![0]),
            ApplyDepth::Levels(levels) => Self::Levels(levels.into_iter().collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FolderRule {
    pub tags: Vec<String>,
    /// 1-based folder depths whose slugified name becomes a tag.
    pub folder_tag_levels: Vec<usize>,
    #[serde(rename = "applyDownLevels")]
    pub apply_down: ApplyDepth,
    /// `false` makes this rule a barrier: ancestor rule tags never reach
    /// it or its subtree.
    pub inherit_from_ancestors: bool,
    pub apply_to_new_files: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for FolderRule {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            folder_tag_levels: Vec::new(),
            apply_down: ApplyDepth::default(),
            inherit_from_ancestors: true,
            apply_to_new_files: true,
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl FolderRule {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }
}

pub fn folder_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    segments
}

fn apostrophes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("['\u{2019}]").expect("apostrophe pattern"))
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-z0-9]+").expect("non-alphanumeric pattern"))
}

/// Lowercase, strip apostrophes, collapse everything else to single
/// hyphens. Results under 2 characters or with no alphanumeric at all are
/// rejected.
pub fn slugify(name: &str) -> Option<String> {
    let lowered = name.to_lowercase();
    let stripped = apostrophes().replace_all(&lowered, "");
    let collapsed = non_alphanumeric().replace_all(&stripped, "-");
    let slug = collapsed.trim_matches('-').to_string();
    if slug.len() < 2 || !slug.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(slug)
}

/// Compose every applicable folder rule into one deduplicated tag set for
/// `path`. Pure: same inputs, same output.
pub fn resolve(path: &str, rules: &RuleTable, settings: &Settings) -> Vec<String> {
    if settings.is_ignored(path) {
        return Vec::new();
    }

    let folders = folder_segments(path);
    let doc_depth = folders.len();

    // Nearest barrier wins; everything shallower is blocked.
    let mut barrier = 0usize;
    for depth in (1..=doc_depth).rev() {
        let folder_path = folders[..depth].join("/");
        if let Some(rule) = rules.get(&folder_path) {
            if !rule.inherit_from_ancestors {
                barrier = depth;
                break;
            }
        }
    }

    let mut out: Vec<String> = Vec::new();
    for depth in 0..=doc_depth {
        let folder_path = folders[..depth].join("/");
        let Some(rule) = rules.get(&folder_path) else {
            continue;
        };
        if !rule.apply_to_new_files || depth < barrier {
            continue;
        }
        if !rule.apply_down.allows(doc_depth - depth) {
            continue;
        }
        for tag in &rule.tags {
            let Some(tag) = slugify(&normalize_tag(tag)) else {
                continue;
            };
            if !contains_ci(&out, &tag) {
                out.push(tag);
            }
        }
        for &level in &rule.folder_tag_levels {
            let Some(folder) = level.checked_sub(1).and_then(|idx| folders.get(idx)) else {
                continue;
            };
            if let Some(slug) = slugify(folder) {
                if !contains_ci(&out, &slug) {
                    out.push(slug);
                }
            }
        }
    }
    out
}

/// The legacy resolver: a fixed-depth walk up from the immediate parent,
/// with a per-folder alias override and no barrier semantics. Kept for
/// backward-compatible callers; equally pure.
pub fn resolve_legacy(path: &str, settings: &Settings) -> Vec<String> {
    if settings.is_ignored(path) {
        return Vec::new();
    }

    let folders = folder_segments(path);
    let mut out: Vec<String> = Vec::new();
    let depth = settings.legacy.tag_depth.max(1);
    for idx in (0..folders.len()).rev().take(depth) {
        let folder_path = folders[..=idx].join("/");
        match settings.legacy.folder_aliases.get(&folder_path) {
            Some(aliases) => {
                for alias in aliases {
                    let alias = normalize_tag(alias);
                    if !alias.is_empty() && !contains_ci(&out, &alias) {
                        out.push(alias);
                    }
                }
            }
            None => {
                if let Some(slug) = slugify(folders[idx]) {
                    if !contains_ci(&out, &slug) {
                        out.push(slug);
                    }
                }
            }
        }
    }
    out
}
