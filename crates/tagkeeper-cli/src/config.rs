use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tagkeeper_core::state::MovePolicy;
use tagkeeper_core::state::Settings;

/// Optional overrides layered onto the persisted settings. Discovered at
/// `<vault>/.tagkeeper/config.toml`, then the user config directory.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub protected_tags: Option<Vec<String>>,
    pub ignored_paths: Option<Vec<String>>,
    pub move_policy: Option<MovePolicy>,
    pub apply_on_create: Option<bool>,
    pub debounce_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protected_tags: None,
            ignored_paths: None,
            move_policy: None,
            apply_on_create: None,
            debounce_ms: None,
        }
    }
}

impl Config {
    pub fn load(vault_root: &Path) -> io::Result<Self> {
        let Some(path) = discover(vault_root) else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text)
            .map_err(|err| io::Error::other(format!("parse {}: {err}", path.display())))
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(protected) = &self.protected_tags {
            settings.protected_tags = protected.clone();
        }
        if let Some(ignored) = &self.ignored_paths {
            settings.ignored_paths = ignored.clone();
        }
        if let Some(policy) = self.move_policy {
            settings.move_policy = policy;
        }
        if let Some(apply_on_create) = self.apply_on_create {
            settings.apply_on_create = apply_on_create;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            settings.debounce_ms = debounce_ms;
        }
    }
}

fn discover(vault_root: &Path) -> Option<PathBuf> {
    let local = vault_root.join(".tagkeeper/config.toml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("tagkeeper/config.toml"))
        .filter(|path| path.exists())
}
