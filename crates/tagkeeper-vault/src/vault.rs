use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tagkeeper_core::store::DocumentStore;

use crate::frontmatter;

/// Platform droppings that never count against "empty" when cleaning up a
/// folder.
const JUNK_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Filesystem-backed document store. Paths are vault-relative with
/// forward slashes; tag reads go through a cache invalidated on write and
/// rename.
#[derive(Debug)]
pub struct VaultStore {
    root: PathBuf,
    tag_cache: RefCell<HashMap<String, Vec<String>>>,
}

impl VaultStore {
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("vault root not found: {}", root.display()),
            ));
        }
        Ok(Self {
            root: root.to_path_buf(),
            tag_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl DocumentStore for VaultStore {
    fn exists(&self, path: &str) -> bool {
        self.abs(path).is_file()
    }

    fn read_tags(&self, path: &str) -> io::Result<Vec<String>> {
        if let Some(tags) = self.tag_cache.borrow().get(path) {
            return Ok(tags.clone());
        }
        let content = fs::read_to_string(self.abs(path))?;
        let tags = frontmatter::read_tags(&content);
        self.tag_cache
            .borrow_mut()
            .insert(path.to_string(), tags.clone());
        Ok(tags)
    }

    fn write_tags(&mut self, path: &str, tags: &[String]) -> io::Result<()> {
        let content = fs::read_to_string(self.abs(path))?;
        let next = frontmatter::replace_tags(&content, tags)?;
        fs::write(self.abs(path), next)?;
        self.tag_cache
            .borrow_mut()
            .insert(path.to_string(), tags.to_vec());
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        let dst = self.abs(to);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.abs(from), dst)?;
        let mut cache = self.tag_cache.borrow_mut();
        if let Some(tags) = cache.remove(from) {
            cache.insert(to.to_string(), tags);
        }
        Ok(())
    }

    fn list_documents(&self, folder: Option<&str>) -> io::Result<Vec<String>> {
        let base = match folder {
            Some(folder) if !folder.is_empty() => self.abs(folder),
            _ => self.root.clone(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut docs = Vec::new();
        visit_documents(&self.root, &base, &mut docs)?;
        docs.sort();
        Ok(docs)
    }

    fn list_folders(&self) -> io::Result<Vec<String>> {
        let mut folders = Vec::new();
        visit_folders(&self.root, &self.root, &mut folders)?;
        folders.sort();
        Ok(folders)
    }

    fn remove_folder_if_empty(&mut self, folder: &str) -> io::Result<bool> {
        let dir = self.abs(folder);
        if !dir.is_dir() {
            return Ok(false);
        }
        let mut junk: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.path().is_file() && JUNK_FILES.contains(&name.as_ref()) {
                junk.push(entry.path());
            } else {
                return Ok(false);
            }
        }
        for path in junk {
            let _ = fs::remove_file(path);
        }
        fs::remove_dir(&dir)?;
        Ok(true)
    }
}

fn to_rel_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn visit_documents(root: &Path, dir: &Path, docs: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            visit_documents(root, &path, docs)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            if let Some(rel) = to_rel_posix(root, &path) {
                docs.push(rel);
            }
        }
    }
    Ok(())
}

fn visit_folders(root: &Path, dir: &Path, folders: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            if let Some(rel) = to_rel_posix(root, &path) {
                folders.push(rel);
            }
            visit_folders(root, &path, folders)?;
        }
    }
    Ok(())
}
