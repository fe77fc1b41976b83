use std::io;

/// The seam to the host document store. Paths are vault-relative with
/// forward slashes; the root folder is `""`.
pub trait DocumentStore {
    fn exists(&self, path: &str) -> bool;
    /// Read the document's tags from cached metadata, already normalized
    /// to a list.
    fn read_tags(&self, path: &str) -> io::Result<Vec<String>>;
    /// Replace the document's tags through the structured frontmatter
    /// merge primitive. Other frontmatter keys and the body are preserved.
    fn write_tags(&mut self, path: &str, tags: &[String]) -> io::Result<()>;
    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;
    /// Markdown documents in the vault, or under one folder (recursive),
    /// in stable order.
    fn list_documents(&self, folder: Option<&str>) -> io::Result<Vec<String>>;
    fn list_folders(&self) -> io::Result<Vec<String>>;
    /// Remove a folder if it holds nothing but platform junk files.
    /// Returns whether it was removed.
    fn remove_folder_if_empty(&mut self, folder: &str) -> io::Result<bool>;
}

pub fn parent_folder(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
