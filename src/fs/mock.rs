use super::{FileSystem, FileType};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub content: Option<Vec<u8>>,
    pub file_type: FileType,
}

/// In-memory file system that also records every `remove_all` call in order.
pub struct MockFileSystem {
    files: RwLock<BTreeMap<PathBuf, MockEntry>>,
    removed: Mutex<Vec<PathBuf>>,
    fail_remove: Mutex<Option<PathBuf>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            removed: Mutex::new(Vec::new()),
            fail_remove: Mutex::new(None),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.write().unwrap();

        if let Some(parent) = path.parent() {
            Self::ensure_parents(&mut files, parent);
        }

        files.insert(
            path,
            MockEntry {
                content: Some(content.as_bytes().to_vec()),
                file_type: FileType::File,
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.files.write().unwrap();
        Self::ensure_parents(&mut files, path.as_ref());
    }

    /// Makes the next `remove_all` of `path` fail.
    pub fn fail_remove_of(&self, path: impl AsRef<Path>) {
        *self.fail_remove.lock().unwrap() = Some(path.as_ref().to_path_buf());
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }

    fn ensure_parents(files: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            files.entry(current.clone()).or_insert(MockEntry {
                content: None,
                file_type: FileType::Directory,
            });
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap()
            .get(path)
            .map(|e| e.file_type == FileType::Directory)
            .unwrap_or(false)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let files = self.files.read().unwrap();
        let entry = files
            .get(path)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))?;

        entry
            .content
            .clone()
            .ok_or_else(|| anyhow!("Not a file: {:?}", path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| anyhow!("File {:?} is not UTF-8: {}", path, e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, "");
        self.files.write().unwrap().insert(
            path.to_path_buf(),
            MockEntry {
                content: Some(contents.to_vec()),
                file_type: FileType::File,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path);
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        self.removed.lock().unwrap().push(path.to_path_buf());

        let mut fail = self.fail_remove.lock().unwrap();
        if fail.as_deref() == Some(path) {
            *fail = None;
            return Err(anyhow!("Failed to remove {:?}", path));
        }

        self.files
            .write()
            .unwrap()
            .retain(|existing, _| !existing.starts_with(path));
        Ok(())
    }

    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .read()
            .unwrap()
            .iter()
            .filter(|(path, entry)| entry.file_type == FileType::File && path.starts_with(root))
            .map(|(path, _)| path.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_creates_parents() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/b/file.txt", "content");

        assert!(fs.is_dir(Path::new("/repo/a")));
        assert!(fs.is_dir(Path::new("/repo/a/b")));
        assert_eq!(
            fs.read_to_string(Path::new("/repo/a/b/file.txt")).unwrap(),
            "content"
        );
    }

    #[test]
    fn test_remove_all_records_order_and_prunes() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/.volumes/data", "x");
        fs.add_file("/repo/keep.txt", "y");

        fs.remove_all(Path::new("/repo/.volumes")).unwrap();
        fs.remove_all(Path::new("/repo/missing")).unwrap();

        assert!(!fs.exists(Path::new("/repo/.volumes/data")));
        assert!(fs.exists(Path::new("/repo/keep.txt")));
        assert_eq!(
            fs.removed(),
            vec![PathBuf::from("/repo/.volumes"), PathBuf::from("/repo/missing")]
        );
    }

    #[test]
    fn test_walk_files_only_returns_files_under_root() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/templates/a.jsonnet", "{}");
        fs.add_file("/repo/templates/sub/b.yaml", "a: 1");
        fs.add_file("/repo/other.txt", "");

        let files = fs.walk_files(Path::new("/repo/templates")).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_fail_remove_is_one_shot() {
        let fs = MockFileSystem::new();
        fs.fail_remove_of("/repo/.volumes");

        assert!(fs.remove_all(Path::new("/repo/.volumes")).is_err());
        assert!(fs.remove_all(Path::new("/repo/.volumes")).is_ok());
    }
}
