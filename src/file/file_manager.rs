use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{FileError, FileResult};
use super::{BLOCK_SIZE, BlockIndex, MAX_OPEN_FILES};

/// Block-granular access to the files of one data directory.
///
/// Files are addressed by name relative to the root directory and opened
/// lazily; when more than `max_open_files` handles would be open, an
/// arbitrary one is synced and closed (it is reopened on demand).
pub struct PagedFileManager {
    /// Directory holding every file of the database
    root: PathBuf,
    /// Open handles keyed by file name
    open_files: HashMap<String, File>,
    /// Maximum number of open files
    max_open_files: usize,
}

impl PagedFileManager {
    /// Create a file manager rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> FileResult<Self> {
        Self::with_max_files(root, MAX_OPEN_FILES)
    }

    /// Create a file manager with a specific open-file limit
    pub fn with_max_files<P: AsRef<Path>>(root: P, max_open_files: usize) -> FileResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            open_files: HashMap::new(),
            max_open_files: max_open_files.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a named file
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    /// Create a new empty file
    pub fn create_file(&mut self, name: &str) -> FileResult<()> {
        let path = self.path_of(name);

        if path.exists() {
            return Err(FileError::FileAlreadyExists(name.to_string()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        File::create(&path)?;
        debug!(file = name, "created file");
        Ok(())
    }

    /// Remove (delete) a file, closing it first if open
    pub fn remove_file(&mut self, name: &str) -> FileResult<()> {
        self.open_files.remove(name);

        let path = self.path_of(name);
        if !path.exists() {
            return Err(FileError::FileNotFound(name.to_string()));
        }

        std::fs::remove_file(path)?;
        debug!(file = name, "removed file");
        Ok(())
    }

    /// Read a block; bytes past the end of the file read as zeros
    pub fn read_block(
        &mut self,
        name: &str,
        index: BlockIndex,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        check_block_size(buffer.len())?;

        let file = self.handle(name)?;
        let offset = index as u64 * BLOCK_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = file.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer[filled..].fill(0);

        Ok(())
    }

    /// Write a whole block, extending the file if necessary
    pub fn write_block(&mut self, name: &str, index: BlockIndex, buffer: &[u8]) -> FileResult<()> {
        check_block_size(buffer.len())?;

        let file = self.handle(name)?;
        let offset = index as u64 * BLOCK_SIZE as u64;
        let required_size = offset + BLOCK_SIZE as u64;

        if file.metadata()?.len() < required_size {
            file.set_len(required_size)?;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buffer)?;
        // No sync here; flush_all on the buffer manager syncs in one pass
        Ok(())
    }

    /// Number of whole or partial blocks currently on disk
    pub fn block_count(&mut self, name: &str) -> FileResult<u32> {
        let file = self.handle(name)?;
        let size = file.metadata()?.len();
        Ok(size.div_ceil(BLOCK_SIZE as u64) as u32)
    }

    /// Sync all open files to disk
    pub fn sync_all(&mut self) -> FileResult<()> {
        for file in self.open_files.values_mut() {
            file.sync_data()?;
        }
        Ok(())
    }

    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }

    fn handle(&mut self, name: &str) -> FileResult<&mut File> {
        if !self.open_files.contains_key(name) {
            let path = self.path_of(name);
            if !path.is_file() {
                return Err(FileError::FileNotFound(name.to_string()));
            }

            if self.open_files.len() >= self.max_open_files {
                self.close_any()?;
            }

            let file = OpenOptions::new().read(true).write(true).open(&path)?;
            self.open_files.insert(name.to_string(), file);
        }

        self.open_files
            .get_mut(name)
            .ok_or_else(|| FileError::FileNotFound(name.to_string()))
    }

    fn close_any(&mut self) -> FileResult<()> {
        let victim = self.open_files.keys().next().cloned();
        if let Some(victim) = victim
            && let Some(file) = self.open_files.remove(&victim)
        {
            file.sync_data()?;
        }
        Ok(())
    }
}

fn check_block_size(actual: usize) -> FileResult<()> {
    if actual != BLOCK_SIZE {
        return Err(FileError::InvalidBlockSize {
            expected: BLOCK_SIZE,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, PagedFileManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = PagedFileManager::new(temp_dir.path()).unwrap();
        (temp_dir, manager)
    }

    #[test]
    fn test_create_file() {
        let (temp_dir, mut manager) = setup_test_dir();

        assert!(manager.create_file("test.db").is_ok());
        assert!(temp_dir.path().join("test.db").exists());
        assert!(manager.exists("test.db"));
    }

    #[test]
    fn test_create_file_already_exists() {
        let (_temp_dir, mut manager) = setup_test_dir();

        manager.create_file("test.db").unwrap();
        let result = manager.create_file("test.db");
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let (_temp_dir, mut manager) = setup_test_dir();

        let mut buffer = vec![0u8; BLOCK_SIZE];
        let result = manager.read_block("nonexistent.db", 0, &mut buffer);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_read_write_block() {
        let (_temp_dir, mut manager) = setup_test_dir();
        manager.create_file("test.db").unwrap();

        let mut write_buffer = vec![0u8; BLOCK_SIZE];
        write_buffer[0] = 42;
        write_buffer[100] = 99;
        write_buffer[BLOCK_SIZE - 1] = 255;
        manager.write_block("test.db", 0, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; BLOCK_SIZE];
        manager.read_block("test.db", 0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_read_past_end_is_zero_filled() {
        let (_temp_dir, mut manager) = setup_test_dir();
        manager.create_file("test.db").unwrap();

        let mut buffer = vec![7u8; BLOCK_SIZE];
        manager.read_block("test.db", 100, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_block_count() {
        let (_temp_dir, mut manager) = setup_test_dir();
        manager.create_file("test.db").unwrap();
        assert_eq!(manager.block_count("test.db").unwrap(), 0);

        let buffer = vec![0u8; BLOCK_SIZE];
        manager.write_block("test.db", 0, &buffer).unwrap();
        assert_eq!(manager.block_count("test.db").unwrap(), 1);

        manager.write_block("test.db", 5, &buffer).unwrap();
        assert_eq!(manager.block_count("test.db").unwrap(), 6);
    }

    #[test]
    fn test_remove_open_file() {
        let (temp_dir, mut manager) = setup_test_dir();
        manager.create_file("test.db").unwrap();
        manager
            .write_block("test.db", 0, &vec![1u8; BLOCK_SIZE])
            .unwrap();
        assert_eq!(manager.open_file_count(), 1);

        manager.remove_file("test.db").unwrap();
        assert!(!temp_dir.path().join("test.db").exists());
        assert_eq!(manager.open_file_count(), 0);

        let result = manager.remove_file("test.db");
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp_dir, mut manager) = setup_test_dir();
        manager.create_file("test.db").unwrap();

        let mut small_buffer = vec![0u8; BLOCK_SIZE - 1];
        let result = manager.read_block("test.db", 0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidBlockSize { .. })));

        let large_buffer = vec![0u8; BLOCK_SIZE + 1];
        let result = manager.write_block("test.db", 0, &large_buffer);
        assert!(matches!(result, Err(FileError::InvalidBlockSize { .. })));
    }

    #[test]
    fn test_open_file_limit_recycles_handles() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::with_max_files(temp_dir.path(), 2).unwrap();

        let mut block = vec![0u8; BLOCK_SIZE];
        for (i, name) in ["a.db", "b.db", "c.db"].iter().enumerate() {
            manager.create_file(name).unwrap();
            block[0] = i as u8 + 1;
            manager.write_block(name, 0, &block).unwrap();
        }
        assert_eq!(manager.open_file_count(), 2);

        for (i, name) in ["a.db", "b.db", "c.db"].iter().enumerate() {
            manager.read_block(name, 0, &mut block).unwrap();
            assert_eq!(block[0], i as u8 + 1);
        }
    }
}
