//! In-memory save store.

use std::collections::HashMap;

use frankendump_platform::save::{SaveContainer, SaveEntry, SaveError, SaveStore};

/// A save store backed by nested maps: container path → file path → bytes.
///
/// `read_cap` optionally caps how many bytes a single read returns, which
/// is how tests provoke short reads without corrupting the seeded data.
#[derive(Default)]
pub struct MemSaveStore {
    containers: HashMap<String, HashMap<String, Vec<u8>>>,
    read_cap: Option<usize>,
}

impl MemSaveStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating its container on demand.
    pub fn insert_file(&mut self, container: &str, path: &str, bytes: Vec<u8>) {
        self.containers
            .entry(container.to_owned())
            .or_default()
            .insert(path.to_owned(), bytes);
    }

    /// Create an empty container without any files.
    pub fn insert_container(&mut self, container: &str) {
        self.containers.entry(container.to_owned()).or_default();
    }

    /// Cap single reads at `cap` bytes (fault injection for short reads).
    pub fn set_read_cap(&mut self, cap: Option<usize>) {
        self.read_cap = cap;
    }
}

struct MemSaveContainer<'a> {
    files: &'a HashMap<String, Vec<u8>>,
    read_cap: Option<usize>,
}

impl SaveContainer for MemSaveContainer<'_> {
    fn lookup(&self, path: &str) -> Result<SaveEntry, SaveError> {
        let bytes = self
            .files
            .get(path)
            .ok_or_else(|| SaveError::EntryNotFound(path.to_owned()))?;
        Ok(SaveEntry {
            path: path.to_owned(),
            size: bytes.len() as u64,
        })
    }

    fn read(&self, entry: &SaveEntry, offset: u64, buf: &mut [u8]) -> Result<usize, SaveError> {
        let bytes = self
            .files
            .get(&entry.path)
            .ok_or_else(|| SaveError::EntryNotFound(entry.path.clone()))?;
        if offset > bytes.len() as u64 {
            return Err(SaveError::OutOfBounds {
                offset,
                size: bytes.len() as u64,
            });
        }
        let available = &bytes[offset as usize..];
        let mut n = available.len().min(buf.len());
        if let Some(cap) = self.read_cap {
            n = n.min(cap);
        }
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl SaveStore for MemSaveStore {
    fn open(&self, container: &str) -> Result<Box<dyn SaveContainer + '_>, SaveError> {
        let files = self
            .containers
            .get(container)
            .ok_or_else(|| SaveError::ContainerUnavailable(container.to_owned()))?;
        Ok(Box::new(MemSaveContainer {
            files,
            read_cap: self.read_cap,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_read() {
        let mut store = MemSaveStore::new();
        store.insert_file("sys:/save/test", "/a", vec![1, 2, 3, 4]);
        let container = store.open("sys:/save/test").unwrap();
        let entry = container.lookup("/a").unwrap();
        assert_eq!(entry.size, 4);
        let mut buf = [0u8; 4];
        assert_eq!(container.read(&entry, 0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        let mut tail = [0u8; 4];
        assert_eq!(container.read(&entry, 2, &mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], &[3, 4]);
    }

    #[test]
    fn test_missing_container_and_entry() {
        let mut store = MemSaveStore::new();
        store.insert_container("sys:/save/test");
        assert!(matches!(
            store.open("sys:/save/other"),
            Err(SaveError::ContainerUnavailable(_))
        ));
        let container = store.open("sys:/save/test").unwrap();
        assert!(matches!(
            container.lookup("/missing"),
            Err(SaveError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_read_cap_limits_reads() {
        let mut store = MemSaveStore::new();
        store.insert_file("sys:/save/test", "/a", vec![9; 100]);
        store.set_read_cap(Some(10));
        let container = store.open("sys:/save/test").unwrap();
        let entry = container.lookup("/a").unwrap();
        let mut buf = [0u8; 100];
        assert_eq!(container.read(&entry, 0, &mut buf).unwrap(), 10);
    }
}
