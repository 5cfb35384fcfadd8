//! File layout for the disk tier.
//!
//! Each resident entry's value lives in its own file under
//! `<root>/data/<shard>/<file_id>.entry`. A persistent tier also keeps
//! `<root>/index.json`, rewritten on every checkpoint, listing the key and
//! metadata for every live file. Files not listed in the index at open time
//! are leftovers from an unclean shutdown and are removed.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::entry::EntryMeta;

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";
const DATA_DIR: &str = "data";
const INDEX_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum DiskIoError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Entry file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Corrupt index {path}: {source}")]
    CorruptIndex {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported index version {0}")]
    UnsupportedVersion(u32),
}

impl DiskIoError {
    fn io(path: &Path, source: io::Error) -> Self {
        DiskIoError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One live entry as recorded in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord<K> {
    pub key: K,
    pub file_id: u64,
    pub meta: EntryMeta,
}

/// Checkpointed description of a persistent disk tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIndex<K> {
    pub version: u32,
    /// Whether entry files are zstd-framed.
    pub compressed: bool,
    pub next_file_id: u64,
    pub records: Vec<IndexRecord<K>>,
}

impl<K> DiskIndex<K> {
    pub fn new(compressed: bool, next_file_id: u64, records: Vec<IndexRecord<K>>) -> Self {
        Self {
            version: INDEX_VERSION,
            compressed,
            next_file_id,
            records,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DiskIoStats {
    pub total_writes: u64,
    pub total_reads: u64,
    pub total_bytes_written: u64,
    pub total_bytes_read: u64,
}

/// Reads and writes entry files and the index for one disk tier.
#[derive(Debug)]
pub struct DiskIoEngine {
    root: PathBuf,
    stats: DiskIoStats,
}

impl DiskIoEngine {
    /// Open the tier directory, creating it if needed.
    pub fn open(root: PathBuf) -> Result<Self, DiskIoError> {
        fs::create_dir_all(root.join(DATA_DIR)).map_err(|e| DiskIoError::io(&root, e))?;
        Ok(Self {
            root,
            stats: DiskIoStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level layout to avoid too many files in one directory.
    /// file_id 12345 → data/12/12345.entry
    fn entry_path(&self, file_id: u64) -> PathBuf {
        let shard = file_id / 1000;
        self.root
            .join(DATA_DIR)
            .join(format!("{shard}"))
            .join(format!("{file_id}.entry"))
    }

    pub fn write_entry(&mut self, file_id: u64, data: &[u8]) -> Result<PathBuf, DiskIoError> {
        let path = self.entry_path(file_id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DiskIoError::io(parent, e))?;
        }
        fs::write(&path, data).map_err(|e| DiskIoError::io(&path, e))?;

        debug!(file_id, path = %path.display(), size = data.len(), "Wrote entry to disk");

        self.stats.total_writes += 1;
        self.stats.total_bytes_written += data.len() as u64;
        Ok(path)
    }

    pub fn read_entry(&mut self, file_id: u64) -> Result<Vec<u8>, DiskIoError> {
        let path = self.entry_path(file_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DiskIoError::FileNotFound(path));
            }
            Err(e) => return Err(DiskIoError::io(&path, e)),
        };

        debug!(file_id, path = %path.display(), size = data.len(), "Read entry from disk");

        self.stats.total_reads += 1;
        self.stats.total_bytes_read += data.len() as u64;
        Ok(data)
    }

    /// Delete an entry file. Missing files are not an error.
    pub fn delete_entry(&self, file_id: u64) -> Result<(), DiskIoError> {
        let path = self.entry_path(file_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file_id, path = %path.display(), "Deleted entry file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DiskIoError::io(&path, e)),
        }
    }

    pub fn entry_exists(&self, file_id: u64) -> bool {
        self.entry_path(file_id).is_file()
    }

    /// Atomically replace the index (write to a temp file, then rename).
    pub fn write_index<K: Serialize>(&self, index: &DiskIndex<K>) -> Result<(), DiskIoError> {
        let tmp = self.root.join(INDEX_TMP_FILE);
        let path = self.root.join(INDEX_FILE);

        let data = serde_json::to_vec(index).map_err(|source| DiskIoError::CorruptIndex {
            path: tmp.clone(),
            source,
        })?;
        let mut file = fs::File::create(&tmp).map_err(|e| DiskIoError::io(&tmp, e))?;
        file.write_all(&data).map_err(|e| DiskIoError::io(&tmp, e))?;
        file.sync_all().map_err(|e| DiskIoError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| DiskIoError::io(&path, e))?;

        debug!(path = %path.display(), records = index.records.len(), "Wrote disk index");
        Ok(())
    }

    /// Load the index, if one was checkpointed.
    pub fn read_index<K: DeserializeOwned>(&self) -> Result<Option<DiskIndex<K>>, DiskIoError> {
        let path = self.root.join(INDEX_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DiskIoError::io(&path, e)),
        };
        let index: DiskIndex<K> = serde_json::from_slice(&data)
            .map_err(|source| DiskIoError::CorruptIndex { path, source })?;
        if index.version != INDEX_VERSION {
            return Err(DiskIoError::UnsupportedVersion(index.version));
        }
        Ok(Some(index))
    }

    /// Remove every entry file whose id is not in `live`. Returns the number removed.
    pub fn remove_orphans(&self, live: &HashSet<u64>) -> Result<usize, DiskIoError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok());
            match id {
                Some(id) if live.contains(&id) => {}
                _ => {
                    fs::remove_file(&path).map_err(|e| DiskIoError::io(&path, e))?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            warn!(removed, root = %self.root.display(), "Removed unindexed entry files");
        }
        Ok(removed)
    }

    /// Delete all entry files and the index.
    pub fn wipe(&self) -> Result<(), DiskIoError> {
        let data = self.root.join(DATA_DIR);
        if data.exists() {
            fs::remove_dir_all(&data).map_err(|e| DiskIoError::io(&data, e))?;
        }
        fs::create_dir_all(&data).map_err(|e| DiskIoError::io(&data, e))?;
        for name in [INDEX_FILE, INDEX_TMP_FILE] {
            let path = self.root.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(DiskIoError::io(&path, e)),
            }
        }
        debug!(root = %self.root.display(), "Wiped disk tier");
        Ok(())
    }

    /// Total bytes held in entry files.
    pub fn disk_usage(&self) -> Result<u64, DiskIoError> {
        let mut total = 0u64;
        for path in self.entry_files()? {
            let meta = fs::metadata(&path).map_err(|e| DiskIoError::io(&path, e))?;
            total += meta.len();
        }
        Ok(total)
    }

    pub fn stats(&self) -> &DiskIoStats {
        &self.stats
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, DiskIoError> {
        let data = self.root.join(DATA_DIR);
        let mut files = Vec::new();
        let shards = fs::read_dir(&data).map_err(|e| DiskIoError::io(&data, e))?;
        for shard in shards {
            let shard = shard.map_err(|e| DiskIoError::io(&data, e))?.path();
            if !shard.is_dir() {
                continue;
            }
            // Recurse one level (our shard dirs).
            let entries = fs::read_dir(&shard).map_err(|e| DiskIoError::io(&shard, e))?;
            for entry in entries {
                let path = entry.map_err(|e| DiskIoError::io(&shard, e))?.path();
                if path.is_file() {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}
