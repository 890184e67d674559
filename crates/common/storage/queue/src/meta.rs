// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Crash-consistent metadata persistence.
//!
//! The metadata file is a short text record:
//!
//! ```text
//! <length>
//! <read_file_num>,<read_pos>
//! <write_file_num>,<write_pos>
//! ```
//!
//! Every store writes a uniquely named temp file in the same directory,
//! fsyncs it and renames it over the canonical path, so a reader never
//! observes a half-written record.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::{
    Result,
    error::{MetadataCorruptSnafu, ReadMetadataSnafu, WriteMetadataSnafu},
    path::temp_meta_path,
};

/// A location inside the segment sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Segment sequence number.
    pub file_num: u64,
    /// Byte offset inside the segment.
    pub offset:   u64,
}

impl Position {
    pub const fn new(file_num: u64, offset: u64) -> Self { Self { file_num, offset } }

    /// Start of the segment after this one.
    pub const fn next_file(self) -> Self { Self::new(self.file_num + 1, 0) }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.file_num, self.offset)
    }
}

/// The persisted queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Number of frames written but not yet delivered.
    pub length: i64,
    /// Committed read cursor.
    pub read:   Position,
    /// Next append location.
    pub write:  Position,
}

impl Metadata {
    fn serialize(&self) -> String { format!("{}\n{}\n{}\n", self.length, self.read, self.write) }

    fn deserialize(path: &Path, text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let length = lines
            .next()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .context(MetadataCorruptSnafu {
                path,
                reason: "missing or malformed length",
            })?;
        let read = lines
            .next()
            .and_then(parse_position)
            .context(MetadataCorruptSnafu {
                path,
                reason: "missing or malformed read position",
            })?;
        let write = lines
            .next()
            .and_then(parse_position)
            .context(MetadataCorruptSnafu {
                path,
                reason: "missing or malformed write position",
            })?;
        Ok(Self {
            length,
            read,
            write,
        })
    }
}

fn parse_position(line: &str) -> Option<Position> {
    let (file_num, offset) = line.trim().split_once(',')?;
    Some(Position::new(
        file_num.trim().parse().ok()?,
        offset.trim().parse().ok()?,
    ))
}

/// Reads and atomically rewrites a queue's metadata file.
#[derive(Debug)]
pub(crate) struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    pub fn new(path: PathBuf) -> Self { Self { path } }

    pub fn path(&self) -> &Path { &self.path }

    /// Loads the metadata record.
    ///
    /// A missing file means a brand-new queue and yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<Metadata>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(ReadMetadataSnafu { path: &self.path }),
        };
        Metadata::deserialize(&self.path, &text).map(Some)
    }

    pub fn store(&self, meta: &Metadata) -> Result<()> {
        let tmp_path = temp_meta_path(&self.path);

        let persisted = write_synced(&tmp_path, meta.serialize().as_bytes())
            .context(WriteMetadataSnafu { path: &tmp_path })
            .and_then(|()| {
                fs::rename(&tmp_path, &self.path).context(WriteMetadataSnafu { path: &self.path })
            });
        if persisted.is_err()
            && let Err(remove_err) = fs::remove_file(&tmp_path)
            && remove_err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = ?tmp_path, error = ?remove_err, "Failed to remove stale metadata temp file");
        }
        persisted?;

        debug!(path = ?self.path, length = meta.length, read = %meta.read, write = %meta.write, "Metadata persisted");
        Ok(())
    }

    /// Removes the metadata file; a missing file is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::{QueueError, path::meta_path};

    fn store_in(temp_dir: &TempDir) -> MetaStore { MetaStore::new(meta_path(temp_dir.path(), "q")) }

    #[test]
    fn test_fresh_start_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(store_in(&temp_dir).load().unwrap().is_none());
    }

    #[test]
    fn test_store_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let meta = Metadata {
            length: 7,
            read:   Position::new(2, 128),
            write:  Position::new(5, 64),
        };
        store.store(&meta).unwrap();

        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "7\n2,128\n5,64\n"
        );
        assert_eq!(store.load().unwrap(), Some(meta));
    }

    #[test]
    fn test_store_overwrites_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        for i in 0..5 {
            store
                .store(&Metadata {
                    length: i,
                    read:   Position::default(),
                    write:  Position::new(0, 10 * i as u64),
                })
                .unwrap();
        }

        assert_eq!(store.load().unwrap().unwrap().length, 4);
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        std::fs::create_dir(store.path()).unwrap();

        assert!(matches!(
            store.store(&Metadata::default()),
            Err(QueueError::WriteMetadata { .. })
        ));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        std::fs::remove_dir(store.path()).unwrap();
        store.store(&Metadata::default()).unwrap();
        assert_eq!(store.load().unwrap(), Some(Metadata::default()));
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let meta = Metadata {
            length: 3,
            read:   Position::new(0, 12),
            write:  Position::new(1, 40),
        };
        store_in(&temp_dir).store(&meta).unwrap();

        assert_eq!(store_in(&temp_dir).load().unwrap(), Some(meta));
    }

    #[test_case("" ; "empty")]
    #[test_case("abc\n0,0\n0,0\n" ; "non numeric length")]
    #[test_case("1\n0;0\n0,0\n" ; "bad read separator")]
    #[test_case("1\n0,0\n" ; "missing write position")]
    #[test_case("1\n0,0\n-1,0\n" ; "negative file number")]
    fn test_corrupt_metadata(text: &str) {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        std::fs::write(store.path(), text).unwrap();

        assert!(matches!(
            store.load(),
            Err(QueueError::MetadataCorrupt { .. })
        ));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.remove().unwrap();
        store.store(&Metadata::default()).unwrap();
        store.remove().unwrap();
        assert!(!store.path().exists());
    }
}
