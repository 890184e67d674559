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

//! Segment file I/O and cursor bookkeeping.
//!
//! [`SegmentLog`] owns the read and write handles, the committed read cursor,
//! the look-ahead cursor, the write cursor and the metadata store. It is
//! driven exclusively by the io loop in [`crate::actor`], so none of its state
//! needs locking; only the depth counter is shared (atomically) with the
//! handle.
//!
//! ## Rolling
//!
//! A segment is rolled once an append leaves its write offset above
//! `max_bytes_per_file`. Readers apply the same rule to the look-ahead cursor,
//! so both sides agree on segment boundaries without an index. The limit is
//! not recorded in the segments themselves: reopening a queue with a different
//! `max_bytes_per_file` shifts the roll point of segments that are still
//! unread, so keep it fixed for the lifetime of a data directory.
//!
//! ## Corruption
//!
//! A frame that cannot be decoded poisons the rest of its segment: there is no
//! reliable way to find the next frame boundary. The segment is renamed with a
//! `.bad` suffix and reading resumes at the start of the next one.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, atomic::Ordering},
};

use bytes::{Bytes, BytesMut};
use snafu::{ResultExt, ensure};
use tracing::{debug, error, info};

use crate::{
    QueueConfig, Result,
    error::{
        InvalidMessageSizeSnafu, OpenSegmentSnafu, RemoveFileSnafu, SyncSegmentSnafu,
        WriteSegmentSnafu,
    },
    frame,
    meta::{MetaStore, Metadata, Position},
    path::{bad_path, segment_path},
    stats::Counters,
};

/// Write handle positioned at the write cursor.
struct SegmentWriter {
    file: File,
    path: PathBuf,
}

pub(crate) struct SegmentLog {
    config:     Arc<QueueConfig>,
    meta:       MetaStore,
    counters:   Arc<Counters>,
    /// Committed read cursor; data before it has been delivered.
    read:       Position,
    /// Position after the staged frame, committed on delivery.
    next_read:  Position,
    /// Next append location.
    write:      Position,
    /// Read handle positioned at the committed read cursor.
    reader:     Option<BufReader<File>>,
    writer:     Option<SegmentWriter>,
    /// Reusable frame encoding buffer.
    write_buf:  BytesMut,
    need_sync:  bool,
}

impl SegmentLog {
    /// Creates the log from persisted (or default) metadata.
    ///
    /// Inconsistent cursors found on disk are healed here the same way the
    /// tail check heals them at run time.
    pub fn new(
        config: Arc<QueueConfig>,
        meta: MetaStore,
        state: Metadata,
        counters: Arc<Counters>,
    ) -> Self {
        counters.depth.store(state.length, Ordering::SeqCst);
        let mut log = Self {
            config,
            meta,
            counters,
            read: state.read,
            next_read: state.read,
            write: state.write,
            reader: None,
            writer: None,
            write_buf: BytesMut::new(),
            need_sync: false,
        };

        if log.read > log.write {
            error!(
                name = %log.config.name,
                read = %log.read,
                write = %log.write,
                "Read cursor is ahead of write cursor, skipping to a fresh segment"
            );
            log.heal_cursors();
            log.counters.tail_resets.fetch_add(1, Ordering::Relaxed);
        } else if state.length < 0 || (log.read == log.write && state.length != 0) {
            error!(
                name = %log.config.name,
                length = state.length,
                "Persisted depth disagrees with cursors, resetting to 0"
            );
            log.counters.depth.store(0, Ordering::SeqCst);
            log.counters.tail_resets.fetch_add(1, Ordering::Relaxed);
            log.need_sync = true;
        }

        log
    }

    pub fn config(&self) -> &QueueConfig { &self.config }

    pub fn read_position(&self) -> Position { self.read }

    #[cfg(test)]
    pub fn next_read_position(&self) -> Position { self.next_read }

    pub fn write_position(&self) -> Position { self.write }

    pub fn length(&self) -> i64 { self.counters.depth.load(Ordering::SeqCst) }

    /// Whether frames exist between the read and the write cursor.
    pub fn has_unread(&self) -> bool { self.read < self.write }

    pub fn request_sync(&mut self) { self.need_sync = true; }

    pub fn sync_requested(&self) -> bool { self.need_sync }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            length: self.length(),
            read:   self.read,
            write:  self.write,
        }
    }

    fn segment_path(&self, file_num: u64) -> PathBuf {
        segment_path(&self.config.data_path, &self.config.name, file_num)
    }

    /// Reads the frame at the committed read cursor and stages the position
    /// after it as the look-ahead cursor.
    ///
    /// The read cursor itself only moves in [`Self::move_forward`], once the
    /// frame has been handed to a consumer. Any error closes the read handle.
    pub fn read_one(&mut self) -> Result<Bytes> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                let path = self.segment_path(self.read.file_num);
                BufReader::new(open_at(&path, self.read.offset, false)?)
            }
        };

        let data = frame::decode(
            &mut reader,
            self.config.min_msg_size,
            self.config.max_msg_size,
        )?;

        let mut next = Position::new(
            self.read.file_num,
            self.read.offset + frame::frame_disk_size(data.len()),
        );

        if next.offset > self.config.max_bytes_per_file {
            next = next.next_file();
        } else {
            self.reader = Some(reader);
        }
        self.next_read = next;

        Ok(data)
    }

    /// Quarantines the segment at the read cursor after a failed read.
    ///
    /// The read cursor moves to the next segment. If the writer was still
    /// appending to the abandoned segment it moves on as well, so nothing is
    /// ever written after the damaged frame.
    pub fn handle_read_error(&mut self) {
        self.reader = None;

        if self.read.file_num == self.write.file_num {
            self.writer = None;
            self.write = self.write.next_file();
        }

        let bad = self.segment_path(self.read.file_num);
        let quarantine = bad_path(&bad);
        match fs::rename(&bad, &quarantine) {
            Ok(()) => info!(name = %self.config.name, path = ?quarantine, "Quarantined corrupt segment"),
            Err(e) => error!(name = %self.config.name, path = ?bad, error = ?e, "Failed to rename corrupt segment"),
        }

        self.read = self.read.next_file();
        self.next_read = self.read;
        self.need_sync = true;
        self.check_tail_corruption(self.length());
    }

    /// Appends one frame at the write cursor, rolling the segment if the
    /// write offset ends up above `max_bytes_per_file`.
    pub fn write_one(&mut self, data: &[u8]) -> Result<()> {
        let min = self.config.min_msg_size;
        let max = self.config.max_msg_size;
        let size = data.len();
        ensure!(
            size >= min as usize && size <= max as usize,
            InvalidMessageSizeSnafu { size, min, max }
        );

        let mut segment = match self.writer.take() {
            Some(segment) => segment,
            None => {
                let path = self.segment_path(self.write.file_num);
                let file = open_at(&path, self.write.offset, true)?;
                SegmentWriter { file, path }
            }
        };

        self.write_buf.clear();
        frame::encode(data, &mut self.write_buf);
        segment
            .file
            .write_all(&self.write_buf)
            .context(WriteSegmentSnafu {
                path: &segment.path,
            })?;

        self.write.offset += frame::frame_disk_size(size);
        self.counters.depth.fetch_add(1, Ordering::SeqCst);
        self.writer = Some(segment);

        if self.write.offset > self.config.max_bytes_per_file {
            let finished = self.write.file_num;
            self.write = self.write.next_file();
            debug!(name = %self.config.name, finished, next = self.write.file_num, "Rolled write segment");

            // The frame is on disk; a failed sync is retried on the next trigger.
            if let Err(e) = self.sync() {
                error!(name = %self.config.name, error = ?e, "Failed to sync after rolling segment");
            }
            self.writer = None;
        }

        Ok(())
    }

    /// Commits the staged look-ahead cursor after a delivery.
    ///
    /// Returns `true` when the tail check had to reset state.
    pub fn move_forward(&mut self) -> bool {
        let old_file = self.read.file_num;
        self.read = self.next_read;
        let length = self.counters.depth.fetch_sub(1, Ordering::SeqCst) - 1;

        if old_file != self.read.file_num {
            self.need_sync = true;

            let path = self.segment_path(old_file);
            match fs::remove_file(&path) {
                Ok(()) => debug!(name = %self.config.name, path = ?path, "Removed consumed segment"),
                Err(e) => error!(name = %self.config.name, path = ?path, error = ?e, "Failed to remove consumed segment"),
            }
        }

        self.check_tail_corruption(length)
    }

    /// Verifies that an exhausted queue also reports zero depth.
    fn check_tail_corruption(&mut self, length: i64) -> bool {
        if self.read < self.write {
            return false;
        }

        let mut reset = false;
        if length != 0 {
            error!(name = %self.config.name, length, "Depth is not 0 at the tail, resetting to 0");
            self.counters.depth.store(0, Ordering::SeqCst);
            self.need_sync = true;
            reset = true;
        }

        if self.read != self.write {
            error!(
                name = %self.config.name,
                read = %self.read,
                write = %self.write,
                "Read cursor passed write cursor, skipping to a fresh segment"
            );
            self.heal_cursors();
            reset = true;
        }

        if reset {
            self.counters.tail_resets.fetch_add(1, Ordering::Relaxed);
        }
        reset
    }

    fn heal_cursors(&mut self) {
        if let Err(e) = self.skip_to_next_rw_file() {
            error!(name = %self.config.name, error = ?e, "Failed to remove segments while skipping");
        }
        self.need_sync = true;
    }

    /// Drops every segment between the cursors and restarts both cursors at
    /// the start of a fresh segment with zero depth.
    ///
    /// All removals are attempted; the last failure is returned.
    pub fn skip_to_next_rw_file(&mut self) -> Result<()> {
        self.reader = None;
        self.writer = None;

        let first = self.read.file_num.min(self.write.file_num);
        let last = self.read.file_num.max(self.write.file_num);

        let mut result = Ok(());
        for file_num in first..=last {
            let path = self.segment_path(file_num);
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != io::ErrorKind::NotFound
            {
                error!(name = %self.config.name, path = ?path, error = ?e, "Failed to remove segment");
                result = Err(e).context(RemoveFileSnafu { path });
            }
        }

        let fresh = Position::new(last + 1, 0);
        self.read = fresh;
        self.next_read = fresh;
        self.write = fresh;
        self.counters.depth.store(0, Ordering::SeqCst);

        result
    }

    /// Removes every segment and the metadata file.
    ///
    /// Cursors end up at a fresh segment with zero depth even when a removal
    /// fails.
    pub fn delete_all_files(&mut self) -> Result<()> {
        let skipped = self.skip_to_next_rw_file();

        if let Err(e) = self.meta.remove() {
            error!(name = %self.config.name, path = ?self.meta.path(), error = ?e, "Failed to remove metadata file");
            return Err(e).context(RemoveFileSnafu {
                path: self.meta.path(),
            });
        }

        skipped
    }

    /// Fsyncs the write segment and persists metadata.
    ///
    /// A failed fsync drops the write handle so the next append reopens the
    /// segment cleanly.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(segment) = self.writer.as_ref()
            && let Err(e) = segment.file.sync_all()
        {
            let path = segment.path.clone();
            self.writer = None;
            return Err(e).context(SyncSegmentSnafu { path });
        }

        self.meta.store(&self.metadata())?;
        self.need_sync = false;
        Ok(())
    }

    /// Releases both file handles.
    pub fn close_files(&mut self) {
        self.reader = None;
        self.writer = None;
    }
}

/// Opens a segment and positions it at `offset`.
fn open_at(path: &Path, offset: u64, create: bool) -> Result<File> {
    let mut file = if create {
        OpenOptions::new().write(true).create(true).truncate(false).open(path)
    } else {
        File::open(path)
    }
    .context(OpenSegmentSnafu { path })?;

    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .context(OpenSegmentSnafu { path })?;
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::{QueueError, path::meta_path};

    struct LogFixture {
        temp_dir: TempDir,
        log:      SegmentLog,
    }

    impl LogFixture {
        fn new(max_bytes_per_file: u64) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let config = Arc::new(QueueConfig {
                name: "test".to_string(),
                data_path: temp_dir.path().to_path_buf(),
                max_bytes_per_file,
                min_msg_size: 1,
                max_msg_size: 64,
                ..Default::default()
            });
            let meta = MetaStore::new(meta_path(temp_dir.path(), "test"));
            let log = SegmentLog::new(config, meta, Metadata::default(), Arc::default());
            Self { temp_dir, log }
        }

        fn segment(&self, file_num: u64) -> PathBuf {
            segment_path(self.temp_dir.path(), "test", file_num)
        }

        fn read_and_commit(&mut self) -> Bytes {
            let data = self.log.read_one().unwrap();
            self.log.move_forward();
            data
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut fixture = LogFixture::new(1024);
        fixture.log.write_one(b"hello").unwrap();
        fixture.log.write_one(b"world").unwrap();

        assert_eq!(fixture.log.write_position(), Position::new(0, 18));
        assert_eq!(fixture.log.length(), 2);
        assert!(fixture.log.has_unread());

        let data = fixture.log.read_one().unwrap();
        assert_eq!(data, Bytes::from("hello"));
        assert_eq!(fixture.log.read_position(), Position::new(0, 0));
        assert_eq!(fixture.log.next_read_position(), Position::new(0, 9));

        fixture.log.move_forward();
        assert_eq!(fixture.log.read_position(), Position::new(0, 9));
        assert_eq!(fixture.log.length(), 1);

        assert_eq!(fixture.read_and_commit(), Bytes::from("world"));
        assert!(!fixture.log.has_unread());
        assert_eq!(fixture.log.length(), 0);
    }

    #[test_case(0 ; "empty payload below min")]
    #[test_case(65 ; "payload above max")]
    fn test_write_rejects_size(size: usize) {
        let mut fixture = LogFixture::new(1024);
        let err = fixture.log.write_one(&vec![1u8; size]).unwrap_err();
        assert!(matches!(err, QueueError::InvalidMessageSize { min: 1, max: 64, .. }));
        assert_eq!(fixture.log.length(), 0);
        assert_eq!(fixture.log.write_position(), Position::default());
    }

    #[test]
    fn test_roll_and_consume_deletes_segment() {
        // Each frame is 14 bytes; the second append crosses 20 and rolls.
        let mut fixture = LogFixture::new(20);
        for i in 0..4 {
            fixture.log.write_one(format!("msg-{i:06}").as_bytes()).unwrap();
        }

        assert_eq!(fixture.log.write_position(), Position::new(2, 0));
        assert!(fixture.segment(0).exists());
        assert!(fixture.segment(1).exists());
        assert!(meta_path(fixture.temp_dir.path(), "test").exists());

        for i in 0..4 {
            assert_eq!(
                fixture.read_and_commit(),
                Bytes::from(format!("msg-{i:06}"))
            );
            if i == 1 {
                assert!(!fixture.segment(0).exists());
            }
        }

        assert!(!fixture.segment(1).exists());
        assert_eq!(fixture.log.read_position(), Position::new(2, 0));
        assert_eq!(fixture.log.length(), 0);
        assert!(fixture.log.sync_requested());
    }

    #[test]
    fn test_corrupt_header_quarantines_segment() {
        let mut fixture = LogFixture::new(1024);
        fixture.log.write_one(b"good").unwrap();
        fixture.log.sync().unwrap();

        // Append a header claiming a 1000-byte payload, above max_msg_size.
        let mut file = OpenOptions::new().append(true).open(fixture.segment(0)).unwrap();
        file.write_all(&1000u32.to_be_bytes()).unwrap();
        drop(file);
        fixture.log.write.offset += 4;
        fixture.log.counters.depth.fetch_add(1, Ordering::SeqCst);

        assert_eq!(fixture.read_and_commit(), Bytes::from("good"));
        let err = fixture.log.read_one().unwrap_err();
        assert!(matches!(err, QueueError::FrameCorrupt { size: 1000, .. }));

        fixture.log.handle_read_error();
        assert!(!fixture.segment(0).exists());
        assert!(bad_path(&fixture.segment(0)).exists());
        assert_eq!(fixture.log.read_position(), Position::new(1, 0));
        assert_eq!(fixture.log.write_position(), Position::new(1, 0));
        assert_eq!(fixture.log.length(), 0);
        assert!(fixture.log.sync_requested());

        fixture.log.write_one(b"after").unwrap();
        assert_eq!(fixture.read_and_commit(), Bytes::from("after"));
    }

    #[test]
    fn test_tail_check_resets_drifted_depth() {
        let mut fixture = LogFixture::new(1024);
        fixture.log.write_one(b"only").unwrap();
        fixture.log.counters.depth.store(5, Ordering::SeqCst);

        let _ = fixture.log.read_one().unwrap();
        assert!(fixture.log.move_forward());
        assert_eq!(fixture.log.length(), 0);
        assert_eq!(fixture.log.counters.tail_resets.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_skip_to_next_rw_file() {
        let mut fixture = LogFixture::new(20);
        for i in 0..3 {
            fixture.log.write_one(format!("msg-{i:06}").as_bytes()).unwrap();
        }
        fixture.log.skip_to_next_rw_file().unwrap();

        assert!(!fixture.segment(0).exists());
        assert!(!fixture.segment(1).exists());
        assert_eq!(fixture.log.read_position(), Position::new(2, 0));
        assert_eq!(fixture.log.write_position(), Position::new(2, 0));
        assert_eq!(fixture.log.length(), 0);
    }

    #[test]
    fn test_delete_all_files_removes_metadata() {
        let mut fixture = LogFixture::new(1024);
        fixture.log.write_one(b"data").unwrap();
        fixture.log.sync().unwrap();
        let meta = meta_path(fixture.temp_dir.path(), "test");
        assert!(meta.exists());

        fixture.log.delete_all_files().unwrap();
        assert!(!meta.exists());
        assert!(!fixture.segment(0).exists());
        assert_eq!(fixture.log.write_position(), Position::new(1, 0));
    }

    #[test]
    fn test_new_heals_read_ahead_of_write() {
        let temp_dir = TempDir::new().unwrap();
        let config = Arc::new(QueueConfig {
            name: "test".to_string(),
            data_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        });
        let meta = MetaStore::new(meta_path(temp_dir.path(), "test"));
        let state = Metadata {
            length: 3,
            read:   Position::new(4, 10),
            write:  Position::new(2, 0),
        };
        let log = SegmentLog::new(config, meta, state, Arc::default());

        assert_eq!(log.read_position(), Position::new(5, 0));
        assert_eq!(log.write_position(), Position::new(5, 0));
        assert_eq!(log.length(), 0);
        assert!(log.sync_requested());
    }
}
