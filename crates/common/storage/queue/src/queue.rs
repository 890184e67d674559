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

//! Public queue handle and lifecycle management.
//!
//! The [`Queue`] is the entry point of the library. Opening it:
//! - validates the configuration and creates the data directory
//! - loads persisted metadata (a missing file means an empty queue)
//! - spawns the io thread that owns every file and cursor
//!
//! ## Usage
//!
//! ```no_run
//! use diskq_queue::QueueBuilder;
//!
//! let queue = QueueBuilder::new("/path/to/data").name("jobs").open()?;
//!
//! queue.push("hello")?;
//! let msg = queue.pop().recv().unwrap();
//! assert_eq!(&msg[..], b"hello");
//!
//! queue.close()?;
//! # Ok::<(), diskq_queue::QueueError>(())
//! ```

use std::{
    fs,
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::RwLock;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{info, warn};

use crate::{
    QueueConfig, QueueStats, Result,
    actor::{ActorChannels, QueueActor},
    error::{ActorPanickedSnafu, CreateDirSnafu, ExitedSnafu, SpawnActorSnafu},
    message::{ExitMode, Reply, WriteRequest},
    meta::MetaStore,
    path::meta_path,
    segment::SegmentLog,
    stats::Counters,
};

/// A persistent FIFO queue of byte messages.
///
/// Any number of threads may push and pop concurrently through a shared
/// reference. Messages are delivered exactly once within a process lifetime;
/// after a crash, messages read since the last sync may be delivered again.
pub struct Queue {
    config:   Arc<QueueConfig>,
    counters: Arc<Counters>,
    write_tx: Sender<WriteRequest>,
    clear_tx: Sender<Reply>,
    exit_tx:  Sender<ExitMode>,
    pop_rx:   Receiver<Bytes>,
    /// Join handle of the io thread, `None` once the queue has exited.
    ///
    /// Pushes hold the read guard for their whole round trip; clear and exit
    /// take the write guard, so an exit never overtakes an in-flight push.
    io:       RwLock<Option<JoinHandle<Result<()>>>>,
}

impl Queue {
    pub(crate) fn open(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_path).context(CreateDirSnafu {
            path: &config.data_path,
        })?;

        let config = Arc::new(config);
        let meta = MetaStore::new(meta_path(&config.data_path, &config.name));
        let state = meta.load()?.unwrap_or_default();
        let counters = Arc::new(Counters::default());
        let log = SegmentLog::new(config.clone(), meta, state, counters.clone());

        info!(
            name = %config.name,
            path = ?config.data_path,
            depth = log.length(),
            read = %log.read_position(),
            write = %log.write_position(),
            "Opening queue"
        );

        let (write_tx, write_rx) = unbounded();
        let (clear_tx, clear_rx) = unbounded();
        let (exit_tx, exit_rx) = bounded(1);
        let (pop_tx, pop_rx) = bounded(0);

        let actor = QueueActor::new(
            log,
            ActorChannels {
                write_rx,
                clear_rx,
                exit_rx,
                pop_tx,
            },
            counters.clone(),
        );
        let io = thread::Builder::new()
            .name(format!("diskq-{}-io", config.name))
            .spawn(move || actor.run())
            .context(SpawnActorSnafu)?;

        Ok(Self {
            config,
            counters,
            write_tx,
            clear_tx,
            exit_tx,
            pop_rx,
            io: RwLock::new(Some(io)),
        })
    }

    /// Appends a message, blocking until it has been written to the current
    /// segment.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Exited`](crate::QueueError::Exited) after the
    /// queue was closed, `InvalidMessageSize` when the payload is outside the
    /// configured bounds, or the I/O error hit while appending.
    pub fn push(&self, data: impl Into<Bytes>) -> Result<()> {
        let io = self.io.read();
        ensure!(io.is_some(), ExitedSnafu { name: self.name() });

        let (reply, reply_rx) = bounded(1);
        self.write_tx
            .send(WriteRequest {
                data: data.into(),
                reply,
            })
            .ok()
            .context(ExitedSnafu { name: self.name() })?;
        reply_rx
            .recv()
            .ok()
            .context(ExitedSnafu { name: self.name() })?
    }

    /// Returns the delivery channel.
    ///
    /// Every message is handed to exactly one receiver. The channel
    /// disconnects once the queue has exited.
    #[must_use]
    pub fn pop(&self) -> Receiver<Bytes> { self.pop_rx.clone() }

    /// Discards every message and segment, including the metadata file.
    ///
    /// # Errors
    ///
    /// Returns `Exited` after close, or the first removal failure. Cursors
    /// and depth are reset even when a removal fails.
    pub fn clear(&self) -> Result<()> {
        let io = self.io.write();
        ensure!(io.is_some(), ExitedSnafu { name: self.name() });

        let (reply, reply_rx) = bounded(1);
        self.clear_tx
            .send(reply)
            .ok()
            .context(ExitedSnafu { name: self.name() })?;
        reply_rx
            .recv()
            .ok()
            .context(ExitedSnafu { name: self.name() })?
    }

    /// Stops the io thread after a final fsync and metadata write.
    ///
    /// # Errors
    ///
    /// Returns `Exited` if the queue already exited, otherwise the outcome of
    /// the final sync.
    pub fn close(&self) -> Result<()> { self.exit(ExitMode::Close) }

    /// Stops the io thread and removes every segment and the metadata file.
    ///
    /// # Errors
    ///
    /// Returns `Exited` if the queue already exited, otherwise the first
    /// removal failure.
    pub fn delete_and_exit(&self) -> Result<()> { self.exit(ExitMode::Delete) }

    fn exit(&self, mode: ExitMode) -> Result<()> {
        let mut io = self.io.write();
        let handle = io.take().context(ExitedSnafu { name: self.name() })?;

        info!(name = %self.config.name, ?mode, "Stopping queue");
        // A failed send means the io thread already stopped; the join below
        // reports how.
        let _ = self.exit_tx.send(mode);

        match handle.join() {
            Ok(result) => result,
            Err(_) => ActorPanickedSnafu.fail(),
        }
    }

    /// Number of messages written but not yet delivered.
    #[must_use]
    pub fn len(&self) -> i64 { self.counters.depth.load(Ordering::SeqCst) }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() <= 0 }

    #[must_use]
    pub fn stats(&self) -> QueueStats { self.counters.snapshot() }

    #[must_use]
    pub fn name(&self) -> &str { &self.config.name }

    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if self.io.get_mut().is_none() {
            return;
        }
        match self.exit(ExitMode::Close) {
            Ok(()) => info!(name = %self.config.name, "Queue closed on drop"),
            Err(e) => warn!(name = %self.config.name, error = ?e, "Failed to close queue on drop"),
        }
    }
}
