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

//! Background io loop owning all queue state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  write / clear / exit  ┌──────────────┐   read/write   ┌──────────────┐
//! │    Queue     │ ─────── channels ────► │  QueueActor  │ ─────────────► │ SegmentLog   │
//! │  (callers)   │ ◄────── pop (rdv) ──── │  (bg thread) │                │ + metadata   │
//! └──────────────┘                        └──────────────┘                └──────────────┘
//! ```
//!
//! The actor is the only mutator of cursors and depth. Each iteration it:
//! 1. syncs if `sync_every` operations happened or a sync was requested
//! 2. pre-fetches the next frame when unread data exists and nothing is staged
//! 3. blocks in a [`Select`] over write, clear, exit, the sync ticker and, only
//!    while a frame is staged, a send on the zero-capacity pop channel
//!
//! A staged frame is committed (read cursor advanced, depth decremented) only
//! once a consumer has actually received it.

use std::{
    sync::{Arc, atomic::Ordering},
    time::Instant,
};

use bytes::Bytes;
use crossbeam::channel::{Receiver, Select, SendError, Sender, tick};
use tracing::{debug, error, info};

use crate::{
    Result,
    message::{ExitMode, Reply, WriteRequest},
    segment::SegmentLog,
    stats::Counters,
};

/// Channel endpoints owned by the actor.
pub(crate) struct ActorChannels {
    pub write_rx: Receiver<WriteRequest>,
    pub clear_rx: Receiver<Reply>,
    pub exit_rx:  Receiver<ExitMode>,
    /// Dropped when the actor stops, which disconnects every consumer.
    pub pop_tx:   Sender<Bytes>,
}

pub(crate) struct QueueActor {
    log:      SegmentLog,
    channels: ActorChannels,
    counters: Arc<Counters>,
    /// Frame read ahead of delivery; `log`'s look-ahead cursor points past it.
    staged:   Option<Bytes>,
    /// Reads and writes since the last sync.
    dirty:    u64,
}

impl QueueActor {
    pub fn new(log: SegmentLog, channels: ActorChannels, counters: Arc<Counters>) -> Self {
        Self {
            log,
            channels,
            counters,
            staged: None,
            dirty: 0,
        }
    }

    /// Runs until an exit request arrives or every handle is gone.
    ///
    /// Returns the outcome of the final sync (or deletion), which the handle
    /// collects when joining the thread.
    pub fn run(mut self) -> Result<()> {
        let name = self.log.config().name.clone();
        info!(%name, read = %self.log.read_position(), write = %self.log.write_position(), "Queue io loop starting");

        let ticker = tick(self.log.config().sync_timeout);
        let sync_every = self.log.config().sync_every;

        let mode = loop {
            if self.dirty >= sync_every {
                self.log.request_sync();
            }

            if self.log.sync_requested() {
                if let Err(e) = self.log.sync() {
                    error!(%name, error = ?e, "Failed to sync queue");
                }
                self.dirty = 0;
            }

            if self.staged.is_none() && self.log.has_unread() {
                match self.log.read_one() {
                    Ok(data) => self.staged = Some(data),
                    Err(e) => {
                        error!(%name, read = %self.log.read_position(), error = ?e, "Failed to read frame, skipping segment");
                        self.counters
                            .corruptions_recovered
                            .fetch_add(1, Ordering::Relaxed);
                        self.log.handle_read_error();
                        continue;
                    }
                }
            }

            if let Some(mode) = self.step(&ticker) {
                break mode;
            }
        };

        let result = match mode {
            ExitMode::Close => self.log.sync(),
            ExitMode::Delete => self.log.delete_all_files(),
        };
        self.log.close_files();

        match &result {
            Ok(()) => info!(%name, ?mode, read = %self.log.read_position(), write = %self.log.write_position(), "Queue io loop stopped"),
            Err(e) => error!(%name, ?mode, error = ?e, "Queue io loop stopped with error"),
        }
        result
    }

    /// Waits for one event and handles it. Returns the exit mode when the
    /// loop should stop.
    fn step(&mut self, ticker: &Receiver<Instant>) -> Option<ExitMode> {
        let Self {
            log,
            channels,
            staged,
            dirty,
            ..
        } = self;

        let mut sel = Select::new();
        let write_idx = sel.recv(&channels.write_rx);
        let clear_idx = sel.recv(&channels.clear_rx);
        let exit_idx = sel.recv(&channels.exit_rx);
        let tick_idx = sel.recv(ticker);
        let pending = staged.take();
        let pop_idx = pending.as_ref().map(|_| sel.send(&channels.pop_tx));

        let oper = sel.select();
        let index = oper.index();

        match pending {
            Some(frame) if Some(index) == pop_idx => {
                match oper.send(&channels.pop_tx, frame) {
                    Ok(()) => {
                        *dirty += 1;
                        if log.move_forward() {
                            debug!(name = %log.config().name, "Tail check reset queue state");
                        }
                    }
                    // Every receiver is gone, including the handle's own.
                    Err(SendError(_)) => return Some(ExitMode::Close),
                }
                return None;
            }
            pending => *staged = pending,
        }

        if index == write_idx {
            let Ok(request) = oper.recv(&channels.write_rx) else {
                return Some(ExitMode::Close);
            };
            *dirty += 1;
            let _ = request.reply.send(log.write_one(&request.data));
        } else if index == clear_idx {
            let Ok(reply) = oper.recv(&channels.clear_rx) else {
                return Some(ExitMode::Close);
            };
            // The staged frame belongs to a segment that is about to vanish.
            *staged = None;
            let result = log.delete_all_files();
            log.request_sync();
            info!(name = %log.config().name, write = %log.write_position(), "Queue cleared");
            let _ = reply.send(result);
            *dirty = 0;
        } else if index == exit_idx {
            return Some(oper.recv(&channels.exit_rx).unwrap_or(ExitMode::Close));
        } else if index == tick_idx {
            let _ = oper.recv(ticker);
            if *dirty > 0 {
                log.request_sync();
            }
        } else {
            unreachable!("unexpected select index {index}");
        }

        None
    }
}
