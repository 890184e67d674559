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

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counters written by the io loop and read lock-free by the handle.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub depth:                 AtomicI64,
    pub corruptions_recovered: AtomicU64,
    pub tail_resets:           AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> QueueStats {
        QueueStats {
            depth:                 self.depth.load(Ordering::SeqCst),
            corruptions_recovered: self.corruptions_recovered.load(Ordering::Relaxed),
            tail_resets:           self.tail_resets.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames written but not yet delivered.
    pub depth:                 i64,
    /// Segments quarantined because a frame could not be decoded.
    pub corruptions_recovered: u64,
    /// Times the depth counter or cursors were forcibly reset at the tail.
    pub tail_resets:           u64,
}
