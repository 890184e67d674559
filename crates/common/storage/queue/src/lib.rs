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

//! A persistent, disk-backed FIFO queue of byte messages.
//!
//! Messages are framed as a 4-byte big-endian length followed by the payload
//! and appended to a sequence of segment files. A small metadata file records
//! the depth and the read and write cursors; it is rewritten atomically on
//! every sync. A single io thread owns all files and cursors, and producers
//! and consumers talk to it over channels.

mod actor;
mod builder;
mod config;
mod error;
mod frame;
mod message;
mod meta;
pub mod path;
mod queue;
mod segment;
mod stats;

pub use builder::QueueBuilder;
pub use config::{
    DEFAULT_MAX_BYTES_PER_FILE, DEFAULT_QUEUE_NAME, DEFAULT_SYNC_EVERY, DEFAULT_SYNC_TIMEOUT,
    MAX_MSG_SIZE_LIMIT, QueueConfig,
};
pub use error::{QueueError, Result};
pub use meta::{Metadata, Position};
pub use queue::Queue;
pub use stats::QueueStats;
