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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// The queue was closed or deleted; the operation was not attempted.
    #[snafu(display("queue {name} has been exited"))]
    Exited { name: String },

    /// A pushed payload is outside the configured frame size bounds.
    #[snafu(display("invalid message size {size}, expected {min}..={max}"))]
    InvalidMessageSize { size: usize, min: u32, max: u32 },

    /// A frame header on disk carries a length outside the configured bounds.
    #[snafu(display("corrupt frame header: size {size} outside {min}..={max}"))]
    FrameCorrupt { size: u32, min: u32, max: u32 },

    #[snafu(display("failed to read frame"))]
    ReadFrame { source: io::Error },

    #[snafu(display("failed to open segment {}", path.display()))]
    OpenSegment { path: PathBuf, source: io::Error },

    #[snafu(display("failed to write segment {}", path.display()))]
    WriteSegment { path: PathBuf, source: io::Error },

    #[snafu(display("failed to sync segment {}", path.display()))]
    SyncSegment { path: PathBuf, source: io::Error },

    #[snafu(display("failed to remove {}", path.display()))]
    RemoveFile { path: PathBuf, source: io::Error },

    #[snafu(display("failed to read metadata {}", path.display()))]
    ReadMetadata { path: PathBuf, source: io::Error },

    #[snafu(display("failed to write metadata {}", path.display()))]
    WriteMetadata { path: PathBuf, source: io::Error },

    #[snafu(display("metadata {} is corrupt: {reason}", path.display()))]
    MetadataCorrupt { path: PathBuf, reason: String },

    #[snafu(display("failed to create data directory {}", path.display()))]
    CreateDir { path: PathBuf, source: io::Error },

    #[snafu(display("failed to scan data directory {}", path.display()))]
    ScanDir { path: PathBuf, source: io::Error },

    #[snafu(display("invalid queue config: {reason}"))]
    InvalidConfig { reason: String },

    #[snafu(display("failed to spawn queue io thread"))]
    SpawnActor { source: io::Error },

    #[snafu(display("queue io thread panicked"))]
    ActorPanicked,
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
