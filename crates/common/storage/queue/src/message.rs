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

//! Requests sent from the [`Queue`](crate::Queue) handle to the io loop.

use bytes::Bytes;
use crossbeam::channel::Sender;

use crate::Result;

/// Reply channel for a single request.
pub(crate) type Reply = Sender<Result<()>>;

/// A push waiting for its frame to be appended.
#[derive(Debug)]
pub(crate) struct WriteRequest {
    /// Payload to frame and append.
    pub data:  Bytes,
    /// Receives the outcome of the append.
    pub reply: Reply,
}

/// How the io loop should wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitMode {
    /// Flush the write segment and persist metadata.
    Close,
    /// Remove every segment and the metadata file.
    Delete,
}
