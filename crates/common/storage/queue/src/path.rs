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

//! File naming for a queue directory.
//!
//! ```text
//! <data_path>/<name>.queue.000000.dat       segment 0
//! <data_path>/<name>.queue.000001.dat       segment 1
//! <data_path>/<name>.queue.000001.dat.bad   segment 1 after corruption
//! <data_path>/<name>.queue.meta.dat         metadata
//! ```

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use uuid::Uuid;

use crate::{Result, error::ScanDirSnafu};

const SEGMENT_INFIX: &str = ".queue.";
const SEGMENT_SUFFIX: &str = ".dat";
const META_SUFFIX: &str = ".queue.meta.dat";
const BAD_SUFFIX: &str = ".bad";

/// Generates a segment file name: `<name>.queue.NNNNNN.dat`.
pub fn segment_file_name(name: &str, file_num: u64) -> String {
    format!("{name}{SEGMENT_INFIX}{file_num:06}{SEGMENT_SUFFIX}")
}

/// Returns the full path of segment `file_num`.
pub fn segment_path<P: AsRef<Path>>(data_path: P, name: &str, file_num: u64) -> PathBuf {
    data_path.as_ref().join(segment_file_name(name, file_num))
}

/// Returns the full path of the metadata file: `<name>.queue.meta.dat`.
pub fn meta_path<P: AsRef<Path>>(data_path: P, name: &str) -> PathBuf {
    data_path.as_ref().join(format!("{name}{META_SUFFIX}"))
}

/// Returns the quarantine path for a corrupt segment.
pub fn bad_path(segment: &Path) -> PathBuf { append_suffix(segment, BAD_SUFFIX) }

/// Returns a unique sibling path used to stage a metadata rewrite.
pub fn temp_meta_path(meta: &Path) -> PathBuf {
    append_suffix(meta, &format!(".{}.tmp", Uuid::new_v4().simple()))
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Parses the sequence number out of a segment file name belonging to `name`.
///
/// Quarantined segments, metadata and files of other queues yield `None`.
pub fn parse_segment_file_name(name: &str, file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(name)?.strip_prefix(SEGMENT_INFIX)?;
    let digits = rest.strip_suffix(SEGMENT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lists the live segments of queue `name`, sorted by sequence number.
pub fn scan_segment_files<P: AsRef<Path>>(data_path: P, name: &str) -> Result<Vec<(u64, PathBuf)>> {
    let dir = data_path.as_ref();
    let mut segments = Vec::new();

    if !dir.exists() {
        return Ok(segments);
    }

    for entry in std::fs::read_dir(dir).context(ScanDirSnafu { path: dir })? {
        let entry = entry.context(ScanDirSnafu { path: dir })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_num = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| parse_segment_file_name(name, s));
        if let Some(file_num) = file_num {
            segments.push((file_num, path));
        }
    }

    segments.sort_by_key(|(file_num, _)| *file_num);
    Ok(segments)
}
