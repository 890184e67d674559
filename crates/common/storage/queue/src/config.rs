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

use std::{path::PathBuf, time::Duration};

use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

pub const DEFAULT_QUEUE_NAME: &str = "default";
/// Upper bound for a frame payload; the length prefix is a 4-byte signed size
/// on the wire for compatibility with existing data directories.
pub const MAX_MSG_SIZE_LIMIT: u32 = i32::MAX as u32;
pub const DEFAULT_MAX_BYTES_PER_FILE: u64 = i64::MAX as u64;
pub const DEFAULT_SYNC_EVERY: u64 = 20;
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(1);

/// Immutable queue configuration, fixed when the queue is opened.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault)]
pub struct QueueConfig {
    /// Queue name, used as the prefix of every file the queue owns.
    #[default(_code = "DEFAULT_QUEUE_NAME.to_string()")]
    pub name:               String,
    /// Directory holding segments and metadata.
    #[default(_code = "std::env::temp_dir()")]
    pub data_path:          PathBuf,
    /// A segment is rolled once its write offset exceeds this many bytes.
    #[default(DEFAULT_MAX_BYTES_PER_FILE)]
    pub max_bytes_per_file: u64,
    #[default(0)]
    pub min_msg_size:       u32,
    #[default(MAX_MSG_SIZE_LIMIT)]
    pub max_msg_size:       u32,
    /// Number of reads and writes between two forced syncs.
    #[default(DEFAULT_SYNC_EVERY)]
    pub sync_every:         u64,
    /// Idle interval after which pending reads and writes are synced.
    #[default(DEFAULT_SYNC_TIMEOUT)]
    pub sync_timeout:       Duration,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.is_empty(),
            InvalidConfigSnafu {
                reason: "name must not be empty",
            }
        );
        ensure!(
            !self.name.contains(std::path::is_separator),
            InvalidConfigSnafu {
                reason: format!("name {:?} must not contain a path separator", self.name),
            }
        );
        ensure!(
            self.max_bytes_per_file > 0,
            InvalidConfigSnafu {
                reason: "max_bytes_per_file must be positive",
            }
        );
        ensure!(
            self.max_msg_size <= MAX_MSG_SIZE_LIMIT,
            InvalidConfigSnafu {
                reason: format!("max_msg_size must not exceed {MAX_MSG_SIZE_LIMIT}"),
            }
        );
        ensure!(
            self.min_msg_size <= self.max_msg_size,
            InvalidConfigSnafu {
                reason: format!(
                    "min_msg_size {} is greater than max_msg_size {}",
                    self.min_msg_size, self.max_msg_size
                ),
            }
        );
        ensure!(
            self.sync_every > 0,
            InvalidConfigSnafu {
                reason: "sync_every must be positive",
            }
        );
        ensure!(
            !self.sync_timeout.is_zero(),
            InvalidConfigSnafu {
                reason: "sync_timeout must be positive",
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.data_path, std::env::temp_dir());
        assert_eq!(config.max_bytes_per_file, i64::MAX as u64);
        assert_eq!(config.min_msg_size, 0);
        assert_eq!(config.max_msg_size, i32::MAX as u32);
        assert_eq!(config.sync_every, 20);
        assert_eq!(config.sync_timeout, Duration::from_secs(1));
        config.validate().unwrap();
    }

    #[test_case(QueueConfig { name: String::new(), ..Default::default() } ; "empty name")]
    #[test_case(QueueConfig { name: "a/b".into(), ..Default::default() } ; "name with separator")]
    #[test_case(QueueConfig { max_bytes_per_file: 0, ..Default::default() } ; "zero segment size")]
    #[test_case(QueueConfig { min_msg_size: 10, max_msg_size: 5, ..Default::default() } ; "min above max")]
    #[test_case(QueueConfig { max_msg_size: u32::MAX, ..Default::default() } ; "max above limit")]
    #[test_case(QueueConfig { sync_every: 0, ..Default::default() } ; "zero sync every")]
    #[test_case(QueueConfig { sync_timeout: Duration::ZERO, ..Default::default() } ; "zero sync timeout")]
    fn test_invalid_config(config: QueueConfig) {
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidConfig { .. })
        ));
    }
}
