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

use crate::{Queue, QueueConfig, Result};

/// Fluent constructor for [`Queue`].
///
/// The default builder places the queue in the platform temp directory.
#[derive(Debug, Clone, Default)]
pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(data_path: P) -> Self {
        Self {
            config: QueueConfig {
                data_path: data_path.into(),
                ..Default::default()
            },
        }
    }

    /// Starts from an existing configuration.
    pub const fn from_config(config: QueueConfig) -> Self { Self { config } }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn max_bytes_per_file(mut self, bytes: u64) -> Self {
        self.config.max_bytes_per_file = bytes;
        self
    }

    pub fn min_msg_size(mut self, size: u32) -> Self {
        self.config.min_msg_size = size;
        self
    }

    pub fn max_msg_size(mut self, size: u32) -> Self {
        self.config.max_msg_size = size;
        self
    }

    pub fn sync_every(mut self, count: u64) -> Self {
        self.config.sync_every = count;
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    pub const fn config(&self) -> &QueueConfig { &self.config }

    /// Validates the configuration and opens the queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for out-of-range settings, or the error hit
    /// while creating the directory, loading metadata or spawning the io
    /// thread.
    pub fn open(self) -> Result<Queue> { Queue::open(self.config) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default_config() {
        let builder = QueueBuilder::default();
        assert_eq!(builder.config().data_path, std::env::temp_dir());
        assert_eq!(builder.config(), &QueueConfig::default());

        let builder = QueueBuilder::new("/tmp/test_queue");
        assert_eq!(builder.config().data_path, PathBuf::from("/tmp/test_queue"));
        assert_eq!(builder.config().name, "default");
    }

    #[test]
    fn test_builder_custom_config() {
        let builder = QueueBuilder::new("/tmp/test_queue")
            .name("orders")
            .max_bytes_per_file(1024)
            .min_msg_size(4)
            .max_msg_size(512)
            .sync_every(100)
            .sync_timeout(Duration::from_millis(250));

        let config = builder.config();
        assert_eq!(config.name, "orders");
        assert_eq!(config.max_bytes_per_file, 1024);
        assert_eq!(config.min_msg_size, 4);
        assert_eq!(config.max_msg_size, 512);
        assert_eq!(config.sync_every, 100);
        assert_eq!(config.sync_timeout, Duration::from_millis(250));
        config.validate().unwrap();
    }
}
