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

use std::{
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use crossbeam::{channel::bounded, select};
use diskq_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use diskq_queue::{Queue, QueueBuilder, QueueError, path::scan_segment_files};
use snafu::{ResultExt, Whatever};
use tracing::info;

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "diskq",
about = "Inspect and drive a persistent disk-backed FIFO queue",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION,
long_version = build_info::LONG_VERSION)]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Directory holding the queue files [default: the system temp dir]
    #[arg(long, global = true, env = "DISKQ_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Queue name, the prefix of every file the queue owns
    #[arg(long, global = true, env = "DISKQ_NAME", default_value = diskq_queue::DEFAULT_QUEUE_NAME)]
    name: String,

    #[arg(long, global = true, env = "DISKQ_MAX_BYTES_PER_FILE")]
    max_bytes_per_file: Option<u64>,

    #[arg(long, global = true, env = "DISKQ_MIN_MSG_SIZE")]
    min_msg_size: Option<u32>,

    #[arg(long, global = true, env = "DISKQ_MAX_MSG_SIZE")]
    max_msg_size: Option<u32>,

    /// Reads and writes between two forced syncs
    #[arg(long, global = true, env = "DISKQ_SYNC_EVERY")]
    sync_every: Option<u64>,

    /// Idle sync interval in milliseconds
    #[arg(long, global = true, env = "DISKQ_SYNC_TIMEOUT_MS")]
    sync_timeout_ms: Option<u64>,
}

impl QueueArgs {
    fn builder(&self) -> QueueBuilder {
        let mut builder = self
            .data_path
            .clone()
            .map_or_else(QueueBuilder::default, QueueBuilder::new)
            .name(self.name.clone());
        if let Some(bytes) = self.max_bytes_per_file {
            builder = builder.max_bytes_per_file(bytes);
        }
        if let Some(size) = self.min_msg_size {
            builder = builder.min_msg_size(size);
        }
        if let Some(size) = self.max_msg_size {
            builder = builder.max_msg_size(size);
        }
        if let Some(count) = self.sync_every {
            builder = builder.sync_every(count);
        }
        if let Some(ms) = self.sync_timeout_ms {
            builder = builder.sync_timeout(Duration::from_millis(ms));
        }
        builder
    }
}

#[derive(Debug, Clone, Args)]
struct LogArgs {
    /// Log filter, e.g. `info` or `warn,diskq_queue=debug`
    #[arg(long, global = true, env = "DISKQ_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, env = "DISKQ_LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also write rotated log files to this directory
    #[arg(long, global = true, env = "DISKQ_LOG_DIR")]
    log_dir: Option<String>,
}

impl LogArgs {
    fn options(&self) -> LoggingOptions {
        LoggingOptions {
            dir: self.log_dir.clone().unwrap_or_default(),
            level: Some(self.log_level.clone()),
            log_format: self.log_format,
            use_stderr: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Push(PushArgs),
    Pop(PopArgs),
    Len(LenArgs),
    Stat(StatArgs),
    Clear(ClearArgs),
    Purge(PurgeArgs),
}

impl Commands {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        match self {
            Self::Push(args) => args.run(queue),
            Self::Pop(args) => args.run(queue),
            Self::Len(args) => args.run(queue),
            Self::Stat(args) => args.run(queue),
            Self::Clear(args) => args.run(queue),
            Self::Purge(args) => args.run(queue),
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Append messages to the queue.
Each argument becomes one message; with no arguments every line read from
stdin becomes one message.
Examples:

diskq --data-path /var/lib/diskq --name jobs push first second
seq 1 100 | diskq --name numbers push

")]
struct PushArgs {
    messages: Vec<String>,
}

impl PushArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        let mut pushed = 0usize;
        if self.messages.is_empty() {
            for line in io::stdin().lock().lines() {
                let line = line.whatever_context("failed to read stdin")?;
                queue
                    .push(line)
                    .with_whatever_context(|_| format!("failed to push message #{pushed}"))?;
                pushed += 1;
            }
        } else {
            for message in &self.messages {
                queue
                    .push(message.clone())
                    .with_whatever_context(|_| format!("failed to push message #{pushed}"))?;
                pushed += 1;
            }
        }
        info!(name = queue.name(), pushed, "Pushed messages");
        println!("pushed {pushed}");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Remove messages from the queue and print them, one per line.
Stops after --count messages, when nothing arrives for --timeout-ms, or on
Ctrl+C. Interrupting closes the queue cleanly.
Examples:

diskq --name jobs pop --count 10
diskq --name jobs pop --timeout-ms 5000

")]
struct PopArgs {
    /// Stop after this many messages
    #[arg(long)]
    count: Option<usize>,

    /// Stop when no message arrives within this many milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

impl PopArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        let (stop_tx, stop_rx) = bounded(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .whatever_context("failed to install Ctrl+C handler")?;

        let rx = queue.pop();
        let timeout = Duration::from_millis(self.timeout_ms);
        let mut out = io::stdout().lock();
        let mut popped = 0usize;

        while self.count.is_none_or(|count| popped < count) {
            select! {
                recv(rx) -> msg => {
                    let Ok(data) = msg else { break };
                    out.write_all(&data)
                        .and_then(|()| out.write_all(b"\n"))
                        .whatever_context("failed to write to stdout")?;
                    popped += 1;
                }
                recv(stop_rx) -> _ => {
                    info!(name = queue.name(), popped, "Interrupted, closing queue");
                    break;
                }
                default(timeout) => break,
            }
        }

        out.flush().whatever_context("failed to flush stdout")?;
        info!(name = queue.name(), popped, "Popped messages");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the number of messages waiting in the queue.
Examples:

diskq --name jobs len

")]
struct LenArgs {}

impl LenArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        println!("{}", queue.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the queue depth and the segment files currently on disk.
Examples:

diskq --data-path /var/lib/diskq --name jobs stat

")]
struct StatArgs {}

impl StatArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        let config = queue.config();
        let segments = scan_segment_files(&config.data_path, &config.name)
            .whatever_context("failed to list segment files")?;

        println!("name:       {}", config.name);
        println!("data path:  {}", config.data_path.display());
        println!("depth:      {}", queue.len());
        println!("segments:   {}", segments.len());
        for (file_num, path) in segments {
            let size = fs::metadata(&path)
                .with_whatever_context(|_| format!("failed to stat {}", path.display()))?
                .len();
            println!("  {file_num:06}  {size:>12} bytes  {}", path.display());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Discard every message. The queue stays usable.
Examples:

diskq --name jobs clear

")]
struct ClearArgs {}

impl ClearArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        queue.clear().whatever_context("failed to clear queue")?;
        println!("cleared {}", queue.name());
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Remove every segment and the metadata file of the queue.
Examples:

diskq --name jobs purge

")]
struct PurgeArgs {}

impl PurgeArgs {
    fn run(&self, queue: &Queue) -> Result<(), Whatever> {
        queue
            .delete_and_exit()
            .whatever_context("failed to delete queue")?;
        println!("deleted {}", queue.name());
        Ok(())
    }
}

/// Opens the queue, runs one command and closes the queue again.
fn execute(cli: &Cli) -> Result<(), Whatever> {
    let queue = cli
        .queue
        .builder()
        .open()
        .whatever_context("failed to open queue")?;

    let outcome = cli.commands.run(&queue);
    let closed = match queue.close() {
        Ok(()) | Err(QueueError::Exited { .. }) => Ok(()),
        Err(e) => Err(e),
    };
    outcome?;
    closed.whatever_context("failed to close queue")
}

fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();
    let cli = Cli::parse();
    let _guards = init_global_logging("diskq", &cli.log.options());
    set_panic_hook();
    execute(&cli)
}
