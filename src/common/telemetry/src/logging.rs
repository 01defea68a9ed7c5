// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! logging stuffs, inspired by databend

use std::sync::Once;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The logging options that used to initialize the logger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// The directory to store log files. If empty, logs are written to
    /// stdout only.
    pub dir: String,

    /// The log level that can be one of "trace", "debug", "info", "warn",
    /// "error". Default is "info".
    pub level: Option<String>,

    /// Whether to append logs to stdout. Default is true.
    pub append_stdout: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: "".to_string(),
            level: None,
            append_stdout: true,
        }
    }
}

/// Initialize the global tracing subscriber once; later calls are no-ops.
/// The returned guards must be held for the lifetime of the process,
/// otherwise the non-blocking writers stop flushing.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();

    let mut guards = vec![];
    START.call_once(|| {
        let level = opts.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));

        let stdout_layer = if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            Some(fmt::layer().with_writer(writer))
        } else {
            None
        };

        let file_layer = if !opts.dir.is_empty() {
            let appender =
                RollingFileAppender::new(Rotation::HOURLY, &opts.dir, format!("{app_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        } else {
            None
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });

    guards
}

/// Init a logger for unit tests. Keeps the guards alive in a global so test
/// functions don't have to.
pub fn init_default_ut_logging() {
    static GUARDS: Lazy<std::sync::Mutex<Vec<WorkerGuard>>> =
        Lazy::new(|| std::sync::Mutex::new(vec![]));

    let opts = LoggingOptions {
        level: Some("debug".to_string()),
        ..Default::default()
    };
    let guards = init_global_logging("unittest", &opts);
    GUARDS.lock().unwrap().extend(guards);
}
