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

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Operation canceled"))]
    Canceled,

    #[snafu(display("Malformed labels JSON, source: {}", source))]
    MalformedLabelJson { source: serde_json::Error },

    #[snafu(display("Failed to compile regexp {:?}, source: {}", pattern, source))]
    CompileRegexp {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Invalid ClickHouse DSN: {}", msg))]
    InvalidDsn { msg: String },

    #[snafu(display("Database error, source: {}", source))]
    Database {
        source: clickhouse_rs::errors::Error,
    },

    #[snafu(display("Failed to execute raw SQL query {:?}, source: {}", query, source))]
    RawSql {
        query: String,
        source: clickhouse_rs::errors::Error,
    },

    #[snafu(display("Internal error: {}", msg))]
    Internal { msg: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is a cooperative-cancellation result; drives the
    /// `type` label on API metrics.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}
