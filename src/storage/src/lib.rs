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

//! Long-term storage engines for the Prometheus remote API: the ClickHouse
//! engine (the real one), an in-memory engine for tests and tooling, and a
//! blackhole engine for load testing.

use std::fmt;
use std::sync::Arc;

use api::prom_store::remote::{QueryResult, WriteRequest};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod blackhole;
pub mod clickhouse;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod json;
pub mod matcher;
mod metrics;
pub mod memory;
pub mod test_util;

use crate::error::Result;
use crate::matcher::Matchers;

/// A query against stored data: a time window plus a matcher list.
#[derive(Clone, Debug)]
pub struct Query {
    pub start_ms: i64,
    pub end_ms: i64,
    pub matchers: Matchers,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{}]", self.start_ms, self.end_ms, self.matchers)
    }
}

/// Generic storage. Every operation takes a lifecycle context; a cancelled
/// context makes the operation return [`error::Error::Canceled`] promptly,
/// though side effects already committed to the database stay.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Runs queries and returns one result per query, even if empty.
    async fn read(&self, ctx: &CancellationToken, queries: Vec<Query>) -> Result<Vec<QueryResult>>;

    /// Puts data into storage.
    async fn write(&self, ctx: &CancellationToken, request: WriteRequest) -> Result<()>;

    /// Stops background work owned by the storage. Defaults to a no-op.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

pub type StorageRef = Arc<dyn Storage>;
