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

//! Storage that discards everything, for load testing the gateway itself.

use api::prom_store::remote::{QueryResult, WriteRequest};
use async_trait::async_trait;
use snafu::ensure;
use tokio_util::sync::CancellationToken;

use crate::error::{CanceledSnafu, Result};
use crate::{Query, Storage};

#[derive(Default)]
pub struct BlackholeStorage;

impl BlackholeStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for BlackholeStorage {
    async fn read(
        &self,
        ctx: &CancellationToken,
        queries: Vec<Query>,
    ) -> Result<Vec<QueryResult>> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        Ok(queries.iter().map(|_| QueryResult::default()).collect())
    }

    async fn write(&self, ctx: &CancellationToken, _request: WriteRequest) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        Ok(())
    }
}
