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

//! Functional in-memory storage for tests and tooling. Shares the series
//! identity rules with the ClickHouse engine (canonical label order, FNV-1a
//! fingerprints, no sample-level dedup) but keeps everything in two maps.

use std::collections::HashMap;
use std::sync::RwLock;

use api::prom_store::remote::{Label, QueryResult, Sample, TimeSeries, WriteRequest};
use async_trait::async_trait;
use snafu::ensure;
use tokio_util::sync::CancellationToken;

use crate::error::{CanceledSnafu, Result};
use crate::fingerprint::{fingerprint, sort_labels};
use crate::{Query, Storage};

#[derive(Default)]
struct Inner {
    metrics: HashMap<u64, Vec<Label>>,
    samples: HashMap<u64, Vec<Sample>>,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct series seen so far.
    pub fn series_count(&self) -> usize {
        self.inner.read().unwrap().metrics.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(
        &self,
        ctx: &CancellationToken,
        queries: Vec<Query>,
    ) -> Result<Vec<QueryResult>> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);

        let inner = self.inner.read().unwrap();
        let mut results = Vec::with_capacity(queries.len());
        for q in &queries {
            let mut result = QueryResult::default();
            for (f, metric) in &inner.metrics {
                if !q.matchers.matches(metric)? {
                    continue;
                }
                let samples: Vec<Sample> = inner
                    .samples
                    .get(f)
                    .map(|samples| {
                        samples
                            .iter()
                            .filter(|s| {
                                s.timestamp_ms >= q.start_ms && s.timestamp_ms <= q.end_ms
                            })
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                if !samples.is_empty() {
                    result.timeseries.push(TimeSeries {
                        labels: metric.clone(),
                        samples,
                    });
                }
            }
            results.push(result);
        }
        Ok(results)
    }

    async fn write(&self, ctx: &CancellationToken, mut request: WriteRequest) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);

        let mut inner = self.inner.write().unwrap();
        for ts in &mut request.timeseries {
            sort_labels(&mut ts.labels);
            let f = fingerprint(&ts.labels);
            inner.metrics.insert(f, ts.labels.clone());

            let samples = inner.samples.entry(f).or_default();
            samples.extend_from_slice(&ts.samples);
            if !samples.is_sorted_by_key(|s| s.timestamp_ms) {
                samples.sort_by_key(|s| s.timestamp_ms);
            }
        }
        Ok(())
    }
}
