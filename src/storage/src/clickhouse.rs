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

//! ClickHouse-backed storage engine.
//!
//! Series identity lives in the in-memory [`SeriesIndex`]; ClickHouse holds
//! two tables: `time_series` (fingerprint to canonical labels JSON, with a
//! replacing merge engine deduplicating on fingerprint) and `samples`
//! (fingerprint, timestamp, value, clustered for fingerprint-major scans).
//! A background reloader keeps the index in sync with series written by
//! other gateway instances.

mod rawsql;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use api::prom_store::remote::{Label, QueryResult, TimeSeries, WriteRequest};
use async_trait::async_trait;
use clickhouse_rs::types::Block;
use clickhouse_rs::{ClientHandle, Pool};
use common_telemetry::{debug, error, info};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{CanceledSnafu, DatabaseSnafu, InvalidDsnSnafu, Result};
use crate::fingerprint::{fingerprint, sort_labels};
use crate::index::SeriesIndex;
use crate::json::{marshal_labels, unmarshal_labels};
use crate::{metrics, Query, Storage};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseOptions {
    /// Connection DSN; the target database must be set via the `database`
    /// query parameter, e.g. `tcp://127.0.0.1:9000/?database=promstore`.
    pub dsn: String,

    /// Drop and recreate the target database at startup.
    pub drop_database: bool,

    /// Upper bound of the connection pool.
    pub max_open_conns: u32,

    /// Above this many matched series a query switches from an IN-list scan
    /// to a temporary-table join. Zero or negative always uses the IN-list.
    pub max_time_series_in_query: i32,

    /// Cadence of the series index reloader.
    #[serde(with = "humantime_serde")]
    pub reload_interval: Duration,

    /// Disable the reloader entirely (single-writer deployments, tests).
    pub disable_reloader: bool,
}

impl Default for ClickHouseOptions {
    fn default() -> Self {
        Self {
            dsn: "tcp://127.0.0.1:9000/?database=promstore".to_string(),
            drop_database: false,
            max_open_conns: 75,
            max_time_series_in_query: 50,
            reload_interval: Duration::from_secs(5),
            disable_reloader: false,
        }
    }
}

pub struct ClickHouseStorage {
    pool: Pool,
    database: String,
    max_time_series_in_query: i32,
    index: Arc<SeriesIndex>,
    reloader_cancel: CancellationToken,
    reloader_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Races a database future against the lifecycle context. The database
/// future is dropped on cancellation; anything it already committed stays.
async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, clickhouse_rs::errors::Error>>,
{
    tokio::select! {
        _ = ctx.cancelled() => CanceledSnafu.fail(),
        res = fut => res.context(DatabaseSnafu),
    }
}

struct Dsn {
    /// DSN without a database, for schema bootstrap.
    bootstrap: String,
    /// DSN with the database selected and pool bounds applied.
    pool: String,
    database: String,
}

fn parse_dsn(opts: &ClickHouseOptions) -> Result<Dsn> {
    let url = Url::parse(&opts.dsn).ok().context(InvalidDsnSnafu {
        msg: format!("cannot parse {:?}", opts.dsn),
    })?;

    let mut database = None;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == "database" {
                database = Some(v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();
    let database = database
        .filter(|d| !d.is_empty())
        .context(InvalidDsnSnafu {
            msg: "database must be set in the ClickHouse DSN",
        })?;

    let mut bootstrap = url.clone();
    set_query(&mut bootstrap, &retained);

    let mut pool = url;
    pool.set_path(&format!("/{database}"));
    let mut pool_pairs = retained;
    pool_pairs.push(("pool_min".to_string(), "2".to_string()));
    pool_pairs.push(("pool_max".to_string(), opts.max_open_conns.to_string()));
    set_query(&mut pool, &pool_pairs);

    Ok(Dsn {
        bootstrap: bootstrap.to_string(),
        pool: pool.to_string(),
        database,
    })
}

fn set_query(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

fn schema_queries(database: &str, drop_database: bool) -> Vec<String> {
    let mut queries = Vec::with_capacity(4);
    if drop_database {
        queries.push(format!("DROP DATABASE IF EXISTS {database}"));
    }
    queries.push(format!("CREATE DATABASE IF NOT EXISTS {database}"));
    queries.push(format!(
        "CREATE TABLE IF NOT EXISTS {database}.time_series (\n\
         \tdate Date DEFAULT today(),\n\
         \tfingerprint UInt64,\n\
         \tlabels String\n\
         )\n\
         ENGINE = ReplacingMergeTree\n\
         \tPARTITION BY date\n\
         \tORDER BY fingerprint"
    ));
    queries.push(format!(
        "CREATE TABLE IF NOT EXISTS {database}.samples (\n\
         \tfingerprint UInt64,\n\
         \ttimestamp_ms Int64,\n\
         \tvalue Float64\n\
         )\n\
         ENGINE = MergeTree\n\
         \tPARTITION BY toDate(timestamp_ms / 1000)\n\
         \tORDER BY (fingerprint, timestamp_ms)"
    ));
    queries
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

impl ClickHouseStorage {
    /// Connects, bootstraps the schema and starts the reloader task.
    pub async fn new(opts: &ClickHouseOptions) -> Result<Self> {
        let dsn = parse_dsn(opts)?;

        // Connect without selecting a database first: it may not exist yet.
        {
            let bootstrap_pool = Pool::new(dsn.bootstrap.as_str());
            let mut client = bootstrap_pool.get_handle().await.context(DatabaseSnafu)?;
            for query in schema_queries(&dsn.database, opts.drop_database) {
                info!("Executing:\n{query}");
                client.execute(query.as_str()).await.context(DatabaseSnafu)?;
            }
        }

        let storage = Self {
            pool: Pool::new(dsn.pool.as_str()),
            database: dsn.database,
            max_time_series_in_query: opts.max_time_series_in_query,
            index: Arc::new(SeriesIndex::new()),
            reloader_cancel: CancellationToken::new(),
            reloader_handle: Mutex::new(None),
        };

        if !opts.disable_reloader {
            let handle = tokio::spawn(run_reloader(
                storage.pool.clone(),
                storage.database.clone(),
                storage.index.clone(),
                opts.reload_interval,
                storage.reloader_cancel.clone(),
            ));
            *storage.reloader_handle.lock().unwrap() = Some(handle);
        }

        Ok(storage)
    }

    async fn client(&self, ctx: &CancellationToken) -> Result<ClientHandle> {
        cancellable(ctx, self.pool.get_handle()).await
    }

    /// Scans `(fingerprint, timestamp_ms, value)` rows ordered by
    /// fingerprint then timestamp, flushing a time series whenever the
    /// fingerprint changes and rehydrating its labels from the index.
    async fn scan_samples(
        &self,
        ctx: &CancellationToken,
        client: &mut ClientHandle,
        query: &str,
    ) -> Result<Vec<TimeSeries>> {
        let mut stream = client.query(query).stream();

        let mut res = Vec::new();
        let mut current: Option<(u64, TimeSeries)> = None;
        loop {
            let row = tokio::select! {
                _ = ctx.cancelled() => return CanceledSnafu.fail(),
                row = stream.next() => row,
            };
            let Some(row) = row else { break };
            let row = row.context(DatabaseSnafu)?;

            let fingerprint: u64 = row.get("fingerprint").context(DatabaseSnafu)?;
            let timestamp_ms: i64 = row.get("timestamp_ms").context(DatabaseSnafu)?;
            let value: f64 = row.get("value").context(DatabaseSnafu)?;

            let start_new = match &current {
                Some((f, _)) => *f != fingerprint,
                None => true,
            };
            if start_new {
                if let Some((_, ts)) = current.take() {
                    res.push(ts);
                }
                current = Some((
                    fingerprint,
                    TimeSeries {
                        labels: self.index.lookup(fingerprint).unwrap_or_default(),
                        samples: Vec::new(),
                    },
                ));
            }
            if let Some((_, ts)) = current.as_mut() {
                ts.samples.push(api::prom_store::remote::Sample {
                    value,
                    timestamp_ms,
                });
            }
        }
        if let Some((_, ts)) = current {
            res.push(ts);
        }
        Ok(res)
    }

    /// IN-list strategy for small fingerprint sets. Fingerprints and
    /// timestamps are integers, so interpolation is injection-safe.
    async fn query_samples(
        &self,
        ctx: &CancellationToken,
        start_ms: i64,
        end_ms: i64,
        fingerprints: &[u64],
    ) -> Result<Vec<TimeSeries>> {
        let in_list = fingerprints
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT fingerprint, timestamp_ms, value \
             FROM {}.samples \
             WHERE fingerprint IN ({in_list}) \
             AND timestamp_ms >= {start_ms} AND timestamp_ms <= {end_ms} \
             ORDER BY fingerprint, timestamp_ms",
            self.database,
        );
        debug!("{query}");

        let mut client = self.client(ctx).await?;
        self.scan_samples(ctx, &mut client, &query).await
    }

    /// Temporary-table strategy for large fingerprint sets: fill a
    /// session-scoped table on a pinned connection and join against it.
    async fn temp_table_samples(
        &self,
        ctx: &CancellationToken,
        start_ms: i64,
        end_ms: i64,
        fingerprints: &[u64],
    ) -> Result<Vec<TimeSeries>> {
        let mut client = self.client(ctx).await?;

        let table = format!("promstore_{}", unix_nanos());
        let create = format!("CREATE TEMPORARY TABLE {table} (fingerprint UInt64)");
        debug!("{create}");
        cancellable(ctx, client.execute(create.as_str())).await?;

        let block = Block::new().column("fingerprint", fingerprints.to_vec());
        cancellable(ctx, client.insert(&table, block)).await?;

        let query = format!(
            "SELECT fingerprint, timestamp_ms, value \
             FROM {}.samples \
             ANY INNER JOIN {table} USING fingerprint \
             WHERE timestamp_ms >= {start_ms} AND timestamp_ms <= {end_ms} \
             ORDER BY fingerprint, timestamp_ms",
            self.database,
        );
        debug!("{query}");

        let result = self.scan_samples(ctx, &mut client, &query).await;

        // The pooled session outlives this call; drop the table instead of
        // relying on connection close. Best effort: the name is unique.
        let drop_table = format!("DROP TEMPORARY TABLE IF EXISTS {table}");
        if let Err(e) = client.execute(drop_table.as_str()).await {
            error!("Failed to drop temporary table {table}: {e}");
        }

        result
    }
}

#[async_trait]
impl Storage for ClickHouseStorage {
    async fn read(
        &self,
        ctx: &CancellationToken,
        queries: Vec<Query>,
    ) -> Result<Vec<QueryResult>> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);

        // Special case for `{job="rawsql", query="SELECT …"}`; the window
        // start is ignored.
        if let Some((sql, timestamp_ms)) = rawsql::raw_sql_query(&queries) {
            let sql = sql.to_string();
            return Ok(vec![self.read_raw_sql(ctx, &sql, timestamp_ms).await?]);
        }

        let mut results = Vec::with_capacity(queries.len());
        for (i, q) in queries.iter().enumerate() {
            debug!("Query {}: {}", i + 1, q);

            let fingerprints = self.index.matching_fingerprints(&q.matchers)?;
            if fingerprints.is_empty() {
                results.push(QueryResult::default());
                continue;
            }

            let use_temp_table = self.max_time_series_in_query > 0
                && fingerprints.len() > self.max_time_series_in_query as usize;
            let timeseries = if use_temp_table {
                self.temp_table_samples(ctx, q.start_ms, q.end_ms, &fingerprints)
                    .await?
            } else {
                self.query_samples(ctx, q.start_ms, q.end_ms, &fingerprints)
                    .await?
            };
            results.push(QueryResult { timeseries });
        }
        Ok(results)
    }

    async fn write(&self, ctx: &CancellationToken, mut request: WriteRequest) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);

        // Canonicalise labels and map fingerprints to series.
        let mut fingerprints = Vec::with_capacity(request.timeseries.len());
        let mut batch: HashMap<u64, Vec<Label>> = HashMap::with_capacity(request.timeseries.len());
        for ts in &mut request.timeseries {
            sort_labels(&mut ts.labels);
            let f = fingerprint(&ts.labels);
            fingerprints.push(f);
            batch.entry(f).or_insert_with(|| ts.labels.clone());
        }
        if fingerprints.len() != batch.len() {
            debug!(
                "Got {} fingerprints, but only {} of them are unique time series",
                fingerprints.len(),
                batch.len()
            );
        }

        // Intern new series before any database write so concurrent readers
        // see them immediately. The index is not rolled back on failure;
        // the next reloader tick reconciles.
        let new_series = self.index.split_new(&batch);
        metrics::METRIC_INDEX_SERIES.set(self.index.len() as i64);

        if !new_series.is_empty() {
            let mut fps = Vec::with_capacity(new_series.len());
            let mut labels_col = Vec::with_capacity(new_series.len());
            for (f, labels) in &new_series {
                fps.push(*f);
                let mut buf = String::with_capacity(128);
                marshal_labels(labels, &mut buf);
                labels_col.push(buf);
            }
            let block = Block::new()
                .column("fingerprint", fps)
                .column("labels", labels_col);

            let table = format!("{}.time_series", self.database);
            let mut client = self.client(ctx).await?;
            cancellable(ctx, client.insert(&table, block)).await?;
        }

        let total_samples: usize = request.timeseries.iter().map(|ts| ts.samples.len()).sum();
        let mut fp_col = Vec::with_capacity(total_samples);
        let mut ts_col = Vec::with_capacity(total_samples);
        let mut value_col = Vec::with_capacity(total_samples);
        for (i, ts) in request.timeseries.iter().enumerate() {
            for s in &ts.samples {
                fp_col.push(fingerprints[i]);
                ts_col.push(s.timestamp_ms);
                value_col.push(s.value);
            }
        }
        let block = Block::new()
            .column("fingerprint", fp_col)
            .column("timestamp_ms", ts_col)
            .column("value", value_col);

        let table = format!("{}.samples", self.database);
        let mut client = self.client(ctx).await?;
        cancellable(ctx, client.insert(&table, block)).await?;

        if !new_series.is_empty() {
            metrics::METRIC_WRITTEN_TIME_SERIES.inc_by(new_series.len() as u64);
            debug!("Wrote {} new time series", new_series.len());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.reloader_cancel.cancel();
        let handle = self.reloader_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Series index reloader task failed: {e}");
            }
        }
        Ok(())
    }
}

/// Periodically merges the series table into the in-memory index. This is
/// the only way series written by other gateway instances become visible
/// here. The merge is lossless: entries already in memory are never
/// removed, even if the query misses them.
async fn run_reloader(
    pool: Pool,
    database: String,
    index: Arc<SeriesIndex>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let query = format!("SELECT DISTINCT fingerprint, labels FROM {database}.time_series");
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Series index reloader stopped");
                return;
            }
            _ = tick.tick() => {}
        }

        match load_series(&pool, &query).await {
            Ok(series) => {
                let loaded = series.len();
                let added = index.merge(series);
                metrics::METRIC_INDEX_SERIES.set(index.len() as i64);
                debug!("Loaded {loaded} existing time series, {added} were unknown to this instance");
            }
            // Logged and retried on the next tick.
            Err(e) => error!("Failed to reload series index: {e}"),
        }
    }
}

async fn load_series(pool: &Pool, query: &str) -> Result<HashMap<u64, Vec<Label>>> {
    let mut client = pool.get_handle().await.context(DatabaseSnafu)?;
    let block = client.query(query).fetch_all().await.context(DatabaseSnafu)?;

    let mut series = HashMap::with_capacity(block.row_count());
    for row in block.rows() {
        let fingerprint: u64 = row.get("fingerprint").context(DatabaseSnafu)?;
        let labels: String = row.get("labels").context(DatabaseSnafu)?;
        series.insert(fingerprint, unmarshal_labels(&labels)?);
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dsn() {
        let opts = ClickHouseOptions {
            dsn: "tcp://127.0.0.1:9000/?database=prometheus&compression=lz4".to_string(),
            max_open_conns: 10,
            ..Default::default()
        };
        let dsn = parse_dsn(&opts).unwrap();
        assert_eq!("prometheus", dsn.database);
        assert_eq!("tcp://127.0.0.1:9000/?compression=lz4", dsn.bootstrap);
        assert_eq!(
            "tcp://127.0.0.1:9000/prometheus?compression=lz4&pool_min=2&pool_max=10",
            dsn.pool
        );
    }

    #[test]
    fn test_parse_dsn_requires_database() {
        for dsn in ["tcp://127.0.0.1:9000", "tcp://127.0.0.1:9000/?database="] {
            let opts = ClickHouseOptions {
                dsn: dsn.to_string(),
                ..Default::default()
            };
            assert!(parse_dsn(&opts).is_err(), "{dsn}");
        }
    }

    #[test]
    fn test_schema_queries() {
        let queries = schema_queries("prometheus", false);
        assert_eq!(3, queries.len());
        assert!(queries[0].starts_with("CREATE DATABASE IF NOT EXISTS prometheus"));
        assert!(queries[1].contains("ReplacingMergeTree"));
        assert!(queries[2].contains("ORDER BY (fingerprint, timestamp_ms)"));

        let queries = schema_queries("prometheus", true);
        assert_eq!(4, queries.len());
        assert_eq!("DROP DATABASE IF EXISTS prometheus", queries[0]);
    }
}
