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

//! Raw-SQL escape hatch: `{job="rawsql", query="SELECT …"}` executes the
//! free-form query and maps every result row to a synthetic single-sample
//! series. A diagnostic and tooling path; the results bypass the series
//! index, canonical label order and fingerprints entirely.

use api::prom_store::remote::{Label, QueryResult, Sample, TimeSeries};
use clickhouse_rs::types::{Complex, Row, SqlType};
use common_telemetry::debug;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use super::ClickHouseStorage;
use crate::error::{CanceledSnafu, DatabaseSnafu, InternalSnafu, RawSqlSnafu, Result};
use crate::matcher::MatchOp;
use crate::Query;

/// Detects the raw-SQL sentinel on a read request: a single query whose
/// matchers are exactly the two equalities `job=rawsql` and `query=<sql>`.
/// Returns the SQL and the timestamp to stamp on the synthetic samples
/// (the query end; the start is ignored).
pub(crate) fn raw_sql_query(queries: &[Query]) -> Option<(&str, i64)> {
    if queries.len() != 1 || queries[0].matchers.len() != 2 {
        return None;
    }

    let q = &queries[0];
    let mut has_job = false;
    let mut sql = None;
    for m in &q.matchers.0 {
        if m.op == MatchOp::Equal && m.name == "job" && m.value == "rawsql" {
            has_job = true;
        }
        if m.op == MatchOp::Equal && m.name == "query" && !m.value.is_empty() {
            sql = Some(m.value.as_str());
        }
    }

    if has_job {
        sql.map(|sql| (sql, q.end_ms))
    } else {
        None
    }
}

/// Stringifies a result cell and, for numeric types, float-casts it for use
/// as the sample value.
fn scan_cell(row: &Row<'_, Complex>, idx: usize, sql_type: SqlType) -> Result<(String, f64)> {
    macro_rules! numeric {
        ($t:ty) => {{
            let v: $t = row.get(idx).context(DatabaseSnafu)?;
            (v.to_string(), v as f64)
        }};
    }

    Ok(match sql_type {
        SqlType::UInt8 => numeric!(u8),
        SqlType::UInt16 => numeric!(u16),
        SqlType::UInt32 => numeric!(u32),
        SqlType::UInt64 => numeric!(u64),
        SqlType::Int8 => numeric!(i8),
        SqlType::Int16 => numeric!(i16),
        SqlType::Int32 => numeric!(i32),
        SqlType::Int64 => numeric!(i64),
        SqlType::Float32 => numeric!(f32),
        SqlType::Float64 => numeric!(f64),
        SqlType::String | SqlType::FixedString(_) => {
            let v: String = row.get(idx).context(DatabaseSnafu)?;
            (v, 0.0)
        }
        other => {
            return InternalSnafu {
                msg: format!("unsupported column type {other:?} in raw SQL result"),
            }
            .fail()
        }
    })
}

impl ClickHouseStorage {
    pub(crate) async fn read_raw_sql(
        &self,
        ctx: &CancellationToken,
        query: &str,
        timestamp_ms: i64,
    ) -> Result<QueryResult> {
        debug!("Raw SQL query: {query}");

        let mut client = self.client(ctx).await?;
        let block = tokio::select! {
            _ = ctx.cancelled() => return CanceledSnafu.fail(),
            res = client.query(query).fetch_all() => res.context(RawSqlSnafu { query })?,
        };

        let mut result = QueryResult::default();
        let columns = block.columns();
        for row in block.rows() {
            let mut labels = Vec::with_capacity(columns.len());
            let mut value = 0f64;
            for (idx, column) in columns.iter().enumerate() {
                let (as_string, as_f64) = scan_cell(&row, idx, column.sql_type())?;
                if column.name() == "value" {
                    value = as_f64;
                } else {
                    labels.push(Label {
                        name: column.name().to_string(),
                        value: as_string,
                    });
                }
            }
            result.timeseries.push(TimeSeries {
                labels,
                samples: vec![Sample {
                    value,
                    timestamp_ms,
                }],
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{Matcher, Matchers};

    fn query(matchers: Vec<Matcher>) -> Query {
        Query {
            start_ms: 0,
            end_ms: 42,
            matchers: Matchers(matchers),
        }
    }

    #[test]
    fn test_sentinel_detected() {
        let queries = vec![query(vec![
            Matcher::new(MatchOp::Equal, "job", "rawsql"),
            Matcher::new(MatchOp::Equal, "query", "SELECT 1 AS value"),
        ])];
        assert_eq!(
            Some(("SELECT 1 AS value", 42)),
            raw_sql_query(&queries)
        );

        // Matcher order does not matter.
        let queries = vec![query(vec![
            Matcher::new(MatchOp::Equal, "query", "SELECT 1 AS value"),
            Matcher::new(MatchOp::Equal, "job", "rawsql"),
        ])];
        assert!(raw_sql_query(&queries).is_some());
    }

    #[test]
    fn test_sentinel_shape_is_strict() {
        // Not exactly two matchers.
        let queries = vec![query(vec![Matcher::new(MatchOp::Equal, "job", "rawsql")])];
        assert!(raw_sql_query(&queries).is_none());

        // Wrong job value.
        let queries = vec![query(vec![
            Matcher::new(MatchOp::Equal, "job", "node"),
            Matcher::new(MatchOp::Equal, "query", "SELECT 1"),
        ])];
        assert!(raw_sql_query(&queries).is_none());

        // Regexp matchers do not trigger the detour.
        let queries = vec![query(vec![
            Matcher::new(MatchOp::Regexp, "job", "rawsql"),
            Matcher::new(MatchOp::Equal, "query", "SELECT 1"),
        ])];
        assert!(raw_sql_query(&queries).is_none());

        // Empty SQL.
        let queries = vec![query(vec![
            Matcher::new(MatchOp::Equal, "job", "rawsql"),
            Matcher::new(MatchOp::Equal, "query", ""),
        ])];
        assert!(raw_sql_query(&queries).is_none());

        // More than one query.
        let q = query(vec![
            Matcher::new(MatchOp::Equal, "job", "rawsql"),
            Matcher::new(MatchOp::Equal, "query", "SELECT 1"),
        ]);
        let queries = vec![q.clone(), q];
        assert!(raw_sql_query(&queries).is_none());
    }
}
