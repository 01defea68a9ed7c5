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

//! Shared fixtures for storage tests.

use api::prom_store::remote::{Label, Sample, TimeSeries, WriteRequest};

use crate::fingerprint::{fingerprint, sort_labels};

/// Base timestamp of the fixture samples; a fixed instant keeps tests
/// deterministic.
pub const START_MS: i64 = 1_707_000_000_000;

/// Milliseconds between consecutive fixture samples.
pub const STEP_MS: i64 = 1_000;

pub fn new_label(name: &str, value: &str) -> Label {
    Label {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn new_series(labels: Vec<Label>, values: &[f64]) -> TimeSeries {
    let samples = values
        .iter()
        .enumerate()
        .map(|(i, v)| Sample {
            value: *v,
            timestamp_ms: START_MS + i as i64 * STEP_MS,
        })
        .collect();
    TimeSeries { labels, samples }
}

/// Three `http_requests_total` series with five samples each, the corpus
/// most scenario tests start from.
pub fn write_request() -> WriteRequest {
    WriteRequest {
        timeseries: vec![
            new_series(
                vec![
                    new_label("__name__", "http_requests_total"),
                    new_label("code", "200"),
                    new_label("handler", "query"),
                ],
                &[13.0, 14.0, 14.0, 14.0, 15.0],
            ),
            new_series(
                vec![
                    new_label("__name__", "http_requests_total"),
                    new_label("code", "400"),
                    new_label("handler", "query_range"),
                ],
                &[9.0, 9.0, 9.0, 11.0, 11.0],
            ),
            new_series(
                vec![
                    new_label("__name__", "http_requests_total"),
                    new_label("code", "200"),
                    new_label("handler", "prometheus"),
                ],
                &[591.0, 592.0, 593.0, 594.0, 595.0],
            ),
        ],
    }
}

/// Six `funny_N` series whose label values exercise the JSON escaper:
/// empty, quotes, backquotes, repeated backslashes and multi-byte UTF-8.
pub fn funny_write_request() -> WriteRequest {
    let values = [
        "",
        "'`\"\\",
        "''``\"\"\\\\",
        "'''```\"\"\"\\\\\\",
        r"\ \\ \\\\ \\\\",
        "🆗",
    ];
    WriteRequest {
        timeseries: values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                new_series(
                    vec![
                        new_label("__name__", &format!("funny_{}", i + 1)),
                        new_label("label", v),
                    ],
                    &[1.0],
                )
            })
            .collect(),
    }
}

/// Sorts time series by metric name, then by fingerprint, for comparison
/// against fixture order. Slow; test-only.
pub fn sort_time_series(timeseries: &mut [TimeSeries]) {
    for ts in timeseries.iter_mut() {
        sort_labels(&mut ts.labels);
    }
    timeseries.sort_by(|a, b| {
        let name_a = metric_name(&a.labels);
        let name_b = metric_name(&b.labels);
        name_a
            .cmp(name_b)
            .then_with(|| fingerprint(&a.labels).cmp(&fingerprint(&b.labels)))
    });
}

fn metric_name(labels: &[Label]) -> &str {
    labels
        .iter()
        .find(|l| l.name == "__name__")
        .map(|l| l.value.as_str())
        .unwrap_or("")
}
