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

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, HistogramVec, IntCounter,
};

use crate::error::Result;

/// Label distinguishing request outcomes: ok, canceled, other.
pub(crate) const METRIC_TYPE_LABEL: &str = "type";

lazy_static! {
    pub static ref METRIC_READS_STARTED: IntCounter = register_int_counter!(
        "promstore_servers_reads_started",
        "servers started reads"
    )
    .unwrap();
    pub static ref METRIC_WRITES_STARTED: IntCounter = register_int_counter!(
        "promstore_servers_writes_started",
        "servers started writes"
    )
    .unwrap();
    pub static ref METRIC_READ_ELAPSED: HistogramVec = register_histogram_vec!(
        "promstore_servers_read_elapsed",
        "servers read durations by result type",
        &[METRIC_TYPE_LABEL]
    )
    .unwrap();
    pub static ref METRIC_WRITE_ELAPSED: HistogramVec = register_histogram_vec!(
        "promstore_servers_write_elapsed",
        "servers write durations by result type",
        &[METRIC_TYPE_LABEL]
    )
    .unwrap();
    pub static ref METRIC_WRITTEN_SAMPLES: IntCounter = register_int_counter!(
        "promstore_servers_written_samples",
        "servers written samples"
    )
    .unwrap();
}

/// Converts a handler result to the short string used as the `type` label.
pub(crate) fn result_type<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_canceled() => "canceled",
        Err(_) => "other",
    }
}
