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
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

lazy_static! {
    /// Number of new time series written to the series table.
    pub static ref METRIC_WRITTEN_TIME_SERIES: IntCounter = register_int_counter!(
        "promstore_storage_written_time_series",
        "storage written time series"
    )
    .unwrap();
    /// Current size of the in-memory series index.
    pub static ref METRIC_INDEX_SERIES: IntGauge = register_int_gauge!(
        "promstore_storage_index_series",
        "storage series index size"
    )
    .unwrap();
}
