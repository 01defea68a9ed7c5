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

//! Prometheus remote read/write endpoints.

use std::time::Instant;

use api::prom_store::remote::ReadResponse;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use common_telemetry::{debug, error, info};
use snafu::ResultExt;

use crate::error::{Result, StorageSnafu};
use crate::http::PromStoreState;
use crate::metrics::{
    result_type, METRIC_READS_STARTED, METRIC_READ_ELAPSED, METRIC_WRITES_STARTED,
    METRIC_WRITE_ELAPSED, METRIC_WRITTEN_SAMPLES,
};
use crate::prom_store::{
    decode_read_request, decode_write_request, encode_read_response, to_queries,
    CONTENT_ENCODING_SNAPPY, CONTENT_TYPE_PROTOBUF,
};

pub struct PromStoreResponse {
    pub content_type: &'static str,
    pub content_encoding: &'static str,
    pub body: Vec<u8>,
}

impl IntoResponse for PromStoreResponse {
    fn into_response(self) -> axum::response::Response {
        (
            [
                (header::CONTENT_TYPE, self.content_type),
                (header::CONTENT_ENCODING, self.content_encoding),
            ],
            self.body,
        )
            .into_response()
    }
}

pub async fn remote_write(
    State(state): State<PromStoreState>,
    body: Bytes,
) -> Result<StatusCode> {
    METRIC_WRITES_STARTED.inc();
    let start = Instant::now();

    let result = handle_write(&state, &body).await;
    let elapsed = start.elapsed();
    METRIC_WRITE_ELAPSED
        .with_label_values(&[result_type(&result)])
        .observe(elapsed.as_secs_f64());

    match result {
        Ok(samples) => {
            debug!("Wrote {samples} samples in {elapsed:?}");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!("POST /write -> 400, {e} ({elapsed:?})");
            Err(e)
        }
    }
}

async fn handle_write(state: &PromStoreState, body: &[u8]) -> Result<usize> {
    let request = decode_write_request(body)?;
    let samples: usize = request.timeseries.iter().map(|ts| ts.samples.len()).sum();

    let ctx = state.cancel.child_token();
    state
        .storage
        .write(&ctx, request)
        .await
        .context(StorageSnafu)?;

    METRIC_WRITTEN_SAMPLES.inc_by(samples as u64);
    Ok(samples)
}

pub async fn remote_read(
    State(state): State<PromStoreState>,
    body: Bytes,
) -> Result<PromStoreResponse> {
    METRIC_READS_STARTED.inc();
    let start = Instant::now();

    let result = handle_read(&state, &body).await;
    let elapsed = start.elapsed();
    METRIC_READ_ELAPSED
        .with_label_values(&[result_type(&result)])
        .observe(elapsed.as_secs_f64());

    match result {
        Ok(response) => {
            info!("POST /read -> 200 ({elapsed:?})");
            Ok(response)
        }
        Err(e) => {
            error!("POST /read -> 400, {e} ({elapsed:?})");
            Err(e)
        }
    }
}

async fn handle_read(state: &PromStoreState, body: &[u8]) -> Result<PromStoreResponse> {
    let request = decode_read_request(body)?;
    let queries = to_queries(request)?;
    for (i, q) in queries.iter().enumerate() {
        info!("Query {}: {}", i + 1, q);
    }

    let ctx = state.cancel.child_token();
    let results = state
        .storage
        .read(&ctx, queries)
        .await
        .context(StorageSnafu)?;

    let body = encode_read_response(&ReadResponse { results })?;
    Ok(PromStoreResponse {
        content_type: CONTENT_TYPE_PROTOBUF,
        content_encoding: CONTENT_ENCODING_SNAPPY,
        body,
    })
}
