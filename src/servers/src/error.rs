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

use std::net::SocketAddr;

use axum::http::StatusCode as HttpStatusCode;
use axum::response::{IntoResponse, Response};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to decompress prometheus remote request, source: {}", source))]
    DecompressRemoteRequest { source: snap::Error },

    #[snafu(display("Failed to compress prometheus remote response, source: {}", source))]
    CompressRemoteResponse { source: snap::Error },

    #[snafu(display("Failed to decode prometheus remote request, source: {}", source))]
    DecodeRemoteRequest { source: prost::DecodeError },

    #[snafu(display("Invalid label matcher type: {}", matcher_type))]
    InvalidMatcherType { matcher_type: i32 },

    #[snafu(display("Storage error, source: {}", source))]
    Storage { source: storage::error::Error },

    #[snafu(display("{} server is already started", server))]
    AlreadyStarted { server: String },

    #[snafu(display("Failed to bind address {}, source: {}", addr, source))]
    AddressBind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("Internal error: {}", err_msg))]
    Internal { err_msg: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Storage { source } if source.is_canceled())
    }
}

/// Every error that travels through a handler becomes an HTTP 400 with the
/// error text as plaintext body; the remote protocol has no richer error
/// shape.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (HttpStatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
