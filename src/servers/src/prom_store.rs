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

//! Codec and conversion layer for the Prometheus remote storage protocol:
//! snappy block (not streaming) compression on the outside, protobuf
//! inside, and the mapping from wire matchers to the storage engine's
//! matcher types.

use std::cell::RefCell;

use api::prom_store::remote::{
    label_matcher, LabelMatcher, ReadRequest, ReadResponse, WriteRequest,
};
use prost::Message;
use snafu::ResultExt;
use storage::matcher::{MatchOp, Matcher, Matchers};
use storage::Query;

use crate::error::{
    CompressRemoteResponseSnafu, DecodeRemoteRequestSnafu, DecompressRemoteRequestSnafu,
    InvalidMatcherTypeSnafu, Result,
};

pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";
pub const CONTENT_ENCODING_SNAPPY: &str = "snappy";

thread_local! {
    // The coders keep their scratch buffers across requests.
    static SNAPPY_ENCODER: RefCell<snap::raw::Encoder> = RefCell::new(snap::raw::Encoder::new());
    static SNAPPY_DECODER: RefCell<snap::raw::Decoder> = RefCell::new(snap::raw::Decoder::new());
}

pub fn snappy_compress(data: &[u8]) -> Result<Vec<u8>> {
    SNAPPY_ENCODER.with(|encoder| {
        encoder
            .borrow_mut()
            .compress_vec(data)
            .context(CompressRemoteResponseSnafu)
    })
}

pub fn snappy_decompress(data: &[u8]) -> Result<Vec<u8>> {
    SNAPPY_DECODER.with(|decoder| {
        decoder
            .borrow_mut()
            .decompress_vec(data)
            .context(DecompressRemoteRequestSnafu)
    })
}

pub fn decode_write_request(body: &[u8]) -> Result<WriteRequest> {
    let buf = snappy_decompress(body)?;
    WriteRequest::decode(&buf[..]).context(DecodeRemoteRequestSnafu)
}

pub fn decode_read_request(body: &[u8]) -> Result<ReadRequest> {
    let buf = snappy_decompress(body)?;
    ReadRequest::decode(&buf[..]).context(DecodeRemoteRequestSnafu)
}

pub fn encode_read_response(response: &ReadResponse) -> Result<Vec<u8>> {
    snappy_compress(&response.encode_to_vec())
}

/// Converts a protobuf read request into storage queries.
pub fn to_queries(request: ReadRequest) -> Result<Vec<Query>> {
    request
        .queries
        .into_iter()
        .map(|q| {
            let matchers = q
                .matchers
                .into_iter()
                .map(to_matcher)
                .collect::<Result<Vec<_>>>()?;
            Ok(Query {
                start_ms: q.start_timestamp_ms,
                end_ms: q.end_timestamp_ms,
                matchers: Matchers(matchers),
            })
        })
        .collect()
}

fn to_matcher(m: LabelMatcher) -> Result<Matcher> {
    let op = match label_matcher::Type::try_from(m.r#type) {
        Ok(label_matcher::Type::Eq) => MatchOp::Equal,
        Ok(label_matcher::Type::Neq) => MatchOp::NotEqual,
        Ok(label_matcher::Type::Re) => MatchOp::Regexp,
        Ok(label_matcher::Type::Nre) => MatchOp::NotRegexp,
        Err(_) => {
            return InvalidMatcherTypeSnafu {
                matcher_type: m.r#type,
            }
            .fail()
        }
    };
    Ok(Matcher::new(op, m.name, m.value))
}

#[cfg(test)]
mod tests {
    use api::prom_store::remote::Query as RemoteQuery;

    use super::*;

    #[test]
    fn test_snappy_roundtrip() {
        let data = b"beep boop";
        let compressed = snappy_compress(data).unwrap();
        let decompressed = snappy_decompress(&compressed).unwrap();
        assert_eq!(data.as_slice(), decompressed);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(snappy_decompress(b"\xff\xff\xff\xff").is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_protobuf() {
        let compressed = snappy_compress(&[0x0a]).unwrap();
        assert!(decode_write_request(&compressed).is_err());
    }

    #[test]
    fn test_to_queries() {
        let request = ReadRequest {
            queries: vec![RemoteQuery {
                start_timestamp_ms: 1_000,
                end_timestamp_ms: 2_000,
                matchers: vec![
                    LabelMatcher {
                        r#type: label_matcher::Type::Eq as i32,
                        name: "__name__".to_string(),
                        value: "up".to_string(),
                    },
                    LabelMatcher {
                        r#type: label_matcher::Type::Nre as i32,
                        name: "job".to_string(),
                        value: "node.*".to_string(),
                    },
                ],
            }],
        };

        let queries = to_queries(request).unwrap();
        assert_eq!(1, queries.len());
        let q = &queries[0];
        assert_eq!(1_000, q.start_ms);
        assert_eq!(2_000, q.end_ms);
        assert_eq!(2, q.matchers.len());
        assert_eq!(MatchOp::Equal, q.matchers.0[0].op);
        assert_eq!(MatchOp::NotRegexp, q.matchers.0[1].op);
    }

    #[test]
    fn test_unknown_matcher_type() {
        let request = ReadRequest {
            queries: vec![RemoteQuery {
                start_timestamp_ms: 0,
                end_timestamp_ms: 0,
                matchers: vec![LabelMatcher {
                    r#type: 17,
                    name: "a".to_string(),
                    value: "b".to_string(),
                }],
            }],
        };
        assert!(to_queries(request).is_err());
    }
}
