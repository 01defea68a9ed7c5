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

//! Series fingerprinting, bit-compatible with the Prometheus label set
//! fingerprint (`model.Fingerprint`). The fingerprint is the series
//! identity in both persistent tables and the in-memory index, so the hash
//! must never change.

use api::prom_store::remote::Label;

const OFFSET64: u64 = 14695981039346656037;
const PRIME64: u64 = 1099511628211;
const SEPARATOR_BYTE: u8 = 255;

#[inline]
fn hash_add(mut h: u64, s: &str) -> u64 {
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(PRIME64);
    }
    h
}

#[inline]
fn hash_add_byte(mut h: u64, b: u8) -> u64 {
    h ^= u64::from(b);
    h.wrapping_mul(PRIME64)
}

/// Calculates the FNV-1a fingerprint of labels SORTED BY NAME.
///
/// No canonicalisation beyond the caller's sort is performed; pass the
/// labels through [`sort_labels`] first.
pub fn fingerprint(labels: &[Label]) -> u64 {
    if labels.is_empty() {
        return OFFSET64;
    }

    let mut sum = OFFSET64;
    for l in labels {
        sum = hash_add(sum, &l.name);
        sum = hash_add_byte(sum, SEPARATOR_BYTE);
        sum = hash_add(sum, &l.value);
        sum = hash_add_byte(sum, SEPARATOR_BYTE);
    }
    sum
}

/// Sorts labels by name, in place, into the canonical order.
pub fn sort_labels(labels: &mut [Label]) {
    labels.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{new_label, write_request};

    #[test]
    fn test_empty_labels() {
        // The empty label set fingerprints to the FNV-1a offset.
        assert_eq!(0xCBF29CE484222325, fingerprint(&[]));
    }

    #[test]
    fn test_reference_fingerprint() {
        // Reference vector produced by prometheus/common `model.Fingerprint`.
        let labels = vec![
            new_label("__name__", "http_requests_total"),
            new_label("code", "200"),
            new_label("handler", "query"),
        ];
        assert_eq!(0x145426e4f81508d1, fingerprint(&labels));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let sorted = vec![new_label("a", "1"), new_label("b", "2")];
        let mut reversed = vec![new_label("b", "2"), new_label("a", "1")];
        assert_ne!(fingerprint(&sorted), fingerprint(&reversed));

        sort_labels(&mut reversed);
        assert_eq!(fingerprint(&sorted), fingerprint(&reversed));
    }

    #[test]
    fn test_name_value_boundary() {
        // The 0xFF separator keeps (ab, c) distinct from (a, bc).
        let one = vec![new_label("ab", "c")];
        let other = vec![new_label("a", "bc")];
        assert_ne!(fingerprint(&one), fingerprint(&other));
    }

    #[test]
    fn test_write_request_fingerprints_are_distinct() {
        let request = write_request();
        let mut fingerprints: Vec<u64> = request
            .timeseries
            .iter()
            .map(|ts| fingerprint(&ts.labels))
            .collect();
        fingerprints.sort_unstable();
        fingerprints.dedup();
        assert_eq!(request.timeseries.len(), fingerprints.len());
    }
}
