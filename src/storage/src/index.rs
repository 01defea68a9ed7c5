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

//! The in-memory series index: fingerprint to canonical label set, shared
//! by the write path, the read path and the reloader. Entries are only
//! ever added; the index grows monotonically for the life of the process.

use std::collections::HashMap;
use std::sync::RwLock;

use api::prom_store::remote::Label;

use crate::error::Result;
use crate::matcher::Matchers;

pub struct SeriesIndex {
    series: RwLock<HashMap<u64, Vec<Label>>>,
}

impl SeriesIndex {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::with_capacity(8192)),
        }
    }

    pub fn len(&self) -> usize {
        self.series.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the labels stored for the fingerprint, if known.
    pub fn lookup(&self, fingerprint: u64) -> Option<Vec<Label>> {
        self.series.read().unwrap().get(&fingerprint).cloned()
    }

    /// Interns a single series whose labels are already in canonical order.
    /// Takes the write lock only if the fingerprint is absent; returns the
    /// fingerprint and whether it was new.
    pub fn intern(&self, labels: &[Label]) -> (u64, bool) {
        let fingerprint = crate::fingerprint::fingerprint(labels);
        if self.series.read().unwrap().contains_key(&fingerprint) {
            return (fingerprint, false);
        }
        let mut series = self.series.write().unwrap();
        // A concurrent writer may have won the race for this fingerprint.
        let is_new = series.insert(fingerprint, labels.to_vec()).is_none();
        (fingerprint, is_new)
    }

    /// Copies the whole mapping; reload bookkeeping and tests only.
    pub fn snapshot(&self) -> HashMap<u64, Vec<Label>> {
        self.series.read().unwrap().clone()
    }

    /// Interns a batch of series under one write lock and returns the
    /// entries that were previously unknown, i.e. the ones the caller must
    /// persist. Entries become visible to concurrent readers immediately,
    /// before any database write.
    pub fn split_new(&self, batch: &HashMap<u64, Vec<Label>>) -> Vec<(u64, Vec<Label>)> {
        let mut new_series = Vec::new();
        let mut series = self.series.write().unwrap();
        for (fingerprint, labels) in batch {
            if !series.contains_key(fingerprint) {
                series.insert(*fingerprint, labels.clone());
                new_series.push((*fingerprint, labels.clone()));
            }
        }
        new_series
    }

    /// Adds entries that are not already present; existing entries are
    /// never overwritten and nothing is ever removed. Returns the number of
    /// entries that were unknown to this instance.
    pub fn merge(&self, other: HashMap<u64, Vec<Label>>) -> usize {
        let mut added = 0;
        let mut series = self.series.write().unwrap();
        for (fingerprint, labels) in other {
            series.entry(fingerprint).or_insert_with(|| {
                added += 1;
                labels
            });
        }
        added
    }

    /// Scans the index and returns the fingerprints whose label sets
    /// satisfy every matcher, sorted for deterministic query text.
    pub fn matching_fingerprints(&self, matchers: &Matchers) -> Result<Vec<u64>> {
        let series = self.series.read().unwrap();
        let mut fingerprints = Vec::with_capacity(64);
        for (fingerprint, labels) in series.iter() {
            if matchers.matches(labels)? {
                fingerprints.push(*fingerprint);
            }
        }
        drop(series);
        fingerprints.sort_unstable();
        Ok(fingerprints)
    }
}

impl Default for SeriesIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::matcher::{MatchOp, Matcher};
    use crate::test_util::new_label;

    fn batch() -> HashMap<u64, Vec<Label>> {
        let mut batch = HashMap::new();
        for code in ["200", "400"] {
            let labels = vec![
                new_label("__name__", "http_requests_total"),
                new_label("code", code),
            ];
            batch.insert(fingerprint(&labels), labels);
        }
        batch
    }

    #[test]
    fn test_split_new_dedup() {
        let index = SeriesIndex::new();
        let new_series = index.split_new(&batch());
        assert_eq!(2, new_series.len());
        assert_eq!(2, index.len());

        // A second write of the same series finds nothing new.
        assert!(index.split_new(&batch()).is_empty());
        assert_eq!(2, index.len());
    }

    #[test]
    fn test_merge_is_idempotent_and_lossless() {
        let index = SeriesIndex::new();
        index.split_new(&batch());
        let len = index.len();

        // Merging the same snapshot repeatedly changes nothing.
        for _ in 0..3 {
            assert_eq!(0, index.merge(batch()));
            assert_eq!(len, index.len());
        }

        // A merge that misses known entries does not remove them, and
        // never overwrites what is already present.
        let labels = vec![new_label("__name__", "up")];
        let fp = fingerprint(&labels);
        let mut other = HashMap::new();
        other.insert(fp, labels.clone());
        assert_eq!(1, index.merge(other));
        assert_eq!(len + 1, index.len());

        let mut conflicting = HashMap::new();
        conflicting.insert(fp, vec![new_label("__name__", "down")]);
        assert_eq!(0, index.merge(conflicting));
        assert_eq!(Some(labels), index.lookup(fp));
    }

    #[test]
    fn test_intern() {
        let index = SeriesIndex::new();
        let labels = vec![new_label("__name__", "up"), new_label("job", "node")];

        let (fp, is_new) = index.intern(&labels);
        assert!(is_new);
        assert_eq!(fingerprint(&labels), fp);
        assert_eq!(Some(labels.clone()), index.lookup(fp));

        let (fp_again, is_new) = index.intern(&labels);
        assert!(!is_new);
        assert_eq!(fp, fp_again);
        assert_eq!(1, index.len());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let index = SeriesIndex::new();
        index.split_new(&batch());

        let snapshot = index.snapshot();
        assert_eq!(index.len(), snapshot.len());

        // Mutating the index afterwards does not touch the snapshot.
        index.intern(&[new_label("__name__", "up")]);
        assert_eq!(snapshot.len() + 1, index.len());
    }

    #[test]
    fn test_matching_fingerprints() {
        let index = SeriesIndex::new();
        index.split_new(&batch());

        let ms = Matchers(vec![Matcher::new(MatchOp::Equal, "code", "200")]);
        assert_eq!(1, index.matching_fingerprints(&ms).unwrap().len());

        let ms = Matchers(vec![Matcher::new(
            MatchOp::Equal,
            "__name__",
            "http_requests_total",
        )]);
        let fingerprints = index.matching_fingerprints(&ms).unwrap();
        assert_eq!(2, fingerprints.len());
        assert!(fingerprints.windows(2).all(|w| w[0] < w[1]));

        let ms = Matchers(vec![Matcher::new(MatchOp::Equal, "code", "500")]);
        assert!(index.matching_fingerprints(&ms).unwrap().is_empty());
    }
}
