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

//! Canonical JSON encoding of label sets, the on-disk representation in the
//! `time_series.labels` column. The encoding is compatible with ClickHouse
//! JSON functions (`visitParamExtractString` and friends), so the escaper
//! is deliberately minimal: only `\` `"` and the three named control
//! characters are escaped, everything else (including multi-byte UTF-8) is
//! emitted verbatim. No `\uXXXX` sequences are ever produced.

use std::collections::HashMap;

use api::prom_store::remote::Label;
use snafu::ResultExt;

use crate::error::{MalformedLabelJsonSnafu, Result};

/// Appends labels as a compact JSON object to `buf`, preserving the given
/// label order. Label names come from the Prometheus label grammar and
/// never contain characters that need escaping.
pub fn marshal_labels(labels: &[Label], buf: &mut String) {
    if labels.is_empty() {
        buf.push_str("{}");
        return;
    }

    buf.push('{');
    for l in labels {
        buf.push('"');
        buf.push_str(&l.name);
        buf.push_str("\":\"");

        for c in l.value.chars() {
            match c {
                '\\' | '"' => {
                    buf.push('\\');
                    buf.push(c);
                }
                '\n' => buf.push_str("\\n"),
                '\r' => buf.push_str("\\r"),
                '\t' => buf.push_str("\\t"),
                _ => buf.push(c),
            }
        }

        buf.push_str("\",");
    }
    // replace last comma
    buf.pop();
    buf.push('}');
}

/// Parses a JSON object into labels. Accepts any standard JSON object, not
/// only the output of [`marshal_labels`]. The order of the result is
/// unspecified; callers must sort before fingerprinting.
pub fn unmarshal_labels(data: &str) -> Result<Vec<Label>> {
    let m: HashMap<String, String> =
        serde_json::from_str(data).context(MalformedLabelJsonSnafu)?;
    Ok(m.into_iter()
        .map(|(name, value)| Label { name, value })
        .collect())
}
