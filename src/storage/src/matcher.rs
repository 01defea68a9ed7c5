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

//! Label matcher evaluation with the Prometheus selector semantics: a
//! matcher against a label that is absent from the set sees the empty
//! string, so "absent" and "present with empty value" are
//! indistinguishable.

use std::fmt;

use api::prom_store::remote::Label;
use once_cell::sync::OnceCell;
use regex::Regex;
use snafu::ResultExt;

use crate::error::{CompileRegexpSnafu, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regexp,
    NotRegexp,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::Regexp => "=~",
            MatchOp::NotRegexp => "!~",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
    /// Compiled lazily on first use, cached for the matcher's lifetime.
    re: OnceCell<Regex>,
}

impl Matcher {
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
            re: OnceCell::new(),
        }
    }

    /// Regexp matchers are fully anchored, like Prometheus selectors.
    fn regex(&self) -> Result<&Regex> {
        self.re.get_or_try_init(|| {
            Regex::new(&format!("^(?:{})$", self.value)).context(CompileRegexpSnafu {
                pattern: self.value.clone(),
            })
        })
    }

    /// Whether this single matcher holds for the label set.
    pub fn matches(&self, labels: &[Label]) -> Result<bool> {
        let value = labels
            .iter()
            .find(|l| l.name == self.name)
            .map(|l| l.value.as_str())
            .unwrap_or("");

        Ok(match self.op {
            MatchOp::Equal => self.value == value,
            MatchOp::NotEqual => self.value != value,
            MatchOp::Regexp => self.regex()?.is_match(value),
            MatchOp::NotRegexp => !self.regex()?.is_match(value),
        })
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op, self.value)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Matchers(pub Vec<Matcher>);

impl Matchers {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// An empty matcher list, or one in which every matcher carries the
    /// empty value, selects everything. Prometheus itself refuses such
    /// selectors, but replay tooling sends them to mean "all series".
    pub fn is_universal(&self) -> bool {
        self.0.iter().all(|m| m.value.is_empty())
    }

    /// Whether the label set satisfies every matcher.
    pub fn matches(&self, labels: &[Label]) -> Result<bool> {
        if self.is_universal() {
            return Ok(true);
        }
        for m in &self.0 {
            if !m.matches(labels)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Matchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, m) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{m}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::new_label;

    fn labels() -> Vec<Label> {
        vec![
            new_label("__name__", "http_requests_total"),
            new_label("code", "200"),
            new_label("empty", ""),
        ]
    }

    fn holds(m: &Matcher) -> bool {
        m.matches(&labels()).unwrap()
    }

    #[test]
    fn test_equal() {
        assert!(holds(&Matcher::new(MatchOp::Equal, "code", "200")));
        assert!(!holds(&Matcher::new(MatchOp::Equal, "code", "400")));
    }

    #[test]
    fn test_absent_label_semantics() {
        // An absent label is indistinguishable from an empty value.
        assert!(holds(&Matcher::new(MatchOp::Equal, "no_such_label", "")));
        assert!(holds(&Matcher::new(MatchOp::Equal, "empty", "")));
        assert!(!holds(&Matcher::new(MatchOp::NotEqual, "no_such_label", "")));
        assert!(holds(&Matcher::new(MatchOp::Regexp, "no_such_label", ".*")));
        assert!(!holds(&Matcher::new(MatchOp::NotRegexp, "no_such_label", ".*")));
        assert!(!holds(&Matcher::new(MatchOp::Equal, "no_such_label", "v")));
        assert!(holds(&Matcher::new(MatchOp::NotEqual, "no_such_label", "v")));
    }

    #[test]
    fn test_regexp_anchoring() {
        let foobar = vec![new_label("__name__", "foobar")];
        let m = Matcher::new(MatchOp::Regexp, "__name__", "foo");
        assert!(!m.matches(&foobar).unwrap());
        let m = Matcher::new(MatchOp::Regexp, "__name__", "foo.*");
        assert!(m.matches(&foobar).unwrap());
    }

    #[test]
    fn test_bad_regexp() {
        let m = Matcher::new(MatchOp::Regexp, "__name__", "foo(");
        assert!(m.matches(&labels()).is_err());
    }

    #[test]
    fn test_matcher_list() {
        let ms = Matchers(vec![
            Matcher::new(MatchOp::Equal, "__name__", "http_requests_total"),
            Matcher::new(MatchOp::NotEqual, "code", "400"),
        ]);
        assert!(ms.matches(&labels()).unwrap());

        let ms = Matchers(vec![
            Matcher::new(MatchOp::Equal, "__name__", "http_requests_total"),
            Matcher::new(MatchOp::Equal, "code", "400"),
        ]);
        assert!(!ms.matches(&labels()).unwrap());
    }

    #[test]
    fn test_universal_selectors() {
        // Empty list and all-empty-value lists select everything.
        assert!(Matchers(vec![]).matches(&labels()).unwrap());
        let ms = Matchers(vec![Matcher::new(MatchOp::Equal, "code", "")]);
        assert!(ms.is_universal());
        assert!(ms.matches(&labels()).unwrap());
    }

    #[test]
    fn test_display() {
        let ms = Matchers(vec![
            Matcher::new(MatchOp::Equal, "job", "node"),
            Matcher::new(MatchOp::Regexp, "instance", "db.+"),
        ]);
        assert_eq!("{job=\"node\",instance=~\"db.+\"}", ms.to_string());
    }
}
