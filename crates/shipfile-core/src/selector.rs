//! Label selectors
//!
//! A selector set is a list of `key=value` / `key!=value` expressions that
//! must all match (logical AND). Several sets given on the command line are
//! OR-ed together by [`any_matches`].
//!
//! ```text
//! -l name=prometheus -l tier!=frontend
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};

/// Comparison operator of a label expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOp {
    Equal,
    NotEqual,
}

/// A single compiled `key=value` or `key!=value` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelExpr {
    pub key: String,
    pub op: LabelOp,
    pub value: String,
}

impl LabelExpr {
    /// Parse one expression token
    pub fn parse(token: &str) -> Result<Self> {
        let (key, op, value) = if let Some((key, value)) = token.split_once("!=") {
            (key, LabelOp::NotEqual, value)
        } else if let Some((key, value)) = token.split_once('=') {
            (key, LabelOp::Equal, value)
        } else {
            return Err(malformed(token));
        };

        if key.is_empty() || value.is_empty() {
            return Err(malformed(token));
        }

        Ok(Self {
            key: key.to_string(),
            op,
            value: value.to_string(),
        })
    }

    /// Evaluate against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.op {
            LabelOp::Equal => labels.get(&self.key) == Some(&self.value),
            LabelOp::NotEqual => labels.get(&self.key) != Some(&self.value),
        }
    }
}

impl fmt::Display for LabelExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            LabelOp::Equal => "=",
            LabelOp::NotEqual => "!=",
        };
        write!(f, "{}{}{}", self.key, op, self.value)
    }
}

fn malformed(token: &str) -> CoreError {
    CoreError::MalformedLabel {
        token: token.to_string(),
    }
}

/// A compiled selector set: every expression must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    exprs: Vec<LabelExpr>,
}

impl LabelFilter {
    /// Compile raw expression tokens into a filter
    ///
    /// Fails on the first malformed token.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let exprs = tokens
            .iter()
            .map(|t| LabelExpr::parse(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { exprs })
    }

    /// Whether a release carrying `labels` is selected
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.exprs.iter().all(|expr| expr.matches(labels))
    }

    /// The compiled expressions
    pub fn exprs(&self) -> &[LabelExpr] {
        &self.exprs
    }

    /// True if the filter has no expressions and therefore matches everything
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

/// Split a raw `--selector` argument into expression tokens
///
/// A single argument may carry several comma-separated expressions
/// (`tier=backend,name!=redis`); they form one AND-ed set.
pub fn split_selector(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// Compile several raw selector arguments into OR-ed sets
///
/// An empty expression (`a=b,`) is reported with the whole argument.
pub fn parse_selector_sets<S: AsRef<str>>(raw: &[S]) -> Result<Vec<LabelFilter>> {
    raw.iter()
        .map(|r| {
            let raw = r.as_ref();
            LabelFilter::parse(&split_selector(raw)).map_err(|err| match err {
                CoreError::MalformedLabel { token } if token.is_empty() => malformed(raw),
                other => other,
            })
        })
        .collect()
}

/// True if any of the sets selects the labels; no sets selects everything
pub fn any_matches(sets: &[LabelFilter], labels: &BTreeMap<String, String>) -> bool {
    sets.is_empty() || sets.iter().any(|set| set.matches(labels))
}
