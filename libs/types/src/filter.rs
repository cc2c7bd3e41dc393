//! Name and attribute filters evaluated on the owning member.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Serializable string predicate used for attribute selection and name
/// queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    All,
    Names(BTreeSet<String>),
    Prefix(String),
    Contains(String),
    Not(Box<Filter>),
}

impl Filter {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn evaluate(&self, candidate: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Names(names) => names.contains(candidate),
            Filter::Prefix(prefix) => candidate.starts_with(prefix.as_str()),
            Filter::Contains(fragment) => candidate.contains(fragment.as_str()),
            Filter::Not(inner) => !inner.evaluate(candidate),
        }
    }
}
