//! Loose header values and additive header merging.

use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::Result;

/// A loosely typed value accepted wherever headers or query parameters are
/// assembled from caller input.
///
/// Callers rarely hold `HeaderValue`s; they hold strings, numbers and flags.
/// `Scalar` carries those as-is and stringifies late, so a descriptor can be
/// assembled without conversions at every call site.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A string value.
    Str(String),
    /// An integer value.
    Int(i64),
    /// A float value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(v) => f.write_str(v),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value as i64)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Int(value as i64)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Build a `HeaderMap` from loose `(name, value)` pairs.
///
/// Pairs whose value is `None` are dropped; every other value is
/// stringified. Repeated names are appended, not overwritten.
pub fn from_pairs<I, K, V>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: Into<Scalar>,
{
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let Some(value) = value else { continue };
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())?;
        let value = HeaderValue::from_str(&value.into().to_string())?;
        map.append(name, value);
    }
    Ok(map)
}

/// Additively merge two header maps.
///
/// Base entries come first, overlay entries are appended after them, so
/// multi-valued headers such as `Accept` keep every value in insertion
/// order. Merging the same inputs twice yields the same multiset.
pub fn merge(base: &HeaderMap, overlay: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for (name, value) in overlay {
        merged.append(name.clone(), value.clone());
    }
    merged
}
