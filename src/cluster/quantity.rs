// ABOUTME: Resource quantities as the cluster API serializes them.
// ABOUTME: Parses decimal/binary SI suffixes, milli-units and exponents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource amount such as `8Gi`, `3800m` or `110`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(String);

// (suffix, multiplier, divisor); sub-unit suffixes divide so that "3800m"
// is exactly 3.8.
const SUFFIXES: &[(&str, f64, f64)] = &[
    ("Ki", 1024.0, 1.0),
    ("Mi", 1048576.0, 1.0),
    ("Gi", 1073741824.0, 1.0),
    ("Ti", 1099511627776.0, 1.0),
    ("Pi", 1125899906842624.0, 1.0),
    ("Ei", 1152921504606846976.0, 1.0),
    ("n", 1.0, 1e9),
    ("u", 1.0, 1e6),
    ("m", 1.0, 1e3),
    ("k", 1e3, 1.0),
    ("M", 1e6, 1.0),
    ("G", 1e9, 1.0),
    ("T", 1e12, 1.0),
    ("P", 1e15, 1.0),
    ("E", 1e18, 1.0),
];

impl Quantity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A plain byte (or count) amount.
    pub fn from_units(value: u64) -> Self {
        Self(value.to_string())
    }

    /// A CPU amount expressed in thousandths of a core.
    pub fn from_millis(millis: u64) -> Self {
        Self(format!("{}m", millis))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The amount as a float, `None` when the string is not a quantity.
    pub fn as_f64(&self) -> Option<f64> {
        let s = self.0.trim();
        if s.is_empty() {
            return None;
        }

        for (suffix, mul, div) in SUFFIXES {
            if let Some(number) = s.strip_suffix(suffix) {
                // "1e3" ends in a digit, "5E" would be exa; only accept the
                // suffix when what remains is a number.
                if let Ok(n) = number.parse::<f64>() {
                    return Some(n * mul / div);
                }
            }
        }

        s.parse::<f64>().ok()
    }

    /// Integer value rounded up, the way the cluster reports `Value()`.
    pub fn value(&self) -> Option<i64> {
        self.as_f64().map(|v| v.ceil() as i64)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
