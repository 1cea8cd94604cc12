//! Keys, key ranges and key paths.
//!
//! Keys order across types as `Number < Text < Bytes < Array`. Arrays compare
//! element by element, so an array key doubles as a composite key: `[id, time]`
//! sorts by `id` first, then by `time`, and a proper prefix sorts first.

use crate::error::{EngineError, EngineResult};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

/// An engine key.
#[derive(Debug, Clone)]
pub enum Key {
    /// Numeric key. NaN is never a valid key.
    Number(f64),
    /// UTF-8 text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Composite key, compared element by element.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a binary key.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Key::Bytes(bytes.into())
    }

    /// Creates a composite key.
    pub fn array(parts: impl IntoIterator<Item = Key>) -> Self {
        Key::Array(parts.into_iter().collect())
    }

    /// Checks that the key can be stored.
    ///
    /// # Errors
    ///
    /// Returns `Data` if a number anywhere in the key is NaN.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Key::Number(n) if n.is_nan() => Err(EngineError::data("NaN is not a valid key")),
            Key::Array(parts) => parts.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    /// Converts a record field into a key.
    ///
    /// Numbers, strings and arrays of those convert; null, booleans and
    /// objects do not.
    pub fn from_json(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_f64().map(Key::Number),
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    /// Converts the key back into a record field.
    ///
    /// Bytes become an array of numbers; infinite numbers become null.
    pub fn to_json(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            Key::Text(s) => Value::String(s.clone()),
            Key::Bytes(b) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
            Key::Array(parts) => Value::Array(parts.iter().map(Key::to_json).collect()),
        }
    }

    /// Returns the text of a text key.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value of a numeric key.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the parts of a composite key.
    pub fn as_array(&self) -> Option<&[Key]> {
        match self {
            Key::Array(parts) => Some(parts),
            _ => None,
        }
    }

    /// Returns the smallest key strictly greater than every key that starts
    /// with `self` when `self` is used as the last component of a prefix.
    ///
    /// Used to close composite prefix ranges.
    pub fn successor(&self) -> Key {
        match self {
            Key::Number(n) if *n == f64::INFINITY => Key::Text(String::new()),
            Key::Number(n) => Key::Number(next_up(*n)),
            Key::Text(s) => {
                let mut next = s.clone();
                next.push('\0');
                Key::Text(next)
            }
            Key::Bytes(b) => {
                let mut next = b.clone();
                next.push(0);
                Key::Bytes(next)
            }
            Key::Array(parts) => {
                let mut next = parts.clone();
                next.push(Key::Number(f64::NEG_INFINITY));
                Key::Array(next)
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Bytes(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Key::Array(parts) => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(parts: Vec<Key>) -> Self {
        Key::Array(parts)
    }
}

/// A contiguous range of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// Range matching exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Two-sided range; each side is excluded when its `open` flag is set.
    pub fn bound(lower: impl Into<Key>, upper: impl Into<Key>, lower_open: bool, upper_open: bool) -> Self {
        Self {
            lower: make_bound(lower.into(), lower_open),
            upper: make_bound(upper.into(), upper_open),
        }
    }

    /// Range unbounded above.
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: make_bound(lower.into(), open),
            upper: Bound::Unbounded,
        }
    }

    /// Range unbounded below.
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: make_bound(upper.into(), open),
        }
    }

    /// Range of every composite key starting with `components`.
    ///
    /// `prefix([1])` over an `(id, time)` index matches `[1, t]` for any `t`.
    pub fn prefix(components: Vec<Key>) -> Self {
        let mut upper = components.clone();
        match upper.pop() {
            Some(last) => {
                upper.push(last.successor());
                Self {
                    lower: Bound::Included(Key::Array(components)),
                    upper: Bound::Excluded(Key::Array(upper)),
                }
            }
            None => Self {
                lower: Bound::Included(Key::Array(Vec::new())),
                upper: Bound::Unbounded,
            },
        }
    }

    /// Range from explicit bounds.
    pub fn from_bounds(lower: Bound<Key>, upper: Bound<Key>) -> Self {
        Self { lower, upper }
    }

    /// Range over every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Returns the lower bound.
    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    /// Returns the upper bound.
    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Returns true if the key lies inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(lo) => key >= lo,
            Bound::Excluded(lo) => key > lo,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(hi) => key <= hi,
            Bound::Excluded(hi) => key < hi,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Returns true if no key can lie inside the range.
    ///
    /// A lower bound above the upper bound is an empty range, not an error.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }

    /// Checks both bounds.
    ///
    /// # Errors
    ///
    /// Returns `Data` if a bound is not a valid key.
    pub fn validate(&self) -> EngineResult<()> {
        for bound in [&self.lower, &self.upper] {
            if let Bound::Included(key) | Bound::Excluded(key) = bound {
                key.validate()?;
            }
        }
        Ok(())
    }

    /// Returns the bounds in the form `BTreeMap::range` expects.
    pub fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

fn make_bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

/// The query argument of read requests: an exact key or a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    /// Exactly this key.
    Key(Key),
    /// Every key inside the range.
    Range(KeyRange),
}

impl KeyQuery {
    /// Returns the query as a range.
    pub fn to_range(&self) -> KeyRange {
        match self {
            KeyQuery::Key(key) => KeyRange::only(key.clone()),
            KeyQuery::Range(range) => range.clone(),
        }
    }

    /// Returns true if the key matches.
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            KeyQuery::Key(k) => k == key,
            KeyQuery::Range(range) => range.contains(key),
        }
    }

    /// Checks the key or both bounds.
    ///
    /// # Errors
    ///
    /// Returns `Data` if a key is not valid.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            KeyQuery::Key(key) => key.validate(),
            KeyQuery::Range(range) => range.validate(),
        }
    }
}

impl From<Key> for KeyQuery {
    fn from(key: Key) -> Self {
        KeyQuery::Key(key)
    }
}

impl From<KeyRange> for KeyQuery {
    fn from(range: KeyRange) -> Self {
        KeyQuery::Range(range)
    }
}

impl From<&str> for KeyQuery {
    fn from(s: &str) -> Self {
        KeyQuery::Key(Key::from(s))
    }
}

impl From<i64> for KeyQuery {
    fn from(n: i64) -> Self {
        KeyQuery::Key(Key::from(n))
    }
}

impl From<i32> for KeyQuery {
    fn from(n: i32) -> Self {
        KeyQuery::Key(Key::from(n))
    }
}

/// Where an index finds its key inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    /// One field; dots descend into nested objects.
    Single(String),
    /// Several fields forming a composite key, in declared order.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Extracts the key from a record.
    ///
    /// Returns `None` when a field is missing or not a valid key; such
    /// records are left out of the index.
    pub fn extract(&self, record: &Value) -> Option<Key> {
        match self {
            KeyPath::Single(path) => lookup(record, path)
                .and_then(Key::from_json)
                .filter(|key| key.validate().is_ok()),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|path| {
                    lookup(record, path)
                        .and_then(Key::from_json)
                        .filter(|key| key.validate().is_ok())
                })
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }

    /// Returns the field of a single-field path.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            KeyPath::Single(path) => Some(path),
            KeyPath::Compound(_) => None,
        }
    }

    /// Returns true for composite paths.
    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        KeyPath::Compound(paths.into_iter().map(str::to_string).collect())
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |value, field| value.get(field))
}
