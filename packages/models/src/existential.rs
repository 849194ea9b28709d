//! Tri-state currency flags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RecordError;

/// A boolean-like flag that may also be unknown.
///
/// Serialized as the integers `-1`, `0` and `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Existential {
    /// Not known, or deliberately ignored (`-1`).
    #[default]
    Unknown,
    /// `0`.
    False,
    /// `1`.
    True,
}

impl Existential {
    /// Returns the flag as its integer form.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::False => 0,
            Self::True => 1,
        }
    }

    /// Converts an integer flag.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidExistential`] for values other than
    /// `-1`, `0` and `1`.
    pub fn from_i64(value: i64) -> Result<Self, RecordError> {
        match value {
            -1 => Ok(Self::Unknown),
            0 => Ok(Self::False),
            1 => Ok(Self::True),
            other => Err(RecordError::InvalidExistential(other.to_string())),
        }
    }

    /// Converts a plain boolean.
    #[must_use]
    pub const fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl FromStr for Existential {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| RecordError::InvalidExistential(s.to_string()))?;
        Self::from_i64(value).map_err(|_| RecordError::InvalidExistential(s.to_string()))
    }
}

impl std::fmt::Display for Existential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

impl Serialize for Existential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for Existential {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::from_i64(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_strings() {
        assert_eq!("-1".parse::<Existential>().unwrap(), Existential::Unknown);
        assert_eq!("0".parse::<Existential>().unwrap(), Existential::False);
        assert_eq!(" 1 ".parse::<Existential>().unwrap(), Existential::True);
        assert!("2".parse::<Existential>().is_err());
        assert!("yes".parse::<Existential>().is_err());
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Existential::True).unwrap(), "1");
        let flag: Existential = serde_json::from_str("-1").unwrap();
        assert_eq!(flag, Existential::Unknown);
    }
}
