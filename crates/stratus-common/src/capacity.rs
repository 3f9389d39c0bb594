use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SlotError;

/// Largest integer the backend stores losslessly in a numeric column.
/// Values at or above this are sentinels for "no cap enforced".
pub const SAFE_MAX_INT: f64 = 9_007_199_254_740_991.0;

/// A resource quantity that is either a real finite amount or unbounded.
///
/// Introduced at the ingestion boundary so downstream code never has to
/// match the backend's sentinel zoo (`0`, `"-"`, `"Unlimited"`, `Infinity`,
/// the safe-max integer) by hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capacity {
    Finite(f64),
    Unlimited,
}

impl Capacity {
    /// Interpret a raw slot quantity. `0` stays finite here: an agent with
    /// zero devices of some kind has a real capacity of zero.
    pub fn from_value(v: f64) -> Self {
        if v.is_infinite() && v > 0.0 {
            return Capacity::Unlimited;
        }
        if v >= SAFE_MAX_INT {
            return Capacity::Unlimited;
        }
        Capacity::Finite(v)
    }

    /// Interpret a policy limit field, where the backend overloads `0`
    /// to mean "no cap enforced".
    pub fn from_limit(v: f64) -> Self {
        if v == 0.0 {
            return Capacity::Unlimited;
        }
        Capacity::from_value(v)
    }

    /// Parse the string forms the backend emits for quantities.
    pub fn parse(s: &str) -> Result<Self, SlotError> {
        let t = s.trim();
        match t.to_ascii_lowercase().as_str() {
            "infinity" | "inf" | "unlimited" | "-" => return Ok(Capacity::Unlimited),
            _ => {}
        }
        let n: f64 = t
            .parse()
            .map_err(|_| SlotError::Parse(format!("not a quantity: {t:?}")))?;
        if n.is_nan() {
            return Err(SlotError::InvalidInput("NaN quantity".into()));
        }
        Ok(Capacity::from_value(n))
    }

    /// Interpret a decoded JSON scalar (the backend emits both numbers and
    /// numeric strings in slot payloads).
    pub fn from_json_value(v: &serde_json::Value) -> Result<Self, SlotError> {
        match v {
            serde_json::Value::Number(n) => {
                let f = n
                    .as_f64()
                    .ok_or_else(|| SlotError::Parse(format!("unrepresentable number: {n}")))?;
                Ok(Capacity::from_value(f))
            }
            serde_json::Value::String(s) => Capacity::parse(s),
            other => Err(SlotError::Parse(format!("not a quantity: {other}"))),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Capacity::Unlimited)
    }

    pub fn as_finite(&self) -> Option<f64> {
        match self {
            Capacity::Finite(v) => Some(*v),
            Capacity::Unlimited => None,
        }
    }

    /// Saturating addition. Unlimited absorbs.
    pub fn add(self, other: Capacity) -> Capacity {
        match (self, other) {
            (Capacity::Finite(a), Capacity::Finite(b)) => Capacity::Finite(a + b),
            _ => Capacity::Unlimited,
        }
    }

    /// Subtraction clamped at zero. An unlimited pool never depletes.
    pub fn sub_clamped(self, used: f64) -> Capacity {
        match self {
            Capacity::Finite(a) => Capacity::Finite((a - used).max(0.0)),
            Capacity::Unlimited => Capacity::Unlimited,
        }
    }

    /// Whether a request of `amount` fits in this capacity.
    pub fn admits(&self, amount: f64) -> bool {
        match self {
            Capacity::Finite(a) => amount <= *a,
            Capacity::Unlimited => true,
        }
    }
}

/// Wire form: plain decimal string, never scientific notation, `"Infinity"`
/// for unbounded. Matches what the backend stores in slot columns.
impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Finite(v) => write!(f, "{v}"),
            Capacity::Unlimited => write!(f, "Infinity"),
        }
    }
}

impl Serialize for Capacity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Capacity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        Capacity::from_json_value(&v).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_slot_capacity_is_finite() {
        assert_eq!(Capacity::from_value(0.0), Capacity::Finite(0.0));
    }

    #[test]
    fn zero_limit_is_unlimited() {
        assert!(Capacity::from_limit(0.0).is_unlimited());
        assert_eq!(Capacity::from_limit(4.0), Capacity::Finite(4.0));
    }

    #[test]
    fn safe_max_and_infinity_are_unlimited() {
        assert!(Capacity::from_value(f64::INFINITY).is_unlimited());
        assert!(Capacity::from_value(SAFE_MAX_INT).is_unlimited());
        assert!(Capacity::from_limit(SAFE_MAX_INT).is_unlimited());
    }

    #[test]
    fn parses_sentinel_strings() {
        for s in ["Infinity", "inf", "Unlimited", "-", "  unlimited "] {
            assert!(Capacity::parse(s).unwrap().is_unlimited(), "{s}");
        }
        assert_eq!(Capacity::parse("4294967296").unwrap(), Capacity::Finite(4294967296.0));
        assert!(Capacity::parse("NaN").is_err());
        assert!(Capacity::parse("lots").is_err());
    }

    #[test]
    fn wire_form_avoids_scientific_notation() {
        assert_eq!(Capacity::Finite(4294967296.0).to_string(), "4294967296");
        assert_eq!(Capacity::Finite(2.0).to_string(), "2");
        assert_eq!(Capacity::Finite(0.5).to_string(), "0.5");
        assert_eq!(Capacity::Unlimited.to_string(), "Infinity");
    }

    #[test]
    fn algebra_absorbs_unlimited() {
        assert_eq!(
            Capacity::Finite(2.0).add(Capacity::Finite(3.0)),
            Capacity::Finite(5.0)
        );
        assert!(Capacity::Finite(2.0).add(Capacity::Unlimited).is_unlimited());
        assert_eq!(Capacity::Finite(2.0).sub_clamped(5.0), Capacity::Finite(0.0));
        assert!(Capacity::Unlimited.sub_clamped(1e12).is_unlimited());
        assert!(Capacity::Unlimited.admits(1e18));
        assert!(!Capacity::Finite(1.0).admits(2.0));
    }
}
