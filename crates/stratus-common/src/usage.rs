use serde::Serialize;

use crate::binary::bytes_to_gib;
use crate::capacity::Capacity;
use crate::error::SlotError;
use crate::slots::{ResourceSlotRecord, SlotUnit};

/// Display symbol for an unbounded quantity.
pub const UNLIMITED_SYMBOL: &str = "∞";

/// Display symbol for a value that is not available (masked or NaN).
pub const NOT_AVAILABLE_SYMBOL: &str = "-";

/// Per-resource utilization derived from an occupied/available pair.
/// Created fresh on every view pass and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedUsage {
    pub used: f64,
    pub capacity: Capacity,
    /// `None` when the capacity is unbounded; division never happens then.
    pub ratio: Option<f64>,
    pub percent_text: String,
    pub unit: SlotUnit,
}

impl NormalizedUsage {
    pub fn with_unit(mut self, unit: SlotUnit) -> Self {
        self.unit = unit;
        self
    }
}

/// Utilization of `used` against `capacity`.
///
/// Unbounded capacity yields no ratio and the `∞` symbol. A finite
/// capacity of zero or less yields a flat zero ratio: that is what an
/// unprovisioned resource looks like, and it must not divide.
pub fn compute_usage(used: f64, capacity: Capacity) -> NormalizedUsage {
    let (ratio, percent_text) = match capacity {
        Capacity::Unlimited => (None, UNLIMITED_SYMBOL.to_string()),
        Capacity::Finite(c) if c <= 0.0 => (Some(0.0), "0.00".to_string()),
        Capacity::Finite(c) => {
            let r = used / c;
            (Some(r), format!("{:.2}", r * 100.0))
        }
    };
    NormalizedUsage {
        used,
        capacity,
        ratio,
        percent_text,
        unit: SlotUnit::Count,
    }
}

/// NaN-rejecting front door for callers handing over unvalidated numbers.
pub fn try_compute_usage(used: f64, capacity: Capacity) -> Result<NormalizedUsage, SlotError> {
    if used.is_nan() {
        return Err(SlotError::InvalidInput("used is NaN".into()));
    }
    if matches!(capacity, Capacity::Finite(c) if c.is_nan()) {
        return Err(SlotError::InvalidInput("capacity is NaN".into()));
    }
    Ok(compute_usage(used, capacity))
}

/// Normalize a numeric limit field for display: the unbounded sentinels
/// (`0`, infinity, the safe-max integer) become `∞`, NaN becomes `-`,
/// anything else renders as a plain decimal string.
pub fn mark_if_unlimited(value: f64) -> String {
    if value.is_nan() {
        return NOT_AVAILABLE_SYMBOL.to_string();
    }
    match Capacity::from_limit(value) {
        Capacity::Unlimited => UNLIMITED_SYMBOL.to_string(),
        Capacity::Finite(v) => Capacity::Finite(v).to_string(),
    }
}

/// String-typed twin of [`mark_if_unlimited`]: sentinel spellings
/// (`"0"`, `"-"`, `"Unlimited"`, `"Infinity"`) become `∞`, `"NaN"`
/// becomes `-`, and any other text passes through unchanged.
pub fn mark_if_unlimited_text(raw: &str) -> String {
    let t = raw.trim();
    match t.to_ascii_lowercase().as_str() {
        "0" | "-" | "unlimited" | "infinity" | "inf" => return UNLIMITED_SYMBOL.to_string(),
        "nan" => return NOT_AVAILABLE_SYMBOL.to_string(),
        _ => {}
    }
    if let Ok(n) = t.parse::<f64>() {
        if !n.is_nan() && Capacity::from_limit(n).is_unlimited() {
            return UNLIMITED_SYMBOL.to_string();
        }
    }
    raw.to_string()
}

/// One row of a resource-usage table.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRow {
    pub key: String,
    pub label: String,
    /// Display magnitude: GiB-converted for byte slots, plain otherwise.
    pub used_text: String,
    pub capacity_text: String,
    pub usage: NormalizedUsage,
}

impl UsageRow {
    pub fn unit_suffix(&self) -> &'static str {
        self.usage.unit.display_suffix()
    }
}

/// Display magnitude for one slot amount: GiB-converted for byte slots,
/// plain decimal otherwise, with the NaN and infinity symbols applied.
pub fn display_slot_amount(v: f64, unit: SlotUnit) -> String {
    if v.is_nan() {
        return NOT_AVAILABLE_SYMBOL.to_string();
    }
    if v.is_infinite() {
        return UNLIMITED_SYMBOL.to_string();
    }
    match unit {
        SlotUnit::Bytes => bytes_to_gib(v, 1).unwrap_or_else(|_| NOT_AVAILABLE_SYMBOL.to_string()),
        SlotUnit::Count => Capacity::Finite(v).to_string(),
    }
}

/// Like [`display_slot_amount`] but over a capacity, so unlimited caps
/// render as the symbol without round-tripping through infinity.
pub fn display_capacity(c: Capacity, unit: SlotUnit) -> String {
    match c {
        Capacity::Unlimited => UNLIMITED_SYMBOL.to_string(),
        Capacity::Finite(v) => display_slot_amount(v, unit),
    }
}

/// Build the per-resource usage table shared by the agent, session,
/// keypair, and policy views. Rows follow the capacity record's kinds;
/// occupancy missing a kind reads as zero.
pub fn usage_rows(occupied: &ResourceSlotRecord, available: &ResourceSlotRecord) -> Vec<UsageRow> {
    available
        .iter()
        .map(|(kind, cap)| {
            let unit = kind.unit();
            let used = occupied.amount(kind);
            let usage = compute_usage(used, *cap).with_unit(unit);
            UsageRow {
                key: kind.as_str().to_string(),
                label: kind.label().to_string(),
                used_text: display_slot_amount(used, unit),
                capacity_text: display_capacity(*cap, unit),
                usage,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::SAFE_MAX_INT;
    use crate::slots::parse_slots;

    #[test]
    fn half_used_is_fifty_percent() {
        let u = compute_usage(512.0, Capacity::Finite(1024.0));
        assert_eq!(u.ratio, Some(0.5));
        assert_eq!(u.percent_text, "50.00");
    }

    #[test]
    fn zero_capacity_never_divides() {
        let u = compute_usage(3.0, Capacity::Finite(0.0));
        assert_eq!(u.ratio, Some(0.0));
        assert_eq!(u.percent_text, "0.00");
    }

    #[test]
    fn unlimited_capacity_has_no_ratio() {
        for cap in [
            Capacity::Unlimited,
            Capacity::from_value(f64::INFINITY),
            Capacity::from_value(SAFE_MAX_INT),
            Capacity::from_limit(0.0),
            Capacity::parse("Unlimited").unwrap(),
            Capacity::parse("-").unwrap(),
            Capacity::parse("Infinity").unwrap(),
        ] {
            let u = compute_usage(7.0, cap);
            assert_eq!(u.ratio, None);
            assert_eq!(u.percent_text, UNLIMITED_SYMBOL);
        }
    }

    #[test]
    fn ratio_stays_in_unit_interval_when_within_capacity() {
        for (u, c) in [(0.0, 1.0), (1.0, 4.0), (1024.0, 1024.0), (3.0, 7.5)] {
            let r = compute_usage(u, Capacity::Finite(c)).ratio.unwrap();
            assert!((0.0..=1.0).contains(&r), "u={u} c={c} r={r}");
        }
    }

    #[test]
    fn nan_inputs_are_rejected_at_the_typed_door() {
        assert!(try_compute_usage(f64::NAN, Capacity::Finite(1.0)).is_err());
        assert!(try_compute_usage(1.0, Capacity::Finite(f64::NAN)).is_err());
        assert!(try_compute_usage(1.0, Capacity::Finite(2.0)).is_ok());
    }

    #[test]
    fn every_sentinel_marks_unlimited() {
        assert_eq!(mark_if_unlimited(0.0), UNLIMITED_SYMBOL);
        assert_eq!(mark_if_unlimited(f64::INFINITY), UNLIMITED_SYMBOL);
        assert_eq!(mark_if_unlimited(SAFE_MAX_INT), UNLIMITED_SYMBOL);
        for s in ["0", "-", "Unlimited", "Infinity", "9007199254740991"] {
            assert_eq!(mark_if_unlimited_text(s), UNLIMITED_SYMBOL, "{s}");
        }
    }

    #[test]
    fn nan_marks_not_available() {
        assert_eq!(mark_if_unlimited(f64::NAN), NOT_AVAILABLE_SYMBOL);
        assert_eq!(mark_if_unlimited_text("NaN"), NOT_AVAILABLE_SYMBOL);
    }

    #[test]
    fn real_values_pass_through() {
        assert_eq!(mark_if_unlimited(7.0), "7");
        assert_eq!(mark_if_unlimited(2.5), "2.5");
        assert_eq!(mark_if_unlimited_text("30"), "30");
        assert_eq!(mark_if_unlimited_text("4 weeks"), "4 weeks");
    }

    #[test]
    fn rows_follow_capacity_and_convert_bytes() {
        let occupied = parse_slots(r#"{"cpu":"2","mem":"1073741824"}"#).unwrap();
        let available = parse_slots(r#"{"cpu":"8","mem":"4294967296","cuda.device":"2"}"#).unwrap();
        let rows = usage_rows(&occupied, &available);
        assert_eq!(rows.len(), 3);

        let cpu = &rows[0];
        assert_eq!(cpu.key, "cpu");
        assert_eq!(cpu.label, "CPU");
        assert_eq!(cpu.usage.percent_text, "25.00");
        assert_eq!(cpu.used_text, "2");
        assert_eq!(cpu.capacity_text, "8");

        let mem = &rows[1];
        assert_eq!(mem.key, "mem");
        assert_eq!(mem.unit_suffix(), "GiB");
        assert_eq!(mem.used_text, "1.0");
        assert_eq!(mem.capacity_text, "4.0");
        assert_eq!(mem.usage.percent_text, "25.00");

        // no gpu occupancy recorded: reads as zero
        let gpu = &rows[2];
        assert_eq!(gpu.key, "cuda.device");
        assert_eq!(gpu.usage.ratio, Some(0.0));
    }

    #[test]
    fn unlimited_capacity_row_shows_symbol() {
        let occupied = parse_slots(r#"{"mem":"1073741824"}"#).unwrap();
        let available = parse_slots(r#"{"mem":"Infinity"}"#).unwrap();
        let rows = usage_rows(&occupied, &available);
        assert_eq!(rows[0].capacity_text, UNLIMITED_SYMBOL);
        assert_eq!(rows[0].usage.ratio, None);
        assert_eq!(rows[0].used_text, "1.0");
    }
}
