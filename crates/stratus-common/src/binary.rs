use crate::capacity::Capacity;
use crate::error::SlotError;

pub const BYTES_PER_GIB: u64 = 1 << 30;

const SUFFIXES: [(char, u128); 8] = [
    ('k', 1 << 10),
    ('m', 1 << 20),
    ('g', 1 << 30),
    ('t', 1 << 40),
    ('p', 1 << 50),
    ('e', 1 << 60),
    ('z', 1 << 70),
    ('y', 1 << 80),
];

const ENDINGS: [&str; 6] = ["ibytes", "ibyte", "ib", "bytes", "byte", "b"];

/// Convert a raw byte count to a GiB string with fixed precision.
pub fn bytes_to_gib(bytes: f64, precision: usize) -> Result<String, SlotError> {
    if !bytes.is_finite() {
        return Err(SlotError::InvalidInput(format!(
            "byte count must be finite, got {bytes}"
        )));
    }
    let gib = bytes / BYTES_PER_GIB as f64;
    Ok(format!("{gib:.precision$}"))
}

/// Inverse of [`bytes_to_gib`]: GiB value back to whole bytes.
pub fn gib_to_bytes(value: f64) -> Result<u64, SlotError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SlotError::InvalidInput(format!(
            "GiB value must be finite and non-negative, got {value}"
        )));
    }
    Ok((value * BYTES_PER_GIB as f64).round() as u64)
}

fn suffix_multiplier(suffix: char) -> Option<u128> {
    SUFFIXES
        .iter()
        .find(|(c, _)| *c == suffix)
        .map(|(_, mult)| *mult)
}

/// Parse a human-entered size expression: `"512"`, `"2g"`, `"1.5k"`,
/// `"256MiB"`, `"2gbytes"`. `"inf"`/`"infinite"`/`"infinity"` mean
/// unbounded. Fractional values require a scale suffix.
pub fn parse_binary_size(expr: &str) -> Result<Capacity, SlotError> {
    let cleaned = expr.trim().replace('_', "").to_ascii_lowercase();
    if matches!(cleaned.as_str(), "inf" | "infinite" | "infinity") {
        return Ok(Capacity::Unlimited);
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return Ok(Capacity::Finite(n as f64));
    }

    let bad = || SlotError::Parse(format!("unconvertible size: {expr:?}"));

    let (num_part, suffix) = match ENDINGS.iter().find(|e| cleaned.ends_with(*e)) {
        Some(ending) => {
            let head = &cleaned[..cleaned.len() - ending.len()];
            let suffix = head.chars().last().ok_or_else(bad)?;
            (&head[..head.len() - suffix.len_utf8()], suffix)
        }
        None => {
            let last = cleaned.chars().last().ok_or_else(bad)?;
            if last.is_ascii_digit() {
                // no suffix and not an integer: fractional bytes
                return Err(SlotError::Parse(format!(
                    "fractional bytes are not allowed: {expr:?}"
                )));
            }
            (&cleaned[..cleaned.len() - last.len_utf8()], last)
        }
    };

    let mult = suffix_multiplier(suffix).ok_or_else(bad)?;
    let num: f64 = num_part.trim().parse().map_err(|_| bad())?;
    if !num.is_finite() || num < 0.0 {
        return Err(bad());
    }
    Ok(Capacity::Finite((num * mult as f64).round()))
}

/// Render a byte count at the largest binary scale it reaches, trimming
/// trailing zeros: `512 bytes`, `1.5 KiB`, `2 GiB`.
pub fn display_binary_size(bytes: u64) -> String {
    let mut scale = bytes;
    let mut idx = 0usize;
    while scale >= 1024 && idx < SUFFIXES.len() {
        scale /= 1024;
        idx += 1;
    }
    if idx == 0 {
        return if bytes == 1 {
            "1 byte".to_string()
        } else {
            format!("{bytes} bytes")
        };
    }

    let (suffix, mult) = SUFFIXES[idx - 1];
    let value = bytes as f64 / mult as f64;
    let text = if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let two = format!("{value:.2}");
        two.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    format!("{} {}iB", text, suffix.to_ascii_uppercase())
}
