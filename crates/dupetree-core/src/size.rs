//! Human-readable size strings.
//!
//! `size2str`/`str2size` convert between byte counts and strings with
//! binary units (`K` = 1024, `M` = 1024^2, `G` = 1024^3, no unit = bytes).
//! Round-trippable within the chosen precision.

use crate::errors::{DupetreeError, DupetreeResult};

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * KIB;
pub const GIB: u64 = KIB * KIB * KIB;

const UNITS: [(u64, &str); 4] = [(GIB, "G"), (MIB, "M"), (KIB, "K"), (1, "")];

/// Convert a size in bytes to a string with the largest fitting unit.
pub fn size2str(size: u64, prec: usize) -> String {
    for (unit, symbol) in UNITS {
        if size / unit == 0 {
            continue;
        }
        return format!("{:.*}{}", prec, size as f64 / unit as f64, symbol);
    }
    format!("{:.*}", prec, 0.0)
}

/// Parse a size string like `256K`, `1.5M`, `2G` or `1024` into bytes.
pub fn str2size(s: &str) -> DupetreeResult<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DupetreeError::invalid_size("empty size string"));
    }
    let (number, unit) = match s.chars().last() {
        Some('K') => (&s[..s.len() - 1], KIB),
        Some('M') => (&s[..s.len() - 1], MIB),
        Some('G') => (&s[..s.len() - 1], GIB),
        Some(c) if c.is_ascii_digit() || c == '.' => (s, 1),
        _ => return Err(DupetreeError::invalid_size(s)),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| DupetreeError::invalid_size(s))?;
    if value < 0.0 {
        return Err(DupetreeError::invalid_size(s));
    }
    Ok((value * unit as f64) as u64)
}
