//! Amounts are stored in major units; the processor speaks minor units.

/// Major → minor (×100). `None` on overflow.
pub fn to_minor_units(amount: i64) -> Option<i64> {
    amount.checked_mul(100)
}

pub fn from_minor_units(amount_minor: i64) -> i64 {
    amount_minor / 100
}
