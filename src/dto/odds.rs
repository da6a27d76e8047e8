use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Odds in one of the supported notations, tagged by `type`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Odds {
    Decimal { value: Decimal },
    Fractional { numerator: u64, denominator: u64 },
    HongKong { value: Decimal },
    Indonesian { value: Decimal },
    Malay { value: Decimal },
    Moneyline { value: i64 },
}

impl Odds {
    /// The equivalent decimal odds, or `None` when the value is out of range for its notation.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match *self {
            Odds::Decimal { value } => Some(value),
            Odds::Fractional {
                numerator,
                denominator,
            } => {
                if denominator == 0 {
                    return None;
                }
                Some(Decimal::ONE + Decimal::from(numerator) / Decimal::from(denominator))
            }
            Odds::HongKong { value } => Some(Decimal::ONE + value),
            Odds::Indonesian { value } => {
                if value >= Decimal::ONE {
                    Some(Decimal::ONE + value)
                } else if value <= -Decimal::ONE {
                    Some(Decimal::ONE + Decimal::ONE / value.abs())
                } else {
                    None
                }
            }
            Odds::Malay { value } => {
                if value > Decimal::ZERO && value <= Decimal::ONE {
                    Some(Decimal::ONE + value)
                } else if value < Decimal::ZERO && value >= -Decimal::ONE {
                    Some(Decimal::ONE + Decimal::ONE / value.abs())
                } else {
                    None
                }
            }
            Odds::Moneyline { value } => {
                let hundred = Decimal::ONE_HUNDRED;
                if value >= 100 {
                    Some(Decimal::ONE + Decimal::from(value) / hundred)
                } else if value <= -100 {
                    Some(Decimal::ONE + hundred / Decimal::from(value.unsigned_abs()))
                } else {
                    None
                }
            }
        }
    }
}
