use super::odds::Odds;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AcceptanceStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StakeMode {
    Total,
    Unit,
}

/// Money put on (or paid out for) a bet, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Stake {
    Cash {
        currency: String,
        amount: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<StakeMode>,
    },
    #[serde(rename_all = "camelCase")]
    Bonus {
        currency: String,
        amount: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<StakeMode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_id: Option<String>,
    },
}

impl Stake {
    pub fn cash(currency: impl Into<String>, amount: Decimal) -> Self {
        Stake::Cash {
            currency: currency.into(),
            amount,
            mode: None,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Stake::Cash { amount, .. } | Stake::Bonus { amount, .. } => *amount,
        }
    }

    pub fn currency(&self) -> &str {
        match self {
            Stake::Cash { currency, .. } | Stake::Bonus { currency, .. } => currency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub event_id: String,
    pub market_id: String,
    pub outcome_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifiers: Option<String>,
    pub odds: Odds,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet_id: Option<String>,
    #[serde(default)]
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub stake: Vec<Stake>,
}

/// Per-bet outcome carried in replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BetReply {
    #[serde(default)]
    pub bet_id: Option<String>,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stake: Vec<Stake>,
}

/// Verdict an operator attaches to an inform request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InformValidation {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
