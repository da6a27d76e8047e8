use super::common::{AcceptanceStatus, BetReply, Stake};
use crate::error::{MtsError, MtsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub ticket_id: String,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub bets: Vec<BetReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketInformResponse {
    pub ticket_id: String,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketAckResponse {
    pub ticket_id: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub ticket_id: String,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub cancellation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelAckResponse {
    pub ticket_id: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CashoutResponse {
    pub cashout_id: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub payout: Vec<Stake>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CashoutInformResponse {
    pub cashout_id: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CashoutAckResponse {
    pub cashout_id: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtSettlementResponse {
    pub settlement_id: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
    pub status: AcceptanceStatus,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtSettlementAckResponse {
    pub settlement_id: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaxStakeResponse {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub bets: Vec<BetReply>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Which response shape a request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Ticket,
    TicketInform,
    TicketAck,
    Cancel,
    CancelAck,
    Cashout,
    CashoutInform,
    CashoutAck,
    ExtSettlement,
    ExtSettlementAck,
    MaxStake,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseContent {
    Ticket(TicketResponse),
    TicketInform(TicketInformResponse),
    TicketAck(TicketAckResponse),
    Cancel(CancelResponse),
    CancelAck(CancelAckResponse),
    Cashout(CashoutResponse),
    CashoutInform(CashoutInformResponse),
    CashoutAck(CashoutAckResponse),
    ExtSettlement(ExtSettlementResponse),
    ExtSettlementAck(ExtSettlementAckResponse),
    MaxStake(MaxStakeResponse),
}

type Decoder = fn(Value) -> serde_json::Result<ResponseContent>;

fn decode_as<T, F>(value: Value, wrap: F) -> serde_json::Result<ResponseContent>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> ResponseContent,
{
    serde_json::from_value(value).map(wrap)
}

/// `type` tag of each response content, with its kind and decoder.
const DECODERS: &[(&str, ResponseKind, Decoder)] = &[
    ("ticket-reply", ResponseKind::Ticket, |v| {
        decode_as(v, ResponseContent::Ticket)
    }),
    ("ticket-inform-reply", ResponseKind::TicketInform, |v| {
        decode_as(v, ResponseContent::TicketInform)
    }),
    ("ticket-ack-reply", ResponseKind::TicketAck, |v| {
        decode_as(v, ResponseContent::TicketAck)
    }),
    ("cancel-reply", ResponseKind::Cancel, |v| {
        decode_as(v, ResponseContent::Cancel)
    }),
    ("cancel-ack-reply", ResponseKind::CancelAck, |v| {
        decode_as(v, ResponseContent::CancelAck)
    }),
    ("cashout-reply", ResponseKind::Cashout, |v| {
        decode_as(v, ResponseContent::Cashout)
    }),
    ("cashout-inform-reply", ResponseKind::CashoutInform, |v| {
        decode_as(v, ResponseContent::CashoutInform)
    }),
    ("cashout-ack-reply", ResponseKind::CashoutAck, |v| {
        decode_as(v, ResponseContent::CashoutAck)
    }),
    ("ext-settlement-reply", ResponseKind::ExtSettlement, |v| {
        decode_as(v, ResponseContent::ExtSettlement)
    }),
    ("ext-settlement-ack-reply", ResponseKind::ExtSettlementAck, |v| {
        decode_as(v, ResponseContent::ExtSettlementAck)
    }),
    ("max-stake-reply", ResponseKind::MaxStake, |v| {
        decode_as(v, ResponseContent::MaxStake)
    }),
];

impl ResponseKind {
    pub fn tag(self) -> &'static str {
        DECODERS
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .map(|(tag, _, _)| *tag)
            .unwrap_or("unknown")
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        DECODERS
            .iter()
            .find(|(t, _, _)| *t == tag)
            .map(|(_, kind, _)| *kind)
    }
}

impl ResponseContent {
    /// Decode a content object by its `type` tag.
    pub fn decode(value: Value) -> MtsResult<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| MtsError::InvalidResponse("content has no type".to_string()))?;
        let (_, _, decoder) = DECODERS
            .iter()
            .find(|(t, _, _)| *t == tag)
            .ok_or_else(|| MtsError::InvalidResponse(format!("unknown content type {tag}")))?;
        decoder(value).map_err(|e| MtsError::InvalidResponse(e.to_string()))
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            ResponseContent::Ticket(_) => ResponseKind::Ticket,
            ResponseContent::TicketInform(_) => ResponseKind::TicketInform,
            ResponseContent::TicketAck(_) => ResponseKind::TicketAck,
            ResponseContent::Cancel(_) => ResponseKind::Cancel,
            ResponseContent::CancelAck(_) => ResponseKind::CancelAck,
            ResponseContent::Cashout(_) => ResponseKind::Cashout,
            ResponseContent::CashoutInform(_) => ResponseKind::CashoutInform,
            ResponseContent::CashoutAck(_) => ResponseKind::CashoutAck,
            ResponseContent::ExtSettlement(_) => ResponseKind::ExtSettlement,
            ResponseContent::ExtSettlementAck(_) => ResponseKind::ExtSettlementAck,
            ResponseContent::MaxStake(_) => ResponseKind::MaxStake,
        }
    }
}

/// A concrete response type the facade can hand back to callers.
pub trait TypedResponse: Sized + Send + 'static {
    const KIND: ResponseKind;

    fn from_content(content: ResponseContent) -> MtsResult<Self>;
}

macro_rules! typed_response {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl TypedResponse for $ty {
                const KIND: ResponseKind = ResponseKind::$variant;

                fn from_content(content: ResponseContent) -> MtsResult<Self> {
                    match content {
                        ResponseContent::$variant(response) => Ok(response),
                        other => Err(MtsError::InvalidResponse(format!(
                            "expected {} but got {}",
                            Self::KIND,
                            other.kind()
                        ))),
                    }
                }
            }
        )*
    };
}

typed_response! {
    TicketResponse => Ticket,
    TicketInformResponse => TicketInform,
    TicketAckResponse => TicketAck,
    CancelResponse => Cancel,
    CancelAckResponse => CancelAck,
    CashoutResponse => Cashout,
    CashoutInformResponse => CashoutInform,
    CashoutAckResponse => CashoutAck,
    ExtSettlementResponse => ExtSettlement,
    ExtSettlementAckResponse => ExtSettlementAck,
    MaxStakeResponse => MaxStake,
}
