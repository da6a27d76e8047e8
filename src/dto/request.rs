use super::common::{Bet, InformValidation, Stake};
use super::response::{
    CancelAckResponse, CancelResponse, CashoutAckResponse, CashoutInformResponse,
    CashoutResponse, ExtSettlementAckResponse, ExtSettlementResponse, MaxStakeResponse,
    TicketAckResponse, TicketInformResponse, TicketResponse, TypedResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A request body sent through the ticket protocol.
///
/// The correlation id travels in the envelope, not in the serialized content.
pub trait MtsRequest: Serialize + Send + Sync {
    /// Operation name written into the envelope.
    const OPERATION: &'static str;

    type Response: TypedResponse;

    fn correlation_id(&self) -> Option<&str>;

    fn set_correlation_id(&mut self, correlation_id: String);
}

macro_rules! mts_request {
    ($($ty:ident => $operation:literal, $response:ident;)*) => {
        $(
            impl MtsRequest for $ty {
                const OPERATION: &'static str = $operation;

                type Response = $response;

                fn correlation_id(&self) -> Option<&str> {
                    self.correlation_id.as_deref()
                }

                fn set_correlation_id(&mut self, correlation_id: String) {
                    self.correlation_id = Some(correlation_id);
                }
            }

            impl $ty {
                pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
                    self.correlation_id = Some(correlation_id.into());
                    self
                }
            }
        )*
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "ticket", rename_all = "camelCase")]
pub struct TicketRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket_id: String,
    pub bets: Vec<Bet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_source: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "ticket-inform", rename_all = "camelCase")]
pub struct TicketInformRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket: TicketRequest,
    pub validation: InformValidation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "ticket-ack", rename_all = "camelCase")]
pub struct TicketAckRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket_id: String,
    pub ticket_signature: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "cancel", rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket_id: String,
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "cancel-ack", rename_all = "camelCase")]
pub struct CancelAckRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket_id: String,
    pub cancellation_signature: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "cashout", rename_all = "camelCase")]
pub struct CashoutRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub cashout_id: String,
    pub ticket_id: String,
    pub ticket_signature: String,
    #[serde(default)]
    pub payout: Vec<Stake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "cashout-inform", rename_all = "camelCase")]
pub struct CashoutInformRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub cashout: CashoutRequest,
    pub validation: InformValidation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "cashout-ack", rename_all = "camelCase")]
pub struct CashoutAckRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub cashout_id: String,
    pub cashout_signature: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "ext-settlement", rename_all = "camelCase")]
pub struct ExtSettlementRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub settlement_id: String,
    pub ticket_id: String,
    pub ticket_signature: String,
    #[serde(default)]
    pub payout: Vec<Stake>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "ext-settlement-ack", rename_all = "camelCase")]
pub struct ExtSettlementAckRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub settlement_id: String,
    pub settlement_signature: String,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "max-stake", rename_all = "camelCase")]
pub struct MaxStakeRequest {
    #[serde(skip)]
    pub correlation_id: Option<String>,
    pub ticket: TicketRequest,
}

mts_request! {
    TicketRequest => "ticket-placement", TicketResponse;
    TicketInformRequest => "ticket-placement-inform", TicketInformResponse;
    TicketAckRequest => "ticket-placement-ack", TicketAckResponse;
    CancelRequest => "ticket-cancel", CancelResponse;
    CancelAckRequest => "ticket-cancel-ack", CancelAckResponse;
    CashoutRequest => "ticket-cashout", CashoutResponse;
    CashoutInformRequest => "cashout-inform", CashoutInformResponse;
    CashoutAckRequest => "ticket-cashout-ack", CashoutAckResponse;
    ExtSettlementRequest => "ticket-ext-settlement", ExtSettlementResponse;
    ExtSettlementAckRequest => "ticket-ext-settlement-ack", ExtSettlementAckResponse;
    MaxStakeRequest => "max-stake", MaxStakeResponse;
}
