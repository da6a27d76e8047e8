use crate::awaiter::SentCallback;
use crate::dto::request::*;
use crate::dto::response::*;
use crate::error::MtsResult;
use crate::protocol_engine::ProtocolEngine;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use std::sync::Arc;

/// Per-operation entry points over the protocol engine.
///
/// Methods return immediately; the returned future resolves with the typed
/// reply or the error that ended the request.
#[derive(Clone)]
pub struct TicketProtocol {
    engine: Arc<ProtocolEngine>,
}

macro_rules! request_methods {
    ($($name:ident, $with_listener:ident: $request:ty => $response:ty;)*) => {
        $(
            pub fn $name(&self, request: &$request) -> BoxFuture<'static, MtsResult<$response>> {
                self.send(request, None)
            }

            pub fn $with_listener(
                &self,
                request: &$request,
                on_sent: SentCallback,
            ) -> BoxFuture<'static, MtsResult<$response>> {
                self.send(request, Some(on_sent))
            }
        )*
    };
}

macro_rules! publish_methods {
    ($($name:ident, $with_listener:ident: $request:ty;)*) => {
        $(
            pub fn $name(&self, request: &$request) -> BoxFuture<'static, MtsResult<()>> {
                self.publish(request, None)
            }

            pub fn $with_listener(
                &self,
                request: &$request,
                on_sent: SentCallback,
            ) -> BoxFuture<'static, MtsResult<()>> {
                self.publish(request, Some(on_sent))
            }
        )*
    };
}

impl TicketProtocol {
    pub fn new(engine: Arc<ProtocolEngine>) -> Self {
        Self { engine }
    }

    /// Send any request and wait for its typed reply.
    pub fn send<R: MtsRequest>(
        &self,
        request: &R,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'static, MtsResult<R::Response>> {
        let content = match serde_json::to_string(request) {
            Ok(content) => content,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        let reply = self.engine.execute(
            R::OPERATION,
            content,
            <R::Response as TypedResponse>::KIND,
            request.correlation_id().map(str::to_string),
            on_sent,
        );
        async move { R::Response::from_content(reply.await?) }.boxed()
    }

    /// Send any request and resolve once any reply for it arrives.
    pub fn publish<R: MtsRequest>(
        &self,
        request: &R,
        on_sent: Option<SentCallback>,
    ) -> BoxFuture<'static, MtsResult<()>> {
        let content = match serde_json::to_string(request) {
            Ok(content) => content,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        self.engine.execute_no_response(
            R::OPERATION,
            content,
            request.correlation_id().map(str::to_string),
            on_sent,
        )
    }

    request_methods! {
        send_ticket, send_ticket_with_listener: TicketRequest => TicketResponse;
        send_ticket_inform, send_ticket_inform_with_listener: TicketInformRequest => TicketInformResponse;
        send_ticket_ack, send_ticket_ack_with_listener: TicketAckRequest => TicketAckResponse;
        send_cancel, send_cancel_with_listener: CancelRequest => CancelResponse;
        send_cancel_ack, send_cancel_ack_with_listener: CancelAckRequest => CancelAckResponse;
        send_cashout, send_cashout_with_listener: CashoutRequest => CashoutResponse;
        send_cashout_inform, send_cashout_inform_with_listener: CashoutInformRequest => CashoutInformResponse;
        send_cashout_ack, send_cashout_ack_with_listener: CashoutAckRequest => CashoutAckResponse;
        send_ext_settlement, send_ext_settlement_with_listener: ExtSettlementRequest => ExtSettlementResponse;
        send_ext_settlement_ack, send_ext_settlement_ack_with_listener: ExtSettlementAckRequest => ExtSettlementAckResponse;
        send_max_stake, send_max_stake_with_listener: MaxStakeRequest => MaxStakeResponse;
    }

    publish_methods! {
        publish_ticket_ack, publish_ticket_ack_with_listener: TicketAckRequest;
        publish_cancel_ack, publish_cancel_ack_with_listener: CancelAckRequest;
        publish_cashout_ack, publish_cashout_ack_with_listener: CashoutAckRequest;
    }
}
