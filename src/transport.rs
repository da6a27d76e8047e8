//! Socket seam between a [`Connection`](crate::connection::Connection) and the wire.

use crate::error::{MtsError, MtsResult};
use crate::framing::Frame;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame as WsFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// What a socket reader observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A complete text message, already reassembled from its fragments.
    Text(String),
    Closed { code: u16, reason: String },
    Error(MtsError),
}

/// Write half of an open socket.
pub trait FrameSink: Send + Sync {
    /// Write every frame of one logical message, in order.
    fn send_frames<'a>(&'a self, frames: &'a [Frame]) -> BoxFuture<'a, MtsResult<()>>;

    fn close(&self) -> BoxFuture<'_, MtsResult<()>>;
}

pub type SocketParts = (Box<dyn FrameSink>, BoxStream<'static, SocketEvent>);

/// Opens authenticated sockets.
pub trait Connector: Send + Sync {
    fn connect(&self, token: String) -> BoxFuture<'static, MtsResult<SocketParts>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, token: String) -> BoxFuture<'static, MtsResult<SocketParts>> {
        let url = self.url.clone();
        let connect_timeout = self.connect_timeout;
        async move {
            let mut request = url.as_str().into_client_request()?;
            let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| MtsError::Connection(format!("invalid token header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);

            let (ws_stream, response) = timeout(connect_timeout, connect_async(request))
                .await
                .map_err(|_| MtsError::Connection(format!("connect to {url} timed out")))??;
            info!("WebSocket connected to {} ({})", url, response.status());

            let (write, read) = ws_stream.split();
            let sink: Box<dyn FrameSink> = Box::new(TungsteniteSink {
                write: Mutex::new(write),
            });
            let events = read
                .filter_map(|message| async move {
                    match message {
                        Ok(Message::Text(text)) => Some(SocketEvent::Text(text)),
                        Ok(Message::Close(frame)) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.into_owned()))
                                .unwrap_or((1005, String::new()));
                            Some(SocketEvent::Closed { code, reason })
                        }
                        Ok(other) => {
                            debug!("Ignoring non-text WebSocket message: {:?}", other);
                            None
                        }
                        Err(e) => Some(SocketEvent::Error(e.into())),
                    }
                })
                .boxed();
            Ok((sink, events))
        }
        .boxed()
    }
}

struct TungsteniteSink {
    write: Mutex<SplitSink<WsStream, Message>>,
}

impl FrameSink for TungsteniteSink {
    fn send_frames<'a>(&'a self, frames: &'a [Frame]) -> BoxFuture<'a, MtsResult<()>> {
        async move {
            let mut write = self.write.lock().await;
            for (i, frame) in frames.iter().enumerate() {
                let opcode = if i == 0 { Data::Text } else { Data::Continue };
                let ws_frame =
                    WsFrame::message(frame.payload.clone(), OpCode::Data(opcode), frame.is_final);
                write.feed(Message::Frame(ws_frame)).await?;
            }
            write.flush().await?;
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, MtsResult<()>> {
        async move {
            let mut write = self.write.lock().await;
            write.close().await?;
            Ok(())
        }
        .boxed()
    }
}
