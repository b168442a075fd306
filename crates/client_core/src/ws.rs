//! Reconnecting WebSocket feed.
//!
//! The supervisor task reconnects after a fixed delay whenever the socket
//! drops, except when the server closes without a status code (1005), which
//! ends the channel.

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{Stream, StreamExt};
use serde_json::Value;
use shared::actions::{Action, ActionType};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    config::{Settings, SettingsError},
    dispatcher::DispatcherHandle,
};

pub const NO_STATUS_CLOSE_CODE: u16 = 1005;
const FRAME_BUFFER: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    Terminal,
    Reconnect(String),
    ReceiverGone,
}

pub(crate) fn classify_close(frame: Option<&CloseFrame<'_>>) -> SessionEnd {
    match frame.map(|frame| u16::from(frame.code)) {
        None | Some(NO_STATUS_CLOSE_CODE) => SessionEnd::Terminal,
        Some(code) => SessionEnd::Reconnect(format!("closed with code {code}")),
    }
}

/// Stream of JSON frames received over a supervised connection. Dropping it
/// stops the supervisor.
pub struct WsChannel {
    frames: ReceiverStream<Value>,
    supervisor: JoinHandle<()>,
}

impl WsChannel {
    pub fn open(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let supervisor = tokio::spawn(supervise(url.into(), reconnect_delay, tx));
        Self {
            frames: ReceiverStream::new(rx),
            supervisor,
        }
    }

    pub fn connect(settings: &Settings, path: &str) -> Result<Self, SettingsError> {
        Ok(Self::open(
            settings.ws_url(path)?,
            settings.ws_reconnect_delay(),
        ))
    }
}

impl Stream for WsChannel {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn supervise(url: String, reconnect_delay: Duration, tx: mpsc::Sender<Value>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!(%url, "ws: connected");
                match pump(socket, &tx).await {
                    SessionEnd::Terminal => {
                        info!(%url, "ws: server closed without status, channel ended");
                        return;
                    }
                    SessionEnd::ReceiverGone => {
                        debug!(%url, "ws: receiver dropped, channel ended");
                        return;
                    }
                    SessionEnd::Reconnect(reason) => {
                        warn!(
                            %url,
                            %reason,
                            delay_ms = reconnect_delay.as_millis() as u64,
                            "ws: connection lost, reconnecting"
                        );
                    }
                }
            }
            Err(err) => {
                warn!(
                    %url,
                    error = %err,
                    delay_ms = reconnect_delay.as_millis() as u64,
                    "ws: connect failed, retrying"
                );
            }
        }

        tokio::time::sleep(reconnect_delay).await;
        if tx.is_closed() {
            return;
        }
    }
}

async fn pump(mut socket: Socket, tx: &mpsc::Sender<Value>) -> SessionEnd {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        return SessionEnd::ReceiverGone;
                    }
                }
                Err(err) => warn!(error = %err, "ws: dropping non-JSON frame"),
            },
            Ok(Message::Close(frame)) => return classify_close(frame.as_ref()),
            Ok(_) => {}
            Err(err) => return SessionEnd::Reconnect(err.to_string()),
        }
    }
    SessionEnd::Reconnect("stream ended without a close frame".to_string())
}

/// Forwards every frame into the runtime as a `SOCKETMESSAGE` action.
pub fn spawn_socket_bridge(dispatcher: DispatcherHandle, mut channel: WsChannel) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = channel.next().await {
            let action = Action::new(ActionType::SocketMessage).with_payload(frame);
            if let Err(err) = dispatcher.dispatch(action) {
                warn!(error = %err, "ws: socket bridge stopped");
                return;
            }
        }
        debug!("ws: socket bridge drained");
    })
}

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod tests;
