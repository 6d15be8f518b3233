// WebSocket server carrying admin console traffic.

use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug, PartialEq)]
pub enum WsEvent {
    /// An admin console has connected.
    Connected { addr: String },
    /// The current console has disconnected.
    Disconnected,
    /// A text message was received from the console (raw JSON string).
    Message(String),
}

/// Run the WebSocket server on the given port.
///
/// Accepts one console at a time. Incoming text frames are forwarded through
/// `tx`; strings arriving on `replies` are written back to the connected
/// console. Replies queued while nobody is connected are discarded when the
/// next console connects.
pub async fn run(
    port: u16,
    tx: mpsc::Sender<WsEvent>,
    mut replies: mpsc::Receiver<String>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr_str}: {e}");
                continue;
            }
        };

        while replies.try_recv().is_ok() {}

        if tx
            .send(WsEvent::Connected {
                addr: addr_str.clone(),
            })
            .await
            .is_err()
        {
            break;
        }

        let (write, read) = ws_stream.split();
        let channel_closed = tokio::select! {
            result = process_message_stream(read, &tx, &addr_str) => result.is_err(),
            result = forward_replies(write, &mut replies, &addr_str) => result.is_err(),
        };
        if channel_closed {
            break;
        }

        if tx.send(WsEvent::Disconnected).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if tx.send(WsEvent::Message(text.to_string())).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

/// Write queued replies to `sink` as text frames.
///
/// Returns `Ok(())` when the socket can no longer be written (the console is
/// gone) and `Err(())` when the reply channel is closed.
pub async fn forward_replies<Si>(
    mut sink: Si,
    replies: &mut mpsc::Receiver<String>,
    addr: &str,
) -> Result<(), ()>
where
    Si: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(text) = replies.recv().await {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!("Failed to send reply to {addr}: {e}");
            return Ok(());
        }
    }
    Err(())
}
