//! Persistent full-duplex transcription over a WebSocket.
//!
//! The connection is the session: there is no registry entry. Binary frames
//! feed the bridge's input and every result chunk is written back as a text
//! frame while a [`MemoryTap`] watches it. The socket closing and the
//! bridge finishing each end the other.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::capability::Capability;
use crate::memory::MemoryTap;
use crate::server::AppState;

/// Sent as a text frame when the upstream handshake fails.
pub const SETUP_FAILED_MESSAGE: &str = "Failed to connect to transcription service";

/// GET /ws/transcribe
pub async fn transcribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_transcription(state, sink, stream).await;
    })
}

/// Bridge one socket, given as its two halves, to a transcription stream.
pub async fn serve_transcription<S, R>(state: AppState, mut sink: S, mut stream: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let cancel = state.registry.child_token();
    let config = state.bridge_config(Capability::Transcribe);

    let bridge = match Bridge::connect(state.upstream.as_ref(), config, &cancel).await {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!(error = %e, "Failed to start transcription stream");
            let _ = sink.send(Message::Text(SETUP_FAILED_MESSAGE.into())).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    info!(upstream_stream_id = %bridge.stream_id(), "Transcription connected");

    let (inbound_tx, inbound_rx) = mpsc::channel(state.capacity.inbound.max(1));
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.capacity.outbound.max(1));
    let run = tokio::spawn(bridge.run(inbound_rx, outbound_tx, cancel.clone()));

    let tap = MemoryTap::new(
        state.upstream.clone(),
        state.user_id.to_string(),
        state.background_tasks.clone(),
    );

    let forward = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(chunk)) => {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        sent = inbound_tx.send(chunk) => sent,
                    };
                    if sent.is_err() {
                        return;
                    }
                }
                Ok(Message::Text(_)) => debug!("Ignoring text frame"),
                Ok(Message::Close(_)) => return,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Socket read failed");
                    return;
                }
            }
        }
    };

    let relay = async {
        while let Some(chunk) = outbound_rx.recv().await {
            tap.observe(&chunk);
            let text = String::from_utf8_lossy(&chunk).into_owned();
            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!("Socket write failed");
                return;
            }
        }
    };

    tokio::select! {
        _ = forward => debug!("Client closed transcription socket"),
        _ = relay => debug!("Transcription stream finished"),
    }
    cancel.cancel();
    tap.finish();

    match run.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Transcription bridge failed"),
        Err(e) => warn!(error = %e, "Transcription bridge panicked"),
    }

    let _ = sink.send(Message::Close(None)).await;
    info!("Transcription disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

    use crate::testing::{ScriptedUpstream, Step, app_state};
    use crate::upstream::ClientFrame;

    type ClientTx = UnboundedSender<Result<Message, axum::Error>>;

    fn socket() -> (
        ClientTx,
        UnboundedReceiver<Result<Message, axum::Error>>,
        UnboundedSender<Message>,
        UnboundedReceiver<Message>,
    ) {
        let (client_tx, server_rx) = unbounded();
        let (server_tx, client_rx) = unbounded();
        (client_tx, server_rx, server_tx, client_rx)
    }

    fn binary(text: &'static str) -> Result<Message, axum::Error> {
        Ok(Message::Binary(Bytes::from_static(text.as_bytes())))
    }

    fn text(text: &'static str) -> Option<Message> {
        Some(Message::Text(text.into()))
    }

    #[tokio::test]
    async fn setup_failure_reports_and_closes() {
        let state = app_state(ScriptedUpstream::unavailable());
        let (_client_tx, server_rx, server_tx, mut client_rx) = socket();

        serve_transcription(state, server_tx, server_rx).await;

        assert_eq!(
            client_rx.next().await,
            Some(Message::Text(SETUP_FAILED_MESSAGE.into()))
        );
        assert_eq!(client_rx.next().await, Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn relays_results_and_publishes_sentences() {
        let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Echo]);
        let state = app_state(upstream.clone());
        let tasks = state.background_tasks.clone();
        let (client_tx, server_rx, server_tx, mut client_rx) = socket();

        let server = tokio::spawn(serve_transcription(state, server_tx, server_rx));

        client_tx.unbounded_send(binary("Hello world!")).unwrap();
        assert_eq!(client_rx.next().await, text("Hello world!"));

        client_tx
            .unbounded_send(Ok(Message::Text("ignored".into())))
            .unwrap();
        client_tx.unbounded_send(binary("See you")).unwrap();
        client_tx.unbounded_send(binary(" soon?")).unwrap();
        assert_eq!(client_rx.next().await, text("See you"));
        assert_eq!(client_rx.next().await, text(" soon?"));

        client_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        server.await.unwrap();
        assert_eq!(client_rx.next().await, Some(Message::Close(None)));

        tasks.shutdown().await;
        let mut sentences: Vec<_> = upstream.published().into_iter().map(|e| e.subject).collect();
        sentences.sort();
        assert_eq!(sentences, vec!["Hello world!", "See you soon?"]);

        // The socket closing cancels the bridge instead of half-closing it.
        assert!(!upstream.sent_frames().contains(&ClientFrame::ClientEnd));
    }

    #[tokio::test]
    async fn upstream_end_closes_socket() {
        let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Data("done."), Step::ServerEnd]);
        let state = app_state(upstream);
        let (_client_tx, server_rx, server_tx, mut client_rx) = socket();

        serve_transcription(state, server_tx, server_rx).await;

        assert_eq!(client_rx.next().await, text("done."));
        assert_eq!(client_rx.next().await, Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_relayed_lossily() {
        let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Echo]);
        let (client_tx, server_rx, server_tx, mut client_rx) = socket();

        let server = tokio::spawn(serve_transcription(app_state(upstream), server_tx, server_rx));

        client_tx
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(b"ok \xff"))))
            .unwrap();
        assert_eq!(client_rx.next().await, text("ok \u{fffd}"));

        drop(client_tx);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn registry_shutdown_ends_transcription() {
        let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Hang]);
        let state = app_state(upstream);
        let registry = state.registry.clone();
        let (_client_tx, server_rx, server_tx, client_rx) = socket();

        let server = tokio::spawn(serve_transcription(state, server_tx, server_rx));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        registry.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(3), server)
            .await
            .expect("transcription outlived shutdown")
            .unwrap();
        let messages: Vec<_> = client_rx.collect().await;
        assert_eq!(messages, vec![Message::Close(None)]);
    }

    #[tokio::test]
    async fn upstream_error_closes_socket() {
        let upstream = ScriptedUpstream::new(vec![Step::Ready, Step::Error(13, "decoder crashed")]);
        let (_client_tx, server_rx, server_tx, mut client_rx) = socket();

        serve_transcription(app_state(upstream), server_tx, server_rx).await;

        assert_eq!(client_rx.next().await, Some(Message::Close(None)));
    }
}
