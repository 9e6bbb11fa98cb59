use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::ws::ConnectionHandle;

/// Why a connection left the `Registered` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    StreamEnded,
    ReadError,
    LivenessTimeout,
    /// Shutdown, a failed delivery, or a failed write cancelled the token.
    Cancelled,
}

/// Run one realtime connection from registration to teardown.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from a bounded mpsc channel
/// - This task: reads inbound frames only to track liveness, sends pings
///
/// The connection is registered before the loop starts and unregistered
/// exactly once after it ends. Only the writer task touches the sink, so the
/// socket is closed once no matter which side noticed the failure.
pub async fn run_connection(socket: WebSocket, state: AppState, forum_id: i64) {
    let realtime = state.realtime.clone();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<WsMessage>(realtime.send_buffer.max(1));

    // Child of the server token so shutdown interrupts the read loop
    let cancel = state.shutdown.child_token();
    let handle = ConnectionHandle::new(tx, cancel.clone());
    let connection_id = handle.id();

    state.registry.register(forum_id, handle.clone());

    tracing::info!(
        forum_id,
        connection_id = %connection_id,
        "Realtime connection opened"
    );

    let writer_handle = tokio::spawn(writer_task(
        ws_sender,
        rx,
        realtime.write_timeout(),
        cancel.clone(),
    ));

    let ping_interval = realtime.ping_interval();
    let liveness_window = realtime.liveness_timeout();
    let mut ping_timer = interval_at(Instant::now() + ping_interval, ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let liveness = sleep(liveness_window);
    tokio::pin!(liveness);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CloseReason::Cancelled,
            _ = &mut liveness => break CloseReason::LivenessTimeout,
            _ = ping_timer.tick() => {
                if handle.try_send(WsMessage::Ping(vec![1, 2, 3, 4].into())).is_err() {
                    break CloseReason::Cancelled;
                }
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(forum_id, connection_id = %connection_id, reason = ?frame, "Client initiated close");
                    break CloseReason::ClientClosed;
                }
                Some(Ok(_)) => {
                    // Pings are answered by the socket itself; every frame proves liveness
                    liveness.as_mut().reset(Instant::now() + liveness_window);
                }
                Some(Err(e)) => {
                    tracing::debug!(forum_id, connection_id = %connection_id, error = %e, "WebSocket receive error");
                    break CloseReason::ReadError;
                }
                None => break CloseReason::StreamEnded,
            },
        }
    };

    // Closing: unregister first so no new broadcast picks this connection up
    state.registry.unregister(forum_id, &connection_id);
    handle.close();
    drop(handle);
    let _ = writer_handle.await;

    tracing::info!(
        forum_id,
        connection_id = %connection_id,
        reason = ?reason,
        "Realtime connection closed"
    );
}

/// Writer task: drains the outbound queue into the WebSocket sink.
/// Any write failure or timeout cancels the connection. On cancellation it
/// sends a single Close frame and closes the sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<WsMessage>,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match timeout(write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket send failed");
                cancel.cancel();
                return;
            }
            Err(_) => {
                tracing::warn!("WebSocket send timed out");
                cancel.cancel();
                return;
            }
        }
    }

    let close_frame = CloseFrame {
        code: close_code::AWAY,
        reason: "Connection closing".into(),
    };
    let _ = timeout(write_timeout, ws_sender.send(WsMessage::Close(Some(close_frame)))).await;
    let _ = timeout(write_timeout, ws_sender.close()).await;
}
