//! WebSocket connection lifecycle (§4.1, §5): handshake → message loop →
//! cleanup, one reader/writer/heartbeat task trio per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arqonbus_protocol::{
    Envelope, EnvelopeType, ErrorShape, PROTOCOL_VERSION, WELCOME_EVENT, error_codes,
};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::ConnectAuth;
use crate::state::ServerState;
use crate::telemetry::TelemetryEvent;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the writer task pushes out over the socket. Kept distinct from the
/// envelope-forwarding path so the heartbeat task can interleave control
/// frames (`Ping`) with ordinary text frames on the same connection.
enum OutFrame {
    Text(String),
    Ping,
}

/// Handle one WebSocket connection through its full lifecycle.
pub async fn handle_connection(socket: WebSocket, state: Arc<ServerState>, remote_addr: SocketAddr) {
    let remote_ip = remote_addr.ip().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutFrame>(state.config.registry.send_queue_depth);
    let close_grace = Duration::from_millis(state.config.server.close_grace_ms);

    // Drains until the channel closes (no timeout here — idle connections
    // with nothing to send must not be mistaken for a shutdown in
    // progress). The bounded drain-then-close grace period is enforced by
    // the caller once it `drop`s `out_tx`, below.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let sent = match frame {
                OutFrame::Text(text) => ws_tx.send(Message::Text(text.into())).await,
                OutFrame::Ping => ws_tx.send(Message::Ping(Vec::new().into())).await,
            };
            if sent.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });
    let writer_abort = writer.abort_handle();

    let principal = match tokio::time::timeout(HANDSHAKE_TIMEOUT, wait_for_connect(&mut ws_rx)).await {
        Ok(Ok(connect_envelope)) => match authenticate(&state, &connect_envelope, &remote_ip) {
            Ok(principal) => principal,
            Err(err) => {
                send_error(&out_tx, &connect_envelope.id, &connect_envelope.from_client, err).await;
                writer.abort();
                return;
            },
        },
        Ok(Err(err)) => {
            warn!(remote_ip = %remote_ip, error = %err, "ws: handshake failed");
            writer.abort();
            return;
        },
        Err(_) => {
            warn!(remote_ip = %remote_ip, "ws: handshake timeout");
            writer.abort();
            return;
        },
    };

    let tenant_id = principal.tenant_id.clone();
    let client_id = principal.client_id.clone();

    let (session, mut session_rx) = match state.registry.register(principal) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(tenant_id = %tenant_id, client_id = %client_id, error = %err, "ws: registration failed");
            let shape = ErrorShape::new(error_codes::DUPLICATE_IDENTITY, err.to_string());
            send_error(&out_tx, "connect", &client_id, shape).await;
            writer.abort();
            return;
        },
    };

    info!(tenant_id = %tenant_id, client_id = %client_id, "ws: connection established");
    state.telemetry.emit(TelemetryEvent {
        kind: "connection.established",
        tenant_id: Some(tenant_id.clone()),
        client_id: Some(client_id.clone()),
        detail: serde_json::json!({}),
        at_ms: arqonbus_common::time::now_ms(),
    });

    send_welcome(&out_tx, &tenant_id, &client_id).await;

    // Forwards envelopes the router (or a command handler's lifecycle
    // event) delivers to this session's queue out to the socket.
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(envelope) = session_rx.recv().await {
            if let Ok(text) = serde_json::to_string(&envelope) {
                let _ = forward_tx.send(OutFrame::Text(text)).await;
            }
        }
    });

    // Sends periodic pings and closes the session if `heartbeat_miss_threshold`
    // consecutive pongs are missed, or if the send queue has been saturated
    // beyond `backpressure_grace_ms` (§5 heartbeat + backpressure table).
    let heartbeat_session = Arc::clone(&session);
    let heartbeat_out_tx = out_tx.clone();
    let heartbeat_interval = Duration::from_millis(state.config.server.heartbeat_interval_ms.max(1));
    let miss_threshold = u64::from(state.config.server.heartbeat_miss_threshold.max(1));
    let backpressure_grace_ms = state.config.registry.backpressure_grace_ms;
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if heartbeat_session.is_closed() {
                break;
            }
            if let Some(saturated_ms) = heartbeat_session.saturated_for_ms() {
                if saturated_ms >= backpressure_grace_ms {
                    warn!(
                        client_id = heartbeat_session.client_id(),
                        saturated_ms, "ws: send queue saturated beyond grace, disconnecting"
                    );
                    let shape = ErrorShape::new(
                        error_codes::BACKPRESSURE_SATURATED,
                        "outbound queue saturated beyond the configured grace period",
                    );
                    let _ = heartbeat_session
                        .sender
                        .try_send(shape.into_envelope(heartbeat_session.client_id(), heartbeat_session.client_id()));
                    heartbeat_session.close();
                    break;
                }
            }
            if heartbeat_session.ms_since_pong() >= heartbeat_interval.as_millis() as u64 * miss_threshold {
                warn!(client_id = heartbeat_session.client_id(), "ws: heartbeat timeout, disconnecting");
                let shape = ErrorShape::new(error_codes::HEARTBEAT_TIMEOUT, "missed too many heartbeat pongs");
                let _ = heartbeat_session
                    .sender
                    .try_send(shape.into_envelope(heartbeat_session.client_id(), heartbeat_session.client_id()));
                heartbeat_session.close();
                break;
            }
            let _ = heartbeat_out_tx.send(OutFrame::Ping).await;
        }
    });

    let mut rate_window_start = Instant::now();
    let mut rate_window_count: u32 = 0;
    let rate_limit_messages = state.config.server.rate_limit_messages;
    let rate_limit_window = Duration::from_millis(state.config.server.rate_limit_window_ms.max(1));
    let operation_timeout = Duration::from_millis(state.config.server.operation_timeout_ms.max(1));

    loop {
        let msg = tokio::select! {
            biased;
            () = session.closed() => {
                info!(tenant_id = %tenant_id, client_id = %client_id, "ws: session closed by server, closing connection");
                break;
            },
            msg = ws_rx.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                session.touch();
                session.note_pong();
                continue;
            },
            Ok(Message::Ping(_)) => {
                session.touch();
                continue;
            },
            Ok(_) => continue,
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "ws: read error");
                break;
            },
        };
        session.touch();

        // Per-connection rate limit (§5 backpressure table: "Inbound socket
        // ... per-connection rate limit"). A fixed window counter; resets
        // once `rate_limit_window_ms` elapses since the window started.
        if rate_window_start.elapsed() >= rate_limit_window {
            rate_window_start = Instant::now();
            rate_window_count = 0;
        }
        rate_window_count += 1;
        if rate_window_count > rate_limit_messages {
            let shape = ErrorShape::new(
                error_codes::RATE_LIMIT_EXCEEDED,
                "per-connection inbound rate limit exceeded",
            );
            send_error(&out_tx, "unknown", &client_id, shape).await;
            continue;
        }

        let envelope = match state.validator.decode(&text) {
            Ok(e) => e,
            Err(err) => {
                send_error(&out_tx, "unknown", &client_id, err).await;
                continue;
            },
        };

        if let Err(err) = state.validator.validate(&envelope, &session.principal) {
            send_error(&out_tx, &envelope.id, &client_id, err).await;
            continue;
        }

        // Bounded per-operation processing budget (§5): a stuck CASIL/router
        // call or a runaway command handler must not hang the connection
        // forever.
        let envelope_id = envelope.id.clone();
        let timed_out = tokio::time::timeout(operation_timeout, async {
            match envelope.r#type {
                EnvelopeType::Command => {
                    handle_command(&state, &session, envelope, &out_tx).await;
                },
                EnvelopeType::Message => {
                    handle_message(&state, envelope, &out_tx).await;
                },
                _ => {
                    debug!(client_id = %client_id, "ws: ignoring non-command, non-message envelope");
                },
            }
        })
        .await
        .is_err();
        if timed_out {
            warn!(envelope_id = %envelope_id, "ws: operation exceeded its processing budget");
            let shape = ErrorShape::new(error_codes::INTERNAL_ERROR, "operation timed out");
            send_error(&out_tx, &envelope_id, &client_id, shape).await;
        }
    }

    state.rooms.remove_client_everywhere(&tenant_id, &client_id);
    state.registry.unregister(&tenant_id, &client_id, &session);
    state.telemetry.emit(TelemetryEvent {
        kind: "connection.closed",
        tenant_id: Some(tenant_id.clone()),
        client_id: Some(client_id.clone()),
        detail: serde_json::json!({}),
        at_ms: arqonbus_common::time::now_ms(),
    });
    info!(tenant_id = %tenant_id, client_id = %client_id, "ws: connection closed");

    heartbeat.abort();
    forwarder.abort();
    // The writer drains whatever is already queued once it observes the
    // channel close (the final `drop`), but only for up to `close_grace_ms`
    // before this task gives up waiting and forces it down (§5: "the writer
    // drains up to a bounded grace period then closes").
    drop(out_tx);
    if tokio::time::timeout(close_grace, writer).await.is_err() {
        writer_abort.abort();
    }
}

/// Wait for the first frame and require it to be a `connect` command.
async fn wait_for_connect(
    rx: &mut futures::stream::SplitStream<WebSocket>,
) -> Result<Envelope, String> {
    while let Some(msg) = rx.next().await {
        let text = match msg.map_err(|e| e.to_string())? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => return Err("connection closed before handshake".to_string()),
            _ => continue,
        };
        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| format!("invalid connect envelope: {e}"))?;
        if envelope.command.as_deref() != Some("connect") {
            return Err("first frame must be a connect command".to_string());
        }
        return Ok(envelope);
    }
    Err("connection closed before handshake".to_string())
}

fn authenticate(
    state: &ServerState,
    envelope: &Envelope,
    remote_ip: &str,
) -> Result<arqonbus_protocol::Principal, ErrorShape> {
    let credentials: ConnectAuth = envelope
        .args
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ErrorShape::new(error_codes::AUTHENTICATION_FAILED, format!("malformed auth args: {e}")))?
        .unwrap_or_default();
    state.authenticator.authenticate(&credentials, remote_ip)
}

async fn send_welcome(out_tx: &mpsc::Sender<OutFrame>, tenant_id: &str, client_id: &str) {
    let envelope = Envelope {
        id: "welcome".into(),
        r#type: EnvelopeType::Event,
        version: PROTOCOL_VERSION.to_string(),
        timestamp: arqonbus_common::time::now_ms(),
        from_client: "server".into(),
        to_client: Some(client_id.to_string()),
        room: None,
        channel: None,
        command: None,
        args: None,
        payload: Some(serde_json::json!({
            "event": WELCOME_EVENT,
            "protocol_version": PROTOCOL_VERSION,
            "tenant_id": tenant_id,
            "client_id": client_id,
        })),
        metadata: None,
        correlation_id: None,
        tenant_id: Some(tenant_id.to_string()),
    };
    if let Ok(text) = serde_json::to_string(&envelope) {
        let _ = out_tx.send(OutFrame::Text(text)).await;
    }
}

async fn send_error(out_tx: &mpsc::Sender<OutFrame>, request_id: &str, client_id: &str, err: ErrorShape) {
    let envelope = err.into_envelope(request_id, client_id);
    if let Ok(text) = serde_json::to_string(&envelope) {
        let _ = out_tx.send(OutFrame::Text(text)).await;
    }
}

async fn handle_command(
    state: &Arc<ServerState>,
    session: &Arc<arqonbus_registry::Session>,
    envelope: Envelope,
    out_tx: &mpsc::Sender<OutFrame>,
) {
    let Some(command) = envelope.command.clone() else {
        send_error(
            out_tx,
            &envelope.id,
            &envelope.from_client,
            ErrorShape::new(error_codes::COMMAND_NOT_FOUND, "command envelope missing `command`"),
        )
        .await;
        return;
    };
    let ctx = arqonbus_commands::CommandContext {
        request_id: envelope.id.clone(),
        command,
        args: envelope.args.clone().unwrap_or(serde_json::Value::Null),
        principal: session.principal.clone(),
        registry: Arc::clone(&state.registry),
        rooms: Arc::clone(&state.rooms),
        history: Arc::clone(&state.history),
    };
    let response = state.commands.dispatch(ctx).await;
    if let Ok(text) = serde_json::to_string(&response) {
        let _ = out_tx.send(OutFrame::Text(text)).await;
    }
}

/// CASIL-inspect, persist, and route one data message (§4.1 data flow:
/// "validate → CASIL inspect → (block | route + persist | redact, route,
/// persist)").
async fn handle_message(state: &Arc<ServerState>, envelope: Envelope, out_tx: &mpsc::Sender<OutFrame>) {
    let outcome = state.casil.inspect(&envelope);

    // Telemetry/logs always see the observability-redacted rendering, never
    // the raw payload, independent of whether transport redaction is on
    // (§4.5: observability redaction is applied whenever classification
    // flags something, regardless of the transport setting).
    if outcome.is_blocked() || outcome.observability_payload.is_some() {
        if state.casil.emit_to_telemetry() {
            state.telemetry.emit(TelemetryEvent {
                kind: if outcome.is_blocked() { "casil.blocked" } else { "casil.flagged" },
                tenant_id: envelope.tenant_id.clone(),
                client_id: Some(envelope.from_client.clone()),
                detail: serde_json::json!({
                    "reason_code": outcome.reason_code,
                    "classification": outcome.classification,
                    "payload": outcome.observability_payload,
                }),
                at_ms: arqonbus_common::time::now_ms(),
            });
        }
        if state.casil.emit_to_logs() {
            warn!(
                envelope_id = %envelope.id,
                reason_code = outcome.reason_code,
                "casil: envelope flagged"
            );
        }
    }
    if outcome.is_blocked() {
        send_error(
            out_tx,
            &envelope.id,
            &envelope.from_client,
            ErrorShape::new(outcome.reason_code, "message blocked by content policy"),
        )
        .await;
        return;
    }

    let mut routed = envelope.clone();
    if let Some(redacted_payload) = &outcome.redacted_payload {
        routed.payload = Some(redacted_payload.clone());
    }
    if state.casil.emit_to_envelope() {
        let casil_value = serde_json::to_value(&outcome.classification).unwrap_or(serde_json::Value::Null);
        routed
            .metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert("casil".to_string(), casil_value);
    }

    persist(state, &envelope, outcome.redacted_payload.as_ref());

    if let Err(err) = arqonbus_router::Router::route(routed, &state.registry, &state.rooms) {
        debug!(envelope_id = %envelope.id, error = %err, "router: no resolvable target");
        send_error(
            out_tx,
            &envelope.id,
            &envelope.from_client,
            ErrorShape::new(error_codes::TARGET_ERROR, err.to_string()),
        )
        .await;
    }
}

/// Apply the redacted-history and direct-message persistence gates (§4.5,
/// §4.6 EXPANSIONs, Open Questions 3-4) at the call site between CASIL and
/// the history store, keeping CASIL itself free of I/O.
fn persist(state: &ServerState, original: &Envelope, redacted_payload: Option<&serde_json::Value>) {
    let tenant_id = original.tenant_id.clone().unwrap_or_default();
    let key = match (&original.room, &original.channel, &original.to_client) {
        (Some(room), Some(channel), _) => arqonbus_history::HistoryKey::new(&tenant_id, room, channel),
        (_, _, Some(to_client)) => {
            if !state.config.history.persist_direct_messages {
                return;
            }
            arqonbus_history::HistoryKey::direct(&tenant_id, &original.from_client, to_client)
        },
        _ => return,
    };

    let mut to_store = original.clone();
    if state.config.history.persist_redacted_form {
        if let Some(redacted) = redacted_payload {
            to_store.payload = Some(redacted.clone());
        }
    }

    let history = Arc::clone(&state.history);
    tokio::spawn(async move {
        let _ = history.append(&key, to_store).await;
    });
}
