//! One WebSocket connection to a browser's DevTools endpoint.
//!
//! Commands are JSON objects `{id, method, params, sessionId?}`; the browser
//! answers each with `{id, result}` or `{id, error}` and interleaves events
//! `{method, params, sessionId?}`. A reader task owns the receiving half of
//! the socket and routes:
//!
//! - responses to the `oneshot` registered under their `id`;
//! - events to every live [`EventSubscription`] whose method and session
//!   match.
//!
//! Sessions use the flattened protocol (`Target.attachToTarget` with
//! `flatten: true`), so every session shares this one socket and is
//! addressed by `sessionId`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::CdpError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CdpError>>>>>;
type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

/// Printed PDFs come back as a single base64 message and can be large.
const MAX_MESSAGE_BYTES: usize = 512 << 20;

struct Subscriber {
    id: u64,
    method: String,
    session_id: Option<String>,
    tx: mpsc::UnboundedSender<Value>,
}

/// A live DevTools connection.
pub struct CdpConnection {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    subscribers: Subscribers,
    next_id: AtomicU64,
    next_subscription: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    /// Open a WebSocket to `ws_url` and start routing messages.
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_MESSAGE_BYTES);
        config.max_frame_size = Some(MAX_MESSAGE_BYTES);

        let (stream, _response) =
            tokio_tungstenite::connect_async_with_config(ws_url, Some(config), false)
                .await
                .map_err(|e| CdpError::Connect(format!("{ws_url}: {e}")))?;
        debug!("DevTools connection open: {}", ws_url);

        let (writer, reader) = stream.split();
        let pending: Pending = Arc::default();
        let subscribers: Subscribers = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&subscribers),
            Arc::clone(&closed),
        ));

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            subscribers,
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            closed,
            reader,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one command and wait for its result.
    ///
    /// `session_id` addresses a flattened target session; `None` talks to
    /// the browser target.
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        if self.is_closed() {
            return Err(CdpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session_id {
            message["sessionId"] = Value::String(session.to_string());
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        // Unregisters the waiter if this future is dropped before the answer.
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };

        trace!("→ {} #{}", method, id);
        let sent = self
            .writer
            .lock()
            .await
            .send(Message::Text(message.to_string().into()))
            .await;
        if let Err(e) = sent {
            return Err(CdpError::Transport(e.to_string()));
        }

        match rx.await {
            Ok(result) => result.map_err(|e| match e {
                CdpError::Protocol { code, message } => CdpError::Protocol {
                    code,
                    message: format!("{method}: {message}"),
                },
                other => other,
            }),
            Err(_) => Err(CdpError::Closed),
        }
    }

    /// Receive every `method` event for `session_id` from now on, until the
    /// returned subscription is dropped.
    pub fn subscribe(&self, method: &str, session_id: Option<&str>) -> EventSubscription {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(Subscriber {
            id,
            method: method.to_string(),
            session_id: session_id.map(str::to_string),
            tx,
        });
        EventSubscription {
            id,
            rx,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Send a close frame. Outstanding commands fail with [`CdpError::Closed`].
    pub async fn close(&self) {
        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Closing DevTools socket: {}", e);
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct WaiterGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

/// A stream of protocol events of one method on one session.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    registry: Subscribers,
}

impl EventSubscription {
    /// Next event's `params`, or `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        lock(&self.registry).retain(|s| s.id != self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding these locks cannot leave the maps inconsistent.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_loop(
    mut reader: SplitStream<WsStream>,
    pending: Pending,
    subscribers: Subscribers,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = reader.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("DevTools socket error: {}", e);
                break;
            }
        };

        let message: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring malformed DevTools message: {}", e);
                continue;
            }
        };

        if let Some(id) = message.get("id").and_then(Value::as_u64) {
            route_response(id, message, &pending);
        } else if let Some(method) = message.get("method").and_then(Value::as_str) {
            route_event(method, &message, &subscribers);
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-channel error.
    lock(&pending).clear();
    lock(&subscribers).clear();
    debug!("DevTools connection closed");
}

fn route_response(id: u64, mut message: Value, pending: &Pending) {
    let Some(tx) = lock(pending).remove(&id) else {
        trace!("Response #{} has no waiter", id);
        return;
    };
    let result = match message.get("error") {
        Some(err) => Err(CdpError::Protocol {
            code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown protocol error")
                .to_string(),
        }),
        None => Ok(message
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null)),
    };
    let _ = tx.send(result);
}

fn route_event(method: &str, message: &Value, subscribers: &Subscribers) {
    let session = message.get("sessionId").and_then(Value::as_str);
    let params = message.get("params").cloned().unwrap_or(Value::Null);
    for sub in lock(subscribers).iter() {
        if sub.method == method && sub.session_id.as_deref() == session {
            let _ = sub.tx.send(params.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn error_response_becomes_protocol_error() {
        let pending: Pending = Arc::default();
        let (tx, mut rx) = oneshot::channel();
        lock(&pending).insert(7, tx);

        route_response(
            7,
            json!({ "id": 7, "error": { "code": -32000, "message": "Printing failed" } }),
            &pending,
        );

        match rx.try_recv().unwrap() {
            Err(CdpError::Protocol { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "Printing failed");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(lock(&pending).is_empty());
    }

    #[test]
    fn result_response_is_unwrapped() {
        let pending: Pending = Arc::default();
        let (tx, mut rx) = oneshot::channel();
        lock(&pending).insert(1, tx);

        route_response(1, json!({ "id": 1, "result": { "data": "JVBERi0=" } }), &pending);
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({ "data": "JVBERi0=" }));
    }

    #[tokio::test]
    async fn events_route_by_method_and_session() {
        let subscribers: Subscribers = Arc::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        lock(&subscribers).push(Subscriber {
            id: 1,
            method: "Page.lifecycleEvent".into(),
            session_id: Some("S1".into()),
            tx: tx_a,
        });
        lock(&subscribers).push(Subscriber {
            id: 2,
            method: "Page.lifecycleEvent".into(),
            session_id: Some("S2".into()),
            tx: tx_b,
        });

        route_event(
            "Page.lifecycleEvent",
            &json!({ "method": "Page.lifecycleEvent", "sessionId": "S1", "params": { "name": "load" } }),
            &subscribers,
        );
        route_event(
            "Page.frameNavigated",
            &json!({ "method": "Page.frameNavigated", "sessionId": "S2", "params": {} }),
            &subscribers,
        );

        assert_eq!(rx_a.recv().await.unwrap()["name"], "load");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn abandoned_command_releases_its_waiter() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Reads commands and never answers.
        let browser = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let conn = CdpConnection::connect(&format!("ws://{addr}")).await.unwrap();
        let sent = tokio::time::timeout(
            Duration::from_millis(100),
            conn.send("Page.printToPDF", json!({}), Some("S1")),
        )
        .await;

        assert!(sent.is_err(), "nothing should answer");
        assert!(lock(&conn.pending).is_empty());
        drop(conn);
        browser.abort();
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let subscribers: Subscribers = Arc::default();
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&subscribers).push(Subscriber {
            id: 3,
            method: "Page.lifecycleEvent".into(),
            session_id: None,
            tx,
        });
        let sub = EventSubscription {
            id: 3,
            rx,
            registry: Arc::clone(&subscribers),
        };
        assert_eq!(lock(&subscribers).len(), 1);
        drop(sub);
        assert!(lock(&subscribers).is_empty());
    }
}
