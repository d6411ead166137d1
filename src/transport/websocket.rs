use super::sse::{ data_lines, is_done_marker };
use super::{ ResponseStream, Transport, TransportMode };
use crate::client::BackendClient;
use crate::error::{ ChatError, ChatResult };
use crate::models::payload::ConversationPayload;
use crate::models::websocket::WebSocketFrame;
use async_trait::async_trait;
use base64::{ engine::general_purpose::STANDARD, Engine };
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use serde_json::Value;
use std::collections::{ HashMap, VecDeque };
use std::pin::Pin;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard };
use std::task::{ Context, Poll };
use tokio::net::TcpStream;
use tokio::sync::{ mpsc, watch };
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ connect_async, MaybeTlsStream, WebSocketStream };
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Delivery = mpsc::UnboundedSender<ChatResult<Vec<u8>>>;

const TITLE_GENERATION: &str = "title_generation";

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    Delivered,
    /// Delivered, and the request's queue is now terminated.
    Completed,
    /// No live request under that identifier. The frame is held for a later
    /// rekey when no subscription has ever claimed the identifier.
    Unknown,
    /// Side-channel or empty frame.
    Filtered,
}

/// Frames held for identifiers nobody has subscribed to yet, oldest first.
pub const ORPHAN_CAPACITY: usize = 64;

#[derive(Default)]
struct Registry {
    /// A `None` slot is a finished request whose consumer has not drained its
    /// queue yet.
    slots: HashMap<String, Option<Delivery>>,
    /// Request identifier and encoded body of frames that arrived before
    /// their subscription was rekeyed.
    orphans: VecDeque<(String, String)>,
}

impl Registry {
    fn hold(&mut self, request_id: String, body: String) {
        if self.orphans.len() == ORPHAN_CAPACITY {
            self.orphans.pop_front();
        }
        self.orphans.push_back((request_id, body));
    }

    fn take_orphans(&mut self, request_id: &str) -> Vec<String> {
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = self.orphans
            .drain(..)
            .partition(|(id, _)| id == request_id);
        self.orphans = kept;
        taken
            .into_iter()
            .map(|(_, body)| body)
            .collect()
    }
}

/// Request identifier → delivery queue.
#[derive(Clone, Default)]
pub struct PendingRequests {
    registry: Arc<Mutex<Registry>>,
    closed: Arc<AtomicBool>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.lock().slots.contains_key(request_id)
    }

    pub fn orphan_count(&self) -> usize {
        self.lock().orphans.len()
    }

    /// Registers `request_id`; must happen before the request is dispatched
    /// so the first frame cannot race the registration.
    pub fn subscribe(&self, request_id: &str) -> ChatResult<PendingStream> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::TransportClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().slots.insert(request_id.to_string(), Some(tx));
        Ok(PendingStream {
            request_id: request_id.to_string(),
            rx,
            pending: self.clone(),
        })
    }

    /// Moves the slot under `to` and replays, in arrival order, the frames
    /// that reached `to` before the move.
    fn rekey(&self, from: &str, to: &str) {
        let mut registry = self.lock();
        let Some(slot) = registry.slots.remove(from) else {
            return;
        };
        let held = registry.take_orphans(to);
        if !held.is_empty() {
            debug!("Replaying {} held frames for request {}", held.len(), to);
        }
        registry.slots.insert(to.to_string(), slot);
        let Some(slot) = registry.slots.get_mut(to) else {
            return;
        };
        for body in held {
            if slot.is_none() {
                break;
            }
            deliver(slot, &body);
        }
    }

    fn remove(&self, request_id: &str) {
        self.lock().slots.remove(request_id);
    }

    pub fn route_text(&self, text: &str) -> Routing {
        match serde_json::from_str::<WebSocketFrame>(text) {
            Ok(frame) => self.route(frame),
            Err(e) => {
                debug!("Ignoring non-frame socket message: {}", e);
                Routing::Filtered
            }
        }
    }

    pub fn route(&self, frame: WebSocketFrame) -> Routing {
        let WebSocketFrame { body, websocket_request_id, kind } = frame;
        let Some(request_id) = websocket_request_id else {
            return Routing::Filtered;
        };
        if kind.as_deref() == Some(TITLE_GENERATION) {
            return Routing::Filtered;
        }

        let mut guard = self.lock();
        let registry = &mut *guard;
        match registry.slots.get_mut(&request_id) {
            Some(slot) if slot.is_none() => {
                debug!("Dropping frame for finished request {}", request_id);
                Routing::Unknown
            }
            Some(slot) => {
                match body {
                    Some(body) => deliver(slot, &body),
                    None => Routing::Filtered,
                }
            }
            None => {
                debug!("Holding frame for unknown request {}", request_id);
                if let Some(body) = body {
                    registry.hold(request_id, body);
                }
                Routing::Unknown
            }
        }
    }

    /// Terminates every live queue with `TransportClosed` and refuses new
    /// subscriptions.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut registry = self.lock();
        registry.orphans.clear();
        for slot in registry.slots.values_mut() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(Err(ChatError::TransportClosed));
            }
        }
    }
}

/// Pushes one encoded body into a live slot, tombstoning it on completion.
fn deliver(slot: &mut Option<Delivery>, body: &str) -> Routing {
    let Some(tx) = slot.as_ref() else {
        return Routing::Unknown;
    };
    let body = match STANDARD.decode(body) {
        Ok(body) => body,
        Err(e) => {
            let _ = tx.send(Err(ChatError::malformed(format!("frame body is not base64: {}", e))));
            *slot = None;
            return Routing::Completed;
        }
    };

    let text = String::from_utf8_lossy(&body);
    if text.contains(&format!("\"{}\"", TITLE_GENERATION)) {
        return Routing::Filtered;
    }
    if let Some(message) = error_marker(&text) {
        let _ = tx.send(Err(ChatError::malformed(format!("server reported an error: {}", message))));
        *slot = None;
        return Routing::Completed;
    }

    let done = data_lines(&text).any(is_done_marker);
    let _ = tx.send(Ok(body));
    if done {
        *slot = None;
        return Routing::Completed;
    }
    Routing::Delivered
}

fn error_marker(body: &str) -> Option<String> {
    data_lines(body)
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .find_map(|value| {
            match value.get("error") {
                Some(Value::Null) | None => None,
                Some(Value::String(message)) => Some(message.clone()),
                Some(other) => Some(other.to_string()),
            }
        })
}

/// Consumer side of one pending request. The map entry goes away once the
/// queue is drained past its sentinel, or when the consumer is dropped.
pub struct PendingStream {
    request_id: String,
    rx: mpsc::UnboundedReceiver<ChatResult<Vec<u8>>>,
    pending: PendingRequests,
}

impl PendingStream {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Moves the subscription to the identifier the server acknowledged.
    pub fn rekey(&mut self, request_id: &str) {
        if request_id != self.request_id {
            self.pending.rekey(&self.request_id, request_id);
            self.request_id = request_id.to_string();
        }
    }
}

impl Stream for PendingStream {
    type Item = ChatResult<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(None) = polled {
            self.pending.remove(&self.request_id);
        }
        polled
    }
}

impl Drop for PendingStream {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}

/// Sole reader of the socket. Returns the socket on shutdown so the owner can
/// close it after the loop has exited.
async fn listen(mut socket: Socket, pending: PendingRequests, mut shutdown: watch::Receiver<bool>) -> Option<Socket> {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Socket listener stopping");
                    break;
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        pending.route_text(&text);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        pending.route_text(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Ok(Message::Close(reason))) => {
                        info!("Server closed the socket: {:?}", reason);
                        pending.close_all();
                        return None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Socket read failed: {}", e);
                        pending.close_all();
                        return None;
                    }
                    None => {
                        info!("Socket stream ended");
                        pending.close_all();
                        return None;
                    }
                }
            }
        }
    }
    pending.close_all();
    Some(socket)
}

/// One persistent socket shared by every request of a session.
pub struct DuplexSocket {
    client: Arc<BackendClient>,
    pending: PendingRequests,
    shutdown: watch::Sender<bool>,
    listener: tokio::sync::Mutex<Option<JoinHandle<Option<Socket>>>>,
}

impl DuplexSocket {
    /// Registers a socket URL with the backend and connects to it.
    pub async fn connect(client: Arc<BackendClient>) -> ChatResult<Self> {
        let registration = client.register_websocket().await?;
        info!("Registered shared websocket");
        Self::connect_url(client, &registration.wss_url).await
    }

    pub async fn connect_url(client: Arc<BackendClient>, wss_url: &str) -> ChatResult<Self> {
        let (socket, _) = connect_async(wss_url).await?;
        let pending = PendingRequests::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(listen(socket, pending.clone(), shutdown_rx));

        Ok(Self {
            client,
            pending,
            shutdown,
            listener: tokio::sync::Mutex::new(Some(listener)),
        })
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }
}

#[async_trait]
impl Transport for DuplexSocket {
    fn mode(&self) -> TransportMode {
        TransportMode::DuplexSocket
    }

    async fn send(&self, payload: &ConversationPayload) -> ChatResult<ResponseStream> {
        let mut payload = payload.clone();
        let request_id = payload.websocket_request_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let mut stream = self.pending.subscribe(&request_id)?;
        let ack = self.client.post_conversation_ack(&payload).await?;
        if ack.websocket_request_id != request_id {
            debug!("Server rewrote request id {} -> {}", request_id, ack.websocket_request_id);
            stream.rekey(&ack.websocket_request_id);
        }
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.listener.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        match handle.await {
            Ok(Some(mut socket)) => {
                if let Err(e) = socket.close(None).await {
                    debug!("Socket close handshake failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Socket listener task failed: {}", e),
        }
        info!("Shared websocket closed");
    }
}
