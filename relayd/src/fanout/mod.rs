//! Dashboard fan-out server.
//!
//! A single hub task owns every piece of subscription state: connected
//! clients, per-service log subscriptions, the last observed status
//! snapshot, and the per-service log anchors. Everything reaches the hub as
//! a command on its queue - WebSocket client traffic, scene/privacy observer
//! events, and the results of runtime calls. Runtime calls themselves are
//! spawned off the hub loop so a slow runtime never stalls broadcasting.
//!
//! Each client has an unbounded outbound queue drained by its own writer
//! task; messages for one subscriber are delivered in enqueue order. A send
//! failure evicts the subscriber from the client map and every subscription
//! set.

pub mod diff;
pub mod messages;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fanout::diff::{delta_after_anchor, diff_statuses};
use crate::fanout::messages::{
    ClientMessage, PrivacyChangeData, SceneChangeData, ServerMessage, StatusChange,
};
use crate::scene::{SceneStateCell, StateEvent};
use crate::services::{ServiceController, ServiceStatus};

/// Status monitor cadence.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Log tail cadence for subscribed services.
const LOG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Window refetched on each log poll.
const LOG_POLL_WINDOW: usize = 50;

/// Default `log_snapshot` size.
const DEFAULT_SNAPSHOT_LINES: usize = 100;

/// WebSocket keepalive cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type ClientId = u64;
type Outbound = mpsc::UnboundedSender<String>;

enum HubCommand {
    Register {
        id: ClientId,
        tx: Outbound,
    },
    Unregister {
        id: ClientId,
    },
    Client {
        id: ClientId,
        message: ClientMessage,
    },
    /// Scene/privacy observer event, posted from whichever thread served the
    /// mutation.
    StateEvent(StateEvent),
    /// Completed status poll.
    StatusSnapshot(Vec<ServiceStatus>),
    /// Completed log poll for one service. `None` marks a failed fetch.
    LogsFetched {
        container: String,
        lines: Option<Vec<String>>,
    },
    /// Completed snapshot fetch for a fresh log subscription.
    SnapshotFetched {
        id: ClientId,
        container: String,
        lines: Vec<String>,
    },
}

/// Cloneable handle used by the API layer and state observers.
#[derive(Clone)]
pub struct HubHandle {
    cmd_tx: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Post a scene/privacy change for broadcasting. Safe to call from any
    /// thread; this is the hub's "post to loop" primitive.
    pub fn post_state_event(&self, event: StateEvent) {
        let _ = self.cmd_tx.send(HubCommand::StateEvent(event));
    }

    /// Drive one accepted WebSocket connection until it closes.
    pub async fn handle_socket(&self, socket: WebSocket) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        if self.cmd_tx.send(HubCommand::Register { id, tx }).is_err() {
            return;
        }
        debug!(client = id, "subscriber connected");

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        // Evicted by the hub.
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                incoming = ws_rx.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(message) => {
                                    let _ = self.cmd_tx.send(HubCommand::Client { id, message });
                                }
                                Err(error) => {
                                    warn!(client = id, %error, "ignoring unknown client message");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        }

        let _ = self.cmd_tx.send(HubCommand::Unregister { id });
        debug!(client = id, "subscriber disconnected");
    }
}

/// Spawn the hub task and return its handle.
pub fn spawn(
    controller: Arc<ServiceController>,
    scene: Arc<SceneStateCell>,
    cancel: CancellationToken,
) -> HubHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = HubHandle {
        cmd_tx: cmd_tx.clone(),
        next_id: Arc::new(AtomicU64::new(1)),
    };

    let hub = Hub::new(controller, scene, cmd_tx);
    tokio::spawn(hub.run(cmd_rx, cancel));

    handle
}

struct Hub {
    controller: Arc<ServiceController>,
    scene: Arc<SceneStateCell>,
    /// Used by spawned runtime calls to post their results back.
    cmd_tx: mpsc::UnboundedSender<HubCommand>,
    clients: HashMap<ClientId, Outbound>,
    log_subscribers: HashMap<String, HashSet<ClientId>>,
    last_statuses: HashMap<String, ServiceStatus>,
    /// Per-service anchor: the last line broadcast to anyone.
    log_anchors: HashMap<String, String>,
    status_poll_inflight: bool,
    log_polls_inflight: HashSet<String>,
}

impl Hub {
    fn new(
        controller: Arc<ServiceController>,
        scene: Arc<SceneStateCell>,
        cmd_tx: mpsc::UnboundedSender<HubCommand>,
    ) -> Self {
        Self {
            controller,
            scene,
            cmd_tx,
            clients: HashMap::new(),
            log_subscribers: HashMap::new(),
            last_statuses: HashMap::new(),
            log_anchors: HashMap::new(),
            status_poll_inflight: false,
            log_polls_inflight: HashSet::new(),
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<HubCommand>,
        cancel: CancellationToken,
    ) {
        info!("fan-out hub started");

        let mut status_tick = tokio::time::interval(STATUS_POLL_INTERVAL);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut log_tick = tokio::time::interval(LOG_POLL_INTERVAL);
        log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("fan-out hub shutting down");
                    return;
                }
                _ = status_tick.tick() => self.poll_statuses(),
                _ = log_tick.tick() => self.poll_logs(),
                command = cmd_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => return,
                    }
                }
            }
        }
    }

    /// Kick off one status poll off the hub loop.
    fn poll_statuses(&mut self) {
        if self.status_poll_inflight {
            return;
        }
        self.status_poll_inflight = true;

        let controller = self.controller.clone();
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let list = controller.list_services().await;
            let _ = cmd_tx.send(HubCommand::StatusSnapshot(list.containers));
        });
    }

    /// Kick off log polls for every service with at least one subscriber.
    fn poll_logs(&mut self) {
        for container in self.log_subscribers.keys() {
            if self.log_polls_inflight.contains(container) {
                continue;
            }
            self.log_polls_inflight.insert(container.clone());

            let controller = self.controller.clone();
            let cmd_tx = self.cmd_tx.clone();
            let container = container.clone();
            tokio::spawn(async move {
                let lines = match controller.logs(&container, LOG_POLL_WINDOW).await {
                    Ok(logs) => Some(logs.logs),
                    Err(error) => {
                        warn!(%container, %error, "log poll failed");
                        None
                    }
                };
                let _ = cmd_tx.send(HubCommand::LogsFetched { container, lines });
            });
        }
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, tx } => {
                self.clients.insert(id, tx.clone());
                // Initial state is fetched off the loop and sent straight to
                // the new subscriber.
                let controller = self.controller.clone();
                let scene = self.scene.clone();
                tokio::spawn(async move {
                    let list = controller.list_services().await;
                    let snapshot = scene.snapshot();
                    let message = ServerMessage::InitialState {
                        timestamp: Utc::now(),
                        containers: list.containers,
                        current_scene: snapshot.current_scene,
                        privacy_enabled: snapshot.privacy_enabled,
                        scene_timestamp: snapshot.scene_timestamp,
                    };
                    if let Ok(json) = serde_json::to_string(&message) {
                        let _ = tx.send(json);
                    }
                });
            }
            HubCommand::Unregister { id } => self.evict(id),
            HubCommand::Client { id, message } => self.handle_client_message(id, message),
            HubCommand::StateEvent(event) => self.broadcast_state_event(event),
            HubCommand::StatusSnapshot(containers) => self.apply_status_snapshot(containers),
            HubCommand::LogsFetched { container, lines } => {
                self.log_polls_inflight.remove(&container);
                if let Some(lines) = lines {
                    self.fan_out_new_logs(&container, lines);
                }
            }
            HubCommand::SnapshotFetched {
                id,
                container,
                lines,
            } => {
                // The snapshot is a broadcast too: advance the anchor so the
                // next poll sends only lines the subscriber has not seen.
                if let Some(last) = lines.last() {
                    self.log_anchors.insert(container.clone(), last.clone());
                }
                let message = ServerMessage::LogSnapshot {
                    timestamp: Utc::now(),
                    container: container.clone(),
                    logs: lines,
                };
                if self.send_to(id, &message) {
                    self.log_subscribers.entry(container).or_default().insert(id);
                } else {
                    self.evict(id);
                }
            }
        }
    }

    fn handle_client_message(&mut self, id: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::SubscribeLogs { container, lines } => {
                let lines = lines.unwrap_or(DEFAULT_SNAPSHOT_LINES);
                debug!(client = id, %container, lines, "log subscription");

                let controller = self.controller.clone();
                let cmd_tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    match controller.logs(&container, lines).await {
                        Ok(logs) => {
                            let _ = cmd_tx.send(HubCommand::SnapshotFetched {
                                id,
                                container,
                                lines: logs.logs,
                            });
                        }
                        Err(error) => {
                            warn!(client = id, %container, %error, "log snapshot failed");
                        }
                    }
                });
            }
            ClientMessage::UnsubscribeLogs { container } => {
                debug!(client = id, %container, "log unsubscription");
                if let Some(subscribers) = self.log_subscribers.get_mut(&container) {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        self.log_subscribers.remove(&container);
                    }
                }
            }
        }
    }

    fn broadcast_state_event(&mut self, event: StateEvent) {
        let snapshot = self.scene.snapshot();
        let message = match event {
            StateEvent::SceneChanged {
                previous,
                current,
                at,
            } => ServerMessage::SceneChange {
                timestamp: Utc::now(),
                current_scene: snapshot.current_scene,
                privacy_enabled: snapshot.privacy_enabled,
                change_data: SceneChangeData {
                    previous_scene: previous,
                    current_scene: current,
                    timestamp: at,
                },
            },
            StateEvent::PrivacyChanged { enabled, at } => ServerMessage::PrivacyChange {
                timestamp: Utc::now(),
                current_scene: snapshot.current_scene,
                privacy_enabled: snapshot.privacy_enabled,
                change_data: PrivacyChangeData {
                    enabled,
                    timestamp: at,
                },
            },
        };
        self.broadcast(&message);
    }

    fn apply_status_snapshot(&mut self, containers: Vec<ServiceStatus>) {
        self.status_poll_inflight = false;

        let changes: Vec<StatusChange> = diff_statuses(&self.last_statuses, &containers);
        self.last_statuses = containers
            .into_iter()
            .map(|status| (status.name.clone(), status))
            .collect();

        if changes.is_empty() || self.clients.is_empty() {
            return;
        }

        let snapshot = self.scene.snapshot();
        let message = ServerMessage::StatusChange {
            timestamp: Utc::now(),
            changes,
            current_scene: snapshot.current_scene,
            privacy_enabled: snapshot.privacy_enabled,
        };
        self.broadcast(&message);
    }

    fn fan_out_new_logs(&mut self, container: &str, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }

        let delta: Vec<String> = {
            let anchor = self.log_anchors.get(container).map(String::as_str);
            delta_after_anchor(&lines, anchor).to_vec()
        };
        if delta.is_empty() {
            return;
        }
        if let Some(last) = lines.last() {
            self.log_anchors.insert(container.to_string(), last.clone());
        }

        let Some(subscribers) = self.log_subscribers.get(container) else {
            return;
        };
        let message = ServerMessage::NewLogs {
            timestamp: Utc::now(),
            container: container.to_string(),
            logs: delta,
        };
        let Ok(json) = serde_json::to_string(&message) else {
            return;
        };

        let mut dead = Vec::new();
        for &id in subscribers {
            let alive = self
                .clients
                .get(&id)
                .is_some_and(|tx| tx.send(json.clone()).is_ok());
            if !alive {
                dead.push(id);
            }
        }
        for id in dead {
            self.evict(id);
        }
    }

    /// Send to every connected client; eviction on failure never blocks the
    /// other subscribers.
    fn broadcast(&mut self, message: &ServerMessage) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };

        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, tx)| tx.send(json.clone()).is_err())
            .map(|(&id, _)| id)
            .collect();
        for id in dead {
            self.evict(id);
        }
    }

    fn send_to(&self, id: ClientId, message: &ServerMessage) -> bool {
        let Some(tx) = self.clients.get(&id) else {
            return false;
        };
        serde_json::to_string(message)
            .ok()
            .is_some_and(|json| tx.send(json).is_ok())
    }

    /// Remove a client from the map and every log-subscription set.
    fn evict(&mut self, id: ClientId) {
        self.clients.remove(&id);
        self.log_subscribers.retain(|_, subscribers| {
            subscribers.remove(&id);
            !subscribers.is_empty()
        });
    }
}
