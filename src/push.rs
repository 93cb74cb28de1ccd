use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{AttendanceStatus, GrievanceStatus, SubjectAttendanceStat};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid push credential: {0}")]
    Credential(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("failed to encode push frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("push channel is not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaulterAlert {
    #[serde(default)]
    pub subjects: Vec<SubjectAttendanceStat>,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceStatusUpdate {
    pub student_id: String,
    pub grievance_id: String,
    pub status: GrievanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMarked {
    pub subject_id: String,
    pub class_id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceUpdated {
    pub subject_id: String,
    #[serde(default)]
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceSubmitted {
    pub grievance_id: String,
    pub student_id: String,
}

/// Server-to-client events, framed as `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PushEvent {
    DefaulterAlert(DefaulterAlert),
    GrievanceStatus(GrievanceStatusUpdate),
    AttendanceMarkedLive(AttendanceMarked),
    AttendanceUpdated(AttendanceUpdated),
    GrievanceSubmitted(GrievanceSubmitted),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    DefaulterAlert,
    GrievanceStatus,
    AttendanceMarkedLive,
    AttendanceUpdated,
    GrievanceSubmitted,
}

impl PushEvent {
    pub fn name(&self) -> EventName {
        match self {
            PushEvent::DefaulterAlert(_) => EventName::DefaulterAlert,
            PushEvent::GrievanceStatus(_) => EventName::GrievanceStatus,
            PushEvent::AttendanceMarkedLive(_) => EventName::AttendanceMarkedLive,
            PushEvent::AttendanceUpdated(_) => EventName::AttendanceUpdated,
            PushEvent::GrievanceSubmitted(_) => EventName::GrievanceSubmitted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaulterNotification {
    pub student_id: String,
    pub subjects: Vec<SubjectAttendanceStat>,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRoom {
    pub subject_id: String,
    pub class_id: String,
}

/// Client-to-server emits, framed like [`PushEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    SubscribeDefaulterAlerts,
    SubscribeSystemNotifications,
    DefaulterNotification(DefaulterNotification),
    JoinAttendanceRoom(AttendanceRoom),
    LeaveAttendanceRoom(AttendanceRoom),
    MarkAttendanceLive(AttendanceMarked),
    JoinGrievanceRoom(String),
}

impl ClientEvent {
    /// Topic joins that must be re-sent on every new connection.
    fn is_subscription(&self) -> bool {
        matches!(
            self,
            ClientEvent::SubscribeDefaulterAlerts
                | ClientEvent::SubscribeSystemNotifications
                | ClientEvent::JoinAttendanceRoom(_)
                | ClientEvent::JoinGrievanceRoom(_)
        )
    }
}

/// Opens connections to the push channel.
pub trait PushTransport {
    type Connection: PushConnection;

    async fn open(&self, url: &str, credential: &str) -> Result<Self::Connection, PushError>;
}

/// One established push connection carrying JSON text frames.
pub trait PushConnection {
    async fn send(&mut self, frame: String) -> Result<(), PushError>;

    /// `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String, PushError>>;

    async fn close(&mut self) -> Result<(), PushError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&PushEvent) + Send>;

struct Active<C> {
    handle: ConnectionHandle,
    connection: C,
}

/// Owns at most one push connection for an authenticated session.
///
/// Listeners are keyed by event name; several may be registered for the same
/// event and run in registration order. Topic subscriptions are remembered and
/// replayed on each new connection. A dropped connection is not retried: the
/// manager stays disconnected until `connect` is called again.
pub struct ConnectionManager<T: PushTransport> {
    transport: T,
    url: String,
    active: Option<Active<T::Connection>>,
    listeners: HashMap<EventName, Vec<(ListenerId, Listener)>>,
    subscriptions: Vec<ClientEvent>,
    next_handle: u64,
    next_listener: u64,
}

impl<T: PushTransport> ConnectionManager<T> {
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            active: None,
            listeners: HashMap::new(),
            subscriptions: Vec::new(),
            next_handle: 0,
            next_listener: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    /// Returns the existing handle when already connected. If replaying the
    /// remembered subscriptions fails, the new connection is closed again and
    /// the manager stays disconnected.
    pub async fn connect(&mut self, credential: &str) -> Result<ConnectionHandle, PushError> {
        if let Some(active) = &self.active {
            return Ok(active.handle);
        }

        let connection = match self.transport.open(&self.url, credential).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(url = %self.url, error = %err, "push connection failed");
                return Err(err);
            }
        };
        self.next_handle += 1;
        let handle = ConnectionHandle(self.next_handle);
        self.active = Some(Active { handle, connection });
        info!(url = %self.url, handle = handle.0, "connected to push channel");

        for subscription in self.subscriptions.clone() {
            if let Err(err) = self.send(&subscription).await {
                warn!(handle = handle.0, error = %err, "failed to replay subscriptions");
                if let Some(mut active) = self.active.take() {
                    if let Err(err) = active.connection.close().await {
                        debug!(error = %err, "error while closing push connection");
                    }
                }
                return Err(err);
            }
        }
        Ok(handle)
    }

    /// Closes the connection and forgets all listeners and subscriptions.
    /// Does nothing when not connected.
    pub async fn disconnect(&mut self) {
        self.listeners.clear();
        self.subscriptions.clear();
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Err(err) = active.connection.close().await {
            debug!(error = %err, "error while closing push connection");
        }
        info!(handle = active.handle.0, "disconnected from push channel");
    }

    pub fn on(
        &mut self,
        event: EventName,
        listener: impl FnMut(&PushEvent) + Send + 'static,
    ) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners
            .entry(event)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Removes one listener, or every listener for `event` when `id` is `None`.
    pub fn off(&mut self, event: EventName, id: Option<ListenerId>) {
        match id {
            None => {
                self.listeners.remove(&event);
            }
            Some(id) => {
                if let Some(listeners) = self.listeners.get_mut(&event) {
                    listeners.retain(|(existing, _)| *existing != id);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self, event: EventName) -> usize {
        self.listeners.get(&event).map_or(0, Vec::len)
    }

    /// Sends `event`. Subscriptions are recorded first, so one emitted while
    /// disconnected is sent on the next connect instead of failing.
    pub async fn emit(&mut self, event: ClientEvent) -> Result<(), PushError> {
        if let ClientEvent::LeaveAttendanceRoom(room) = &event {
            self.subscriptions.retain(
                |s| !matches!(s, ClientEvent::JoinAttendanceRoom(joined) if joined == room),
            );
        }
        if event.is_subscription() {
            if !self.subscriptions.contains(&event) {
                self.subscriptions.push(event.clone());
            }
            if self.active.is_none() {
                debug!(?event, "queued subscription until connected");
                return Ok(());
            }
        }
        self.send(&event).await
    }

    async fn send(&mut self, event: &ClientEvent) -> Result<(), PushError> {
        let active = self.active.as_mut().ok_or(PushError::NotConnected)?;
        let frame = serde_json::to_string(event)?;
        active.connection.send(frame).await
    }

    /// Waits for the next decodable event, runs its listeners and returns it.
    /// Returns `None` when not connected or once the connection drops.
    pub async fn next_event(&mut self) -> Option<PushEvent> {
        loop {
            let active = self.active.as_mut()?;
            match active.connection.recv().await {
                Some(Ok(frame)) => match serde_json::from_str::<PushEvent>(&frame) {
                    Ok(event) => {
                        self.dispatch(&event);
                        return Some(event);
                    }
                    Err(err) => debug!(error = %err, "ignoring undecodable push frame"),
                },
                Some(Err(err)) => {
                    warn!(handle = active.handle.0, error = %err, "push connection dropped");
                    self.active = None;
                    return None;
                }
                None => {
                    warn!(handle = active.handle.0, "push channel closed by server");
                    self.active = None;
                    return None;
                }
            }
        }
    }

    fn dispatch(&mut self, event: &PushEvent) {
        if let Some(listeners) = self.listeners.get_mut(&event.name()) {
            for (_, listener) in listeners.iter_mut() {
                listener(event);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio_tungstenite::tungstenite;

    use super::*;

    /// In-memory transport. Inbound entries of `None` simulate a dropped
    /// connection; an empty queue reads as a clean close.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        pub opened: Arc<Mutex<u32>>,
        pub closed: Arc<Mutex<u32>>,
        pub sent: Arc<Mutex<Vec<String>>>,
        pub inbound: Arc<Mutex<VecDeque<Option<String>>>>,
        pub refuse: bool,
        pub fail_sends: bool,
    }

    impl FakeTransport {
        pub fn push(&self, event: &PushEvent) {
            let frame = serde_json::to_string(event).unwrap();
            self.inbound.lock().unwrap().push_back(Some(frame));
        }

        pub fn push_raw(&self, frame: &str) {
            self.inbound.lock().unwrap().push_back(Some(frame.to_string()));
        }

        pub fn drop_connection(&self) {
            self.inbound.lock().unwrap().push_back(None);
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    pub struct FakeConnection {
        transport: FakeTransport,
    }

    impl PushTransport for FakeTransport {
        type Connection = FakeConnection;

        async fn open(&self, _url: &str, _credential: &str) -> Result<FakeConnection, PushError> {
            if self.refuse {
                return Err(PushError::Transport(tungstenite::Error::ConnectionClosed));
            }
            *self.opened.lock().unwrap() += 1;
            Ok(FakeConnection {
                transport: self.clone(),
            })
        }
    }

    impl PushConnection for FakeConnection {
        async fn send(&mut self, frame: String) -> Result<(), PushError> {
            if self.transport.fail_sends {
                return Err(PushError::Transport(tungstenite::Error::AlreadyClosed));
            }
            self.transport.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, PushError>> {
            match self.transport.inbound.lock().unwrap().pop_front() {
                Some(Some(frame)) => Some(Ok(frame)),
                Some(None) => Some(Err(PushError::Transport(tungstenite::Error::AlreadyClosed))),
                None => None,
            }
        }

        async fn close(&mut self) -> Result<(), PushError> {
            *self.transport.closed.lock().unwrap() += 1;
            Ok(())
        }
    }
}
