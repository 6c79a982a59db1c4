use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::protocol::{ServerEvent, SessionId};

/// Fan-out of server events to connected sessions.
pub trait Broadcaster {
    fn send_to(&self, id: &str, event: &ServerEvent);

    /// Sends to every connection except `exclude`, when given.
    fn publish(&self, event: &ServerEvent, exclude: Option<&str>);
}

/// Outbound queues of every live WebSocket, keyed by session id.
/// Delivery is fire-and-forget: a closed queue just drops the event.
#[derive(Default)]
pub struct ClientHub {
    clients: HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: SessionId, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.clients.insert(id, sender);
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Broadcaster for ClientHub {
    fn send_to(&self, id: &str, event: &ServerEvent) {
        if let Some(sender) = self.clients.get(id) {
            let _ = sender.send(event.clone());
        }
    }

    fn publish(&self, event: &ServerEvent, exclude: Option<&str>) {
        for (id, sender) in &self.clients {
            if exclude == Some(id.as_str()) {
                continue;
            }
            let _ = sender.send(event.clone());
        }
    }
}
