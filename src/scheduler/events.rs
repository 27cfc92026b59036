//! Poll event fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::transport::{ErrorKind, FetchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Data,
    Error,
}

/// Emitted once per settled poll.
#[derive(Debug, Clone)]
pub enum PollEvent<T> {
    Data {
        key: String,
        payload: T,
        timestamp_ms: u64,
    },
    Error {
        key: String,
        error: FetchError,
        /// True when this failure paused the key.
        paused: bool,
        timestamp_ms: u64,
    },
}

impl<T> PollEvent<T> {
    pub fn key(&self) -> &str {
        match self {
            PollEvent::Data { key, .. } | PollEvent::Error { key, .. } => key,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            PollEvent::Data { .. } => EventKind::Data,
            PollEvent::Error { .. } => EventKind::Error,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PollEvent::Error { error, .. } => Some(error.kind()),
            PollEvent::Data { .. } => None,
        }
    }
}

/// Handle returned by [`EventHub::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<T> = Arc<dyn Fn(&PollEvent<T>) + Send + Sync>;

struct Listener<T> {
    id: ListenerId,
    kind: EventKind,
    handler: Handler<T>,
}

/// Per-key observer lists plus a broadcast stream of every event.
pub struct EventHub<T> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<Listener<T>>>>,
    stream: broadcast::Sender<PollEvent<T>>,
}

impl<T: Clone + Send + 'static> EventHub<T> {
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity);
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
            stream,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Listener<T>>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Call `handler` for every `kind` event of `key`.
    pub fn on<F>(&self, key: impl Into<String>, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&PollEvent<T>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(key.into()).or_default().push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let mut removed = false;
        listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|l| l.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Receive every event for every key.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent<T>> {
        self.stream.subscribe()
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.lock().get(key).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn emit(&self, event: PollEvent<T>) {
        // Handlers run outside the lock so they may call on()/off().
        let handlers: Vec<Handler<T>> = self
            .lock()
            .get(event.key())
            .map(|list| {
                list.iter()
                    .filter(|l| l.kind == event.kind())
                    .map(|l| l.handler.clone())
                    .collect()
            })
            .unwrap_or_default();

        for handler in handlers {
            handler(&event);
        }
        let _ = self.stream.send(event);
    }
}
