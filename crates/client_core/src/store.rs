//! Single shared key/value store and its reducer.

use std::sync::Arc;

use serde_json::{Map, Value};
use shared::protocol::{LoggedEvent, StoreAction};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
pub struct StoreState {
    pub fields: Map<String, Value>,
    pub events: Vec<LoggedEvent>,
}

pub fn reduce(state: &mut StoreState, action: &StoreAction) {
    match action {
        StoreAction::ChangeInput { key, value } => {
            state.fields.insert(key.clone(), value.clone());
        }
        StoreAction::RemoveField { key } => {
            state.fields.remove(key);
        }
        StoreAction::LogEvent { name, data } => {
            state.events.push(LoggedEvent::new(name.clone(), data.clone()));
        }
    }
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<StoreState>>,
    changes: broadcast::Sender<StoreAction>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_fields(Map::new())
    }

    pub fn with_fields(fields: Map<String, Value>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(StoreState {
                fields,
                events: Vec::new(),
            })),
            changes,
        }
    }

    pub async fn apply(&self, action: StoreAction) {
        {
            let mut guard = self.inner.write().await;
            reduce(&mut guard, &action);
        }
        match &action {
            StoreAction::LogEvent { name, .. } => info!(event = %name, "store: event logged"),
            StoreAction::ChangeInput { key, .. } => debug!(%key, "store: field changed"),
            StoreAction::RemoveField { key } => debug!(%key, "store: field removed"),
        }
        let _ = self.changes.send(action);
    }

    pub async fn snapshot(&self) -> Map<String, Value> {
        self.inner.read().await.fields.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.fields.get(key).cloned()
    }

    pub async fn events(&self) -> Vec<LoggedEvent> {
        self.inner.read().await.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreAction> {
        self.changes.subscribe()
    }
}
