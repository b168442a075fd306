//! One loop per action type.
//!
//! Each registered type owns an unbounded queue drained by a single task, so
//! actions of one type run strictly one after another while different types
//! interleave freely. Handler failures and panics are logged and the loop
//! moves on to its next action.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::actions::{Action, ActionType};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    context::{SagaContext, SagaServices},
    store::Store,
};

#[async_trait]
pub trait SagaHandler: Send + Sync {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no saga registered for action {0}")]
    Unhandled(ActionType),
    #[error("saga loop for action {0} has stopped")]
    Stopped(ActionType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaEvent {
    Started { kind: ActionType },
    Completed { kind: ActionType },
    Failed { kind: ActionType, error: String },
    Panicked { kind: ActionType, message: String },
}

impl SagaEvent {
    pub fn kind(&self) -> ActionType {
        match self {
            SagaEvent::Started { kind }
            | SagaEvent::Completed { kind }
            | SagaEvent::Failed { kind, .. }
            | SagaEvent::Panicked { kind, .. } => *kind,
        }
    }

    /// True once the handler invocation is over, whatever the outcome.
    pub fn is_finished(&self) -> bool {
        !matches!(self, SagaEvent::Started { .. })
    }
}

#[derive(Clone)]
pub struct DispatcherHandle {
    queues: Arc<HashMap<ActionType, mpsc::UnboundedSender<Action>>>,
}

impl DispatcherHandle {
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        let kind = action.kind;
        let queue = self
            .queues
            .get(&kind)
            .ok_or(DispatchError::Unhandled(kind))?;
        queue.send(action).map_err(|_| DispatchError::Stopped(kind))?;
        debug!(action = %kind, "saga: action queued");
        Ok(())
    }
}

pub struct SagaRuntimeBuilder {
    services: SagaServices,
    handlers: HashMap<ActionType, Arc<dyn SagaHandler>>,
}

impl SagaRuntimeBuilder {
    pub fn register(mut self, kind: ActionType, handler: impl SagaHandler + 'static) -> Self {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            warn!(action = %kind, "saga: replacing previously registered handler");
        }
        self
    }

    pub fn start(self) -> SagaRuntime {
        let (events, _) = broadcast::channel(1024);
        let mut queues = HashMap::new();
        let mut receivers = Vec::new();
        for (kind, handler) in self.handlers {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(kind, tx);
            receivers.push((kind, handler, rx));
        }
        let handle = DispatcherHandle {
            queues: Arc::new(queues),
        };

        let tasks = receivers
            .into_iter()
            .map(|(kind, handler, rx)| {
                tokio::spawn(run_loop(
                    kind,
                    handler,
                    rx,
                    self.services.clone(),
                    handle.clone(),
                    events.clone(),
                ))
            })
            .collect::<Vec<_>>();
        info!(loops = tasks.len(), "saga: runtime started");

        SagaRuntime {
            services: self.services,
            handle,
            events,
            tasks,
        }
    }
}

pub struct SagaRuntime {
    services: SagaServices,
    handle: DispatcherHandle,
    events: broadcast::Sender<SagaEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl SagaRuntime {
    pub fn builder(services: SagaServices) -> SagaRuntimeBuilder {
        SagaRuntimeBuilder {
            services,
            handlers: HashMap::new(),
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        self.handle.dispatch(action)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SagaEvent> {
        self.events.subscribe()
    }

    pub fn services(&self) -> &SagaServices {
        &self.services
    }

    pub fn store(&self) -> &Store {
        &self.services.store
    }

    /// Stops every loop. Queued actions are dropped; a handler body already
    /// running is left to finish on its own. Dropping the runtime does the
    /// same.
    pub fn shutdown(self) {
        drop(self);
    }
}

// Loops hold dispatcher handles of their own, so the queues never close by
// themselves.
impl Drop for SagaRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("saga: runtime stopped");
    }
}

async fn run_loop(
    kind: ActionType,
    handler: Arc<dyn SagaHandler>,
    mut queue: mpsc::UnboundedReceiver<Action>,
    services: SagaServices,
    dispatcher: DispatcherHandle,
    events: broadcast::Sender<SagaEvent>,
) {
    while let Some(action) = queue.recv().await {
        let _ = events.send(SagaEvent::Started { kind });
        let snapshot = services.store.snapshot().await;
        let mut ctx = SagaContext::new(services.clone(), dispatcher.clone(), snapshot, &action);
        let handler = Arc::clone(&handler);

        let body = tokio::spawn(async move { handler.handle(&mut ctx, &action).await });
        let outcome = match body.await {
            Ok(Ok(())) => SagaEvent::Completed { kind },
            Ok(Err(err)) => {
                let error = format!("{err:#}");
                warn!(action = %kind, %error, "saga: handler failed");
                SagaEvent::Failed { kind, error }
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(action = %kind, %message, "saga: handler panicked");
                SagaEvent::Panicked { kind, message }
            }
            Err(join_err) => {
                let error = join_err.to_string();
                warn!(action = %kind, %error, "saga: handler cancelled");
                SagaEvent::Failed { kind, error }
            }
        };
        let _ = events.send(outcome);
    }
    debug!(action = %kind, "saga: loop finished");
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
