//! Per-invocation view handed to a saga handler.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use shared::actions::{Action, ActionType};
use tracing::debug;

use crate::{
    actions::{change_input, keys, log_event, remove_field},
    browser::BrowserPort,
    config::Settings,
    dispatcher::DispatcherHandle,
    endpoints::{Endpoint, EndpointInput},
    pagination::PaginationCache,
    store::Store,
    transport::{Attachment, RestClient, RestError, RestResponse},
};

/// Collaborators shared by every saga loop.
#[derive(Clone)]
pub struct SagaServices {
    pub rest: RestClient,
    pub store: Store,
    pub browser: Arc<dyn BrowserPort>,
    pub pagination: PaginationCache,
    pub settings: Arc<Settings>,
}

impl SagaServices {
    pub fn new(settings: Settings, browser: Arc<dyn BrowserPort>) -> Result<Self, RestError> {
        Ok(Self {
            rest: RestClient::new(&settings)?,
            store: Store::new(),
            browser,
            pagination: PaginationCache::new(),
            settings: Arc::new(settings),
        })
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = store;
        self
    }
}

pub struct SagaContext {
    services: SagaServices,
    dispatcher: DispatcherHandle,
    kind: ActionType,
    state: Map<String, Value>,
    timeout: Option<Duration>,
}

/// Shallow merge: route/query params shadow store fields of the same name.
pub fn merge_params(
    mut snapshot: Map<String, Value>,
    params: &Map<String, Value>,
) -> Map<String, Value> {
    for (key, value) in params {
        snapshot.insert(key.clone(), value.clone());
    }
    snapshot
}

impl SagaContext {
    pub fn new(
        services: SagaServices,
        dispatcher: DispatcherHandle,
        snapshot: Map<String, Value>,
        action: &Action,
    ) -> Self {
        Self {
            services,
            dispatcher,
            kind: action.kind,
            state: merge_params(snapshot, &action.params),
            timeout: action.timeout,
        }
    }

    pub fn kind(&self) -> ActionType {
        self.kind
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.state.get(key).filter(|value| !value.is_null())
    }

    /// Field rendered as text; numbers are accepted for ids.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.value(key)? {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    pub fn require(&self, key: &str) -> Result<Value> {
        self.value(key)
            .cloned()
            .ok_or_else(|| anyhow!("{}: missing '{key}' in state", self.kind))
    }

    pub fn require_text(&self, key: &str) -> Result<String> {
        self.text(key)
            .ok_or_else(|| anyhow!("{}: missing '{key}' in state", self.kind))
    }

    pub fn pagination(&self) -> &PaginationCache {
        &self.services.pagination
    }

    /// Calls `endpoint` with the action's timeout and the session token.
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        mut input: EndpointInput,
    ) -> Result<RestResponse> {
        if input.timeout.is_none() {
            input.timeout = self.timeout;
        }
        if input.bearer_token.is_none() {
            input.bearer_token = self.text(keys::AUTH_TOKEN);
        }
        self.services
            .rest
            .call(endpoint, input)
            .await
            .with_context(|| format!("{}: {} request failed", self.kind, endpoint.name))
    }

    /// Loose status comparison against `httpSuccessCode` in state (number or
    /// numeric string), falling back to the configured success code.
    pub fn is_success(&self, response: &RestResponse) -> bool {
        let expected = match self.state.get(keys::HTTP_SUCCESS_CODE) {
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
            _ => None,
        }
        .unwrap_or(u64::from(self.services.settings.http_success_code));
        let success = u64::from(response.status) == expected;
        if !success {
            match response.api_error() {
                Some(err) => debug!(
                    action = %self.kind,
                    status = response.status,
                    code = ?err.code,
                    message = %err.message,
                    "saga: backend rejected request"
                ),
                None => debug!(
                    action = %self.kind,
                    status = response.status,
                    "saga: backend rejected request"
                ),
            }
        }
        success
    }

    pub async fn change_input(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.state.insert(key.to_string(), value.clone());
        self.services.store.apply(change_input(key, value)).await;
    }

    pub async fn remove_field(&mut self, key: &str) {
        self.state.remove(key);
        self.services.store.apply(remove_field(key)).await;
    }

    pub async fn log_event(&self, name: &str, data: Value) {
        self.services.store.apply(log_event(name, data)).await;
    }

    pub fn navigate(&self, path: &str) {
        self.services.browser.navigate(path);
    }

    pub fn alert(&self, message: &str) {
        self.services.browser.alert(message);
    }

    pub fn save_download(&self, attachment: &Attachment) {
        self.services.browser.save_download(attachment);
    }

    /// Chains a follow-on action; it is queued behind any pending actions
    /// of the same type.
    pub fn run_action(&self, action: Action) -> Result<()> {
        self.dispatcher.dispatch(action)?;
        Ok(())
    }
}
