//! Per-caller paging tokens.
//!
//! A caller-supplied id maps to the last paging token the backend handed out.
//! The first run for an id derives a token from the source endpoint, later
//! runs go straight to the token endpoint and fall back to the source once
//! when the token is rejected.

use std::{collections::HashMap, future::Future, sync::Arc};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::transport::RestResponse;

pub const PAGE_TOKEN_FIELD: &str = "pageToken";
pub const NEXT_PAGE_TOKEN_FIELD: &str = "nextPageToken";

type Slot = Arc<Mutex<Option<String>>>;

#[derive(Clone, Default)]
pub struct PaginationCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl PaginationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn token(&self, id: &str) -> Option<String> {
        let slot = self.slots.lock().await.get(id).cloned()?;
        let token = slot.lock().await.clone();
        token
    }

    pub async fn clear(&self, id: &str) {
        let slot = self.slots.lock().await.get(id).cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    async fn slot(&self, id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    /// Runs one paginated fetch for `id`.
    ///
    /// Runs for the same id are serialised; different ids do not block each
    /// other.
    pub async fn run<E, F, S, SF, P, PF>(
        &self,
        id: &str,
        is_success: F,
        source: S,
        paged: P,
    ) -> Result<RestResponse, E>
    where
        F: Fn(&RestResponse) -> bool,
        S: FnOnce() -> SF,
        SF: Future<Output = Result<RestResponse, E>>,
        P: Fn(String) -> PF,
        PF: Future<Output = Result<RestResponse, E>>,
    {
        let slot = self.slot(id).await;
        let mut token = slot.lock().await;

        if let Some(cached) = token.clone() {
            match paged(cached).await {
                Ok(response) if is_success(&response) => {
                    remember_next_token(&mut token, &response);
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(
                        pager = id,
                        status = response.status,
                        "pagination: cached token rejected, re-deriving"
                    );
                    *token = None;
                }
                Err(err) => {
                    *token = None;
                    return Err(err);
                }
            }
        }

        let source_response = source().await?;
        if !is_success(&source_response) {
            return Ok(source_response);
        }
        let Some(fresh) = source_response
            .field(PAGE_TOKEN_FIELD)
            .and_then(token_text)
        else {
            warn!(pager = id, "pagination: source response carried no paging token");
            return Ok(source_response);
        };
        *token = Some(fresh.clone());

        match paged(fresh).await {
            Ok(response) => {
                if is_success(&response) {
                    remember_next_token(&mut token, &response);
                } else {
                    *token = None;
                }
                Ok(response)
            }
            Err(err) => {
                *token = None;
                Err(err)
            }
        }
    }
}

fn remember_next_token(token: &mut Option<String>, response: &RestResponse) {
    if let Some(next) = response.field(NEXT_PAGE_TOKEN_FIELD).and_then(token_text) {
        *token = Some(next);
    }
}

fn token_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
