//! Action handlers, one per `ActionType`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::actions::{Action, ActionType};

use crate::{
    context::{SagaContext, SagaServices},
    dispatcher::{SagaHandler, SagaRuntime, SagaRuntimeBuilder},
    endpoints::{self, Endpoint, EndpointInput},
};

pub mod auth;
pub mod bookings;
pub mod listings;
pub mod properties;
pub mod reviews;
pub mod socket;

pub fn register_all(builder: SagaRuntimeBuilder) -> SagaRuntimeBuilder {
    builder
        .register(ActionType::Login, auth::Login)
        .register(ActionType::Signup, auth::Signup)
        .register(ActionType::Logout, auth::Logout)
        .register(
            ActionType::GetCurrentUser,
            FetchToState::new(endpoints::CURRENT_USER, crate::actions::keys::CURRENT_USER),
        )
        .register(ActionType::UpdateProfile, auth::UpdateProfile)
        .register(ActionType::GetProperties, properties::get_properties())
        .register(ActionType::GetProperty, properties::get_property())
        .register(ActionType::CreateProperty, properties::CreateProperty)
        .register(ActionType::GetListings, listings::GetListings)
        .register(ActionType::GetListing, listings::GetListing)
        .register(ActionType::CreateListing, listings::CreateListing)
        .register(ActionType::UpdateListing, listings::UpdateListing)
        .register(ActionType::DeleteListing, listings::DeleteListing)
        .register(ActionType::UploadListingImage, listings::UploadListingImage)
        .register(ActionType::SearchListings, listings::SearchListings)
        .register(ActionType::GetBookings, bookings::get_bookings())
        .register(ActionType::CreateBooking, bookings::CreateBooking)
        .register(ActionType::CancelBooking, bookings::CancelBooking)
        .register(ActionType::DownloadInvoice, bookings::DownloadInvoice)
        .register(ActionType::GetReviews, reviews::get_reviews())
        .register(ActionType::CreateReview, reviews::CreateReview)
        .register(ActionType::SocketMessage, socket::SocketMessage)
}

/// Starts a runtime with every handler in this module registered.
pub fn start_runtime(services: SagaServices) -> SagaRuntime {
    register_all(SagaRuntime::builder(services)).start()
}

/// The action's own payload when it carries an object, otherwise the named
/// endpoint-input field from state.
pub(crate) fn input_value(ctx: &SagaContext, action: &Action, key: &str) -> Result<Value> {
    match &action.payload {
        Value::Object(_) => Ok(action.payload.clone()),
        _ => ctx.require(key),
    }
}

pub(crate) fn typed_input<T: DeserializeOwned>(
    ctx: &SagaContext,
    action: &Action,
    key: &str,
) -> Result<T> {
    let value = input_value(ctx, action, key)?;
    serde_json::from_value(value)
        .with_context(|| format!("{}: malformed '{key}' input", action.kind))
}

/// GET an endpoint and store its body under `target` on success.
pub struct FetchToState {
    endpoint: Endpoint,
    target: &'static str,
    path_params: &'static [&'static str],
    query_from: Option<&'static str>,
}

impl FetchToState {
    pub fn new(endpoint: Endpoint, target: &'static str) -> Self {
        Self {
            endpoint,
            target,
            path_params: &[],
            query_from: None,
        }
    }

    pub fn path_params(mut self, names: &'static [&'static str]) -> Self {
        self.path_params = names;
        self
    }

    pub fn query_from(mut self, key: &'static str) -> Self {
        self.query_from = Some(key);
        self
    }
}

#[async_trait]
impl SagaHandler for FetchToState {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let mut input = EndpointInput::new();
        for name in self.path_params {
            input = input.path_param(*name, ctx.require_text(name)?);
        }
        if let Some(key) = self.query_from {
            if let Some(query) = ctx.value(key) {
                input = input.query_object(query);
            }
        }
        input = input.query_object(&action.payload);

        let response = ctx.call(&self.endpoint, input).await?;
        if ctx.is_success(&response) {
            ctx.change_input(self.target, response.to_value()).await;
        }
        Ok(())
    }
}
