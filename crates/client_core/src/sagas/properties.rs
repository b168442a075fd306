use anyhow::Result;
use async_trait::async_trait;
use shared::actions::{Action, ActionType};

use super::{input_value, FetchToState};
use crate::{
    actions::keys,
    context::SagaContext,
    dispatcher::SagaHandler,
    endpoints::{self, EndpointInput},
};

pub fn get_properties() -> FetchToState {
    FetchToState::new(endpoints::LIST_PROPERTIES, keys::GET_PROPERTIES_EPR)
        .query_from(keys::GET_PROPERTIES_EPI)
}

pub fn get_property() -> FetchToState {
    FetchToState::new(endpoints::GET_PROPERTY, keys::GET_PROPERTY_EPR)
        .path_params(&[keys::PROPERTY_ID])
}

pub struct CreateProperty;

#[async_trait]
impl SagaHandler for CreateProperty {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let body = input_value(ctx, action, keys::CREATE_PROPERTY_EPI)?;
        let response = ctx
            .call(&endpoints::CREATE_PROPERTY, EndpointInput::new().body(body))
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.change_input(keys::CREATE_PROPERTY_EPR, response.to_value())
            .await;
        ctx.remove_field(keys::CREATE_PROPERTY_EPI).await;
        ctx.run_action(Action::new(ActionType::GetProperties))
    }
}
