use anyhow::Result;
use async_trait::async_trait;
use shared::{
    actions::{Action, ActionType},
    domain::CreateReviewRequest,
};

use super::{typed_input, FetchToState};
use crate::{
    actions::keys,
    context::SagaContext,
    dispatcher::SagaHandler,
    endpoints::{self, EndpointInput},
};

pub const INVALID_RATING_ALERT: &str = "Please pick a rating between 1 and 5";

pub fn get_reviews() -> FetchToState {
    FetchToState::new(endpoints::LIST_REVIEWS, keys::GET_REVIEWS_EPR)
        .path_params(&[keys::LISTING_ID])
}

pub struct CreateReview;

#[async_trait]
impl SagaHandler for CreateReview {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let listing_id = ctx.require_text(keys::LISTING_ID)?;
        let request: CreateReviewRequest = typed_input(ctx, action, keys::CREATE_REVIEW_EPI)?;
        if !(1..=5).contains(&request.rating) {
            ctx.alert(INVALID_RATING_ALERT);
            return Ok(());
        }

        let response = ctx
            .call(
                &endpoints::CREATE_REVIEW,
                EndpointInput::new()
                    .path_param(keys::LISTING_ID, listing_id.clone())
                    .body(serde_json::to_value(&request)?),
            )
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.remove_field(keys::CREATE_REVIEW_EPI).await;
        ctx.run_action(Action::new(ActionType::GetReviews).with_param(keys::LISTING_ID, listing_id))
    }
}
