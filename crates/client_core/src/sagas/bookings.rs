use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use shared::{
    actions::{Action, ActionType},
    domain::CreateBookingRequest,
};
use tracing::warn;

use super::{typed_input, FetchToState};
use crate::{
    actions::keys,
    context::SagaContext,
    dispatcher::SagaHandler,
    endpoints::{self, EndpointInput},
};

pub const UNAVAILABLE_DATES_ALERT: &str = "This listing is not available for the selected dates";
pub const INVALID_DATES_ALERT: &str = "Check-out must be after check-in";

pub fn get_bookings() -> FetchToState {
    FetchToState::new(endpoints::LIST_BOOKINGS, keys::GET_BOOKINGS_EPR)
}

pub struct CreateBooking;

#[async_trait]
impl SagaHandler for CreateBooking {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let request: CreateBookingRequest = typed_input(ctx, action, keys::CREATE_BOOKING_EPI)?;
        if request.check_out <= request.check_in {
            ctx.alert(INVALID_DATES_ALERT);
            return Ok(());
        }

        let response = ctx
            .call(
                &endpoints::CREATE_BOOKING,
                EndpointInput::new().body(serde_json::to_value(&request)?),
            )
            .await?;
        if !ctx.is_success(&response) {
            ctx.alert(UNAVAILABLE_DATES_ALERT);
            return Ok(());
        }

        ctx.change_input(keys::CREATE_BOOKING_EPR, response.to_value())
            .await;
        ctx.log_event(
            "booking_created",
            json!({
                "listingId": request.listing_id,
                "checkIn": request.check_in,
                "checkOut": request.check_out,
            }),
        )
        .await;
        ctx.navigate("/bookings");
        ctx.run_action(Action::new(ActionType::GetBookings))
    }
}

pub struct CancelBooking;

#[async_trait]
impl SagaHandler for CancelBooking {
    async fn handle(&self, ctx: &mut SagaContext, _action: &Action) -> Result<()> {
        let booking_id = ctx.require_text(keys::BOOKING_ID)?;
        let response = ctx
            .call(
                &endpoints::CANCEL_BOOKING,
                EndpointInput::new().path_param(keys::BOOKING_ID, booking_id),
            )
            .await?;
        if ctx.is_success(&response) {
            ctx.run_action(Action::new(ActionType::GetBookings))?;
        }
        Ok(())
    }
}

pub struct DownloadInvoice;

#[async_trait]
impl SagaHandler for DownloadInvoice {
    async fn handle(&self, ctx: &mut SagaContext, _action: &Action) -> Result<()> {
        let booking_id = ctx.require_text(keys::BOOKING_ID)?;
        let response = ctx
            .call(
                &endpoints::DOWNLOAD_INVOICE,
                EndpointInput::new().path_param(keys::BOOKING_ID, booking_id.clone()),
            )
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        match response.attachment() {
            Some(attachment) => ctx.save_download(attachment),
            None => warn!(%booking_id, "bookings: invoice response was not an attachment"),
        }
        Ok(())
    }
}
