use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    actions::{Action, ActionType},
    domain::CreatedResource,
};
use tracing::debug;

use super::input_value;
use crate::{
    actions::keys,
    context::SagaContext,
    dispatcher::SagaHandler,
    endpoints::{self, Endpoint, EndpointInput},
    pagination,
    transport::{FilePart, RestResponse},
};

pub const CREATE_LISTING_FAILED_ALERT: &str =
    "Could not create the listing. Please review the form and try again.";

const DEFAULT_LISTINGS_PAGER: &str = "listings";
const DEFAULT_SEARCH_PAGER: &str = "default";

/// Fetches the next page for `pager`, toggling `Loading` around the calls.
async fn fetch_page(
    ctx: &mut SagaContext,
    pager: &str,
    source: &Endpoint,
    paged: &Endpoint,
    query: EndpointInput,
) -> Result<RestResponse> {
    ctx.change_input(keys::LOADING, true).await;
    let result = {
        let ctx = &*ctx;
        let query = &query;
        ctx.pagination()
            .run(
                pager,
                move |response| ctx.is_success(response),
                move || ctx.call(source, query.clone()),
                move |token| {
                    ctx.call(
                        paged,
                        query.clone().path_param(pagination::PAGE_TOKEN_FIELD, token),
                    )
                },
            )
            .await
    };
    ctx.change_input(keys::LOADING, false).await;
    result
}

fn listing_query(ctx: &SagaContext, action: &Action, key: &str) -> EndpointInput {
    let mut input = EndpointInput::new();
    if let Some(query) = ctx.value(key) {
        input = input.query_object(query);
    }
    input.query_object(&action.payload)
}

pub struct GetListings;

#[async_trait]
impl SagaHandler for GetListings {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let pager = ctx
            .text(keys::LISTINGS_PAGER)
            .unwrap_or_else(|| DEFAULT_LISTINGS_PAGER.to_string());
        let query = listing_query(ctx, action, keys::GET_LISTINGS_EPI);
        let response = fetch_page(
            ctx,
            &pager,
            &endpoints::LIST_LISTINGS,
            &endpoints::LIST_LISTINGS_PAGE,
            query,
        )
        .await?;
        if ctx.is_success(&response) {
            ctx.change_input(keys::GET_LISTINGS_EPR, response.to_value())
                .await;
        }
        Ok(())
    }
}

pub struct SearchListings;

#[async_trait]
impl SagaHandler for SearchListings {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let pager = format!(
            "search:{}",
            ctx.text(keys::SEARCH_PAGER)
                .unwrap_or_else(|| DEFAULT_SEARCH_PAGER.to_string())
        );
        let query = listing_query(ctx, action, keys::SEARCH_LISTINGS_EPI);
        let response = fetch_page(
            ctx,
            &pager,
            &endpoints::SEARCH_LISTINGS,
            &endpoints::SEARCH_LISTINGS_PAGE,
            query,
        )
        .await?;
        if ctx.is_success(&response) {
            ctx.change_input(keys::SEARCH_LISTINGS_EPR, response.to_value())
                .await;
        }
        Ok(())
    }
}

pub struct GetListing;

#[async_trait]
impl SagaHandler for GetListing {
    async fn handle(&self, ctx: &mut SagaContext, _action: &Action) -> Result<()> {
        let listing_id = ctx.require_text(keys::LISTING_ID)?;
        let response = ctx
            .call(
                &endpoints::GET_LISTING,
                EndpointInput::new().path_param(keys::LISTING_ID, listing_id.clone()),
            )
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.change_input(keys::GET_LISTING_EPR, response.to_value())
            .await;
        ctx.run_action(Action::new(ActionType::GetReviews).with_param(keys::LISTING_ID, listing_id))
    }
}

pub struct CreateListing;

#[async_trait]
impl SagaHandler for CreateListing {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let body = input_value(ctx, action, keys::CREATE_LISTING_EPI)?;
        let response = ctx
            .call(&endpoints::CREATE_LISTING, EndpointInput::new().body(body))
            .await?;
        if !ctx.is_success(&response) {
            ctx.alert(CREATE_LISTING_FAILED_ALERT);
            return Ok(());
        }

        ctx.change_input(keys::CREATE_LISTING_EPR, response.to_value())
            .await;
        let created: CreatedResource = serde_json::from_value(response.to_value())
            .context("CREATELISTING: response carried no listing id")?;
        ctx.remove_field(keys::CREATE_LISTING_EPI).await;
        ctx.log_event("listing_created", json!({ "id": created.id }))
            .await;
        ctx.navigate(&format!("/listings/{}", created.id));
        ctx.run_action(Action::new(ActionType::GetListings))
    }
}

pub struct UpdateListing;

#[async_trait]
impl SagaHandler for UpdateListing {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let listing_id = ctx.require_text(keys::LISTING_ID)?;
        let body = input_value(ctx, action, keys::UPDATE_LISTING_EPI)?;
        let response = ctx
            .call(
                &endpoints::UPDATE_LISTING,
                EndpointInput::new()
                    .path_param(keys::LISTING_ID, listing_id)
                    .body(body),
            )
            .await?;
        if ctx.is_success(&response) {
            ctx.change_input(keys::GET_LISTING_EPR, response.to_value())
                .await;
        }
        Ok(())
    }
}

pub struct DeleteListing;

#[async_trait]
impl SagaHandler for DeleteListing {
    async fn handle(&self, ctx: &mut SagaContext, _action: &Action) -> Result<()> {
        let listing_id = ctx.require_text(keys::LISTING_ID)?;
        let response = ctx
            .call(
                &endpoints::DELETE_LISTING,
                EndpointInput::new().path_param(keys::LISTING_ID, listing_id),
            )
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.remove_field(keys::GET_LISTING_EPR).await;
        ctx.navigate("/listings");
        ctx.run_action(Action::new(ActionType::GetListings))
    }
}

/// Payload: `{ "file": "<path>", ...extra form fields }`.
pub struct UploadListingImage;

#[async_trait]
impl SagaHandler for UploadListingImage {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let listing_id = ctx.require_text(keys::LISTING_ID)?;
        let mut fields = match &action.payload {
            Value::Object(fields) => fields.clone(),
            _ => anyhow::bail!("UPLOADLISTINGIMAGE: payload must be an object"),
        };
        let path = fields
            .remove("file")
            .and_then(|value| value.as_str().map(str::to_string))
            .context("UPLOADLISTINGIMAGE: payload is missing 'file'")?;
        let path = Path::new(&path);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("UPLOADLISTINGIMAGE: failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        debug!(%listing_id, %filename, size_bytes = bytes.len(), "listings: uploading image");

        let response = ctx
            .call(
                &endpoints::UPLOAD_LISTING_IMAGE,
                EndpointInput::new()
                    .path_param(keys::LISTING_ID, listing_id.clone())
                    .body(Value::Object(fields))
                    .file(FilePart {
                        field: "image".to_string(),
                        mime_type: Some(image_mime_type(path).to_string()),
                        filename,
                        bytes,
                    }),
            )
            .await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.change_input(keys::UPLOAD_LISTING_IMAGE_EPR, response.to_value())
            .await;
        ctx.run_action(Action::new(ActionType::GetListing).with_param(keys::LISTING_ID, listing_id))
    }
}

fn image_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
