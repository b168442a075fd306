use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use shared::{
    actions::{Action, ActionType},
    domain::{LoginRequest, SessionResponse, SignupRequest},
};
use tracing::info;

use super::{input_value, typed_input};
use crate::{
    actions::keys,
    context::SagaContext,
    dispatcher::SagaHandler,
    endpoints::{self, EndpointInput},
};

pub const INVALID_LOGIN_ALERT: &str = "Invalid email or password";
pub const SIGNUP_FAILED_ALERT: &str = "Sign up failed. Please check your details and try again.";
pub const PROFILE_SAVED_ALERT: &str = "Profile saved";

pub struct Login;

#[async_trait]
impl SagaHandler for Login {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let request: LoginRequest = typed_input(ctx, action, keys::LOGIN_EPI)?;
        let response = ctx
            .call(
                &endpoints::LOGIN,
                EndpointInput::new().body(serde_json::to_value(&request)?),
            )
            .await?;
        if !ctx.is_success(&response) {
            ctx.alert(INVALID_LOGIN_ALERT);
            return Ok(());
        }

        let session: SessionResponse = serde_json::from_value(response.to_value())
            .context("LOGIN: malformed session response")?;
        ctx.change_input(keys::AUTH_TOKEN, session.token).await;
        ctx.change_input(keys::CURRENT_USER, session.user).await;
        ctx.remove_field(keys::LOGIN_EPI).await;
        ctx.log_event("login", json!({ "email": request.email })).await;
        info!(email = %request.email, "auth: signed in");
        ctx.navigate("/dashboard");
        ctx.run_action(Action::new(ActionType::GetCurrentUser))
    }
}

pub struct Signup;

#[async_trait]
impl SagaHandler for Signup {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let request: SignupRequest = typed_input(ctx, action, keys::SIGNUP_EPI)?;
        let response = ctx
            .call(
                &endpoints::SIGNUP,
                EndpointInput::new().body(serde_json::to_value(&request)?),
            )
            .await?;
        if !ctx.is_success(&response) {
            ctx.alert(SIGNUP_FAILED_ALERT);
            return Ok(());
        }

        ctx.change_input(keys::CURRENT_USER, response.to_value()).await;
        ctx.remove_field(keys::SIGNUP_EPI).await;
        ctx.navigate("/login");
        Ok(())
    }
}

pub struct Logout;

#[async_trait]
impl SagaHandler for Logout {
    async fn handle(&self, ctx: &mut SagaContext, _action: &Action) -> Result<()> {
        let response = ctx.call(&endpoints::LOGOUT, EndpointInput::new()).await?;
        if !ctx.is_success(&response) {
            return Ok(());
        }

        ctx.remove_field(keys::CURRENT_USER).await;
        ctx.remove_field(keys::AUTH_TOKEN).await;
        ctx.log_event("logout", json!({})).await;
        ctx.navigate("/");
        Ok(())
    }
}

pub struct UpdateProfile;

#[async_trait]
impl SagaHandler for UpdateProfile {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        let body = input_value(ctx, action, keys::UPDATE_PROFILE_EPI)?;
        let response = ctx
            .call(&endpoints::UPDATE_PROFILE, EndpointInput::new().body(body))
            .await?;
        if ctx.is_success(&response) {
            ctx.change_input(keys::CURRENT_USER, response.to_value()).await;
            ctx.alert(PROFILE_SAVED_ALERT);
        }
        Ok(())
    }
}
