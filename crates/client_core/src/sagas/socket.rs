use anyhow::Result;
use async_trait::async_trait;
use shared::{
    actions::{Action, ActionType},
    protocol::SocketFrame,
};
use tracing::{debug, warn};

use crate::{
    actions::{keys, run_action},
    context::SagaContext,
    dispatcher::SagaHandler,
};

/// Stores each pushed frame and re-dispatches the action it names.
pub struct SocketMessage;

#[async_trait]
impl SagaHandler for SocketMessage {
    async fn handle(&self, ctx: &mut SagaContext, action: &Action) -> Result<()> {
        ctx.change_input(keys::LAST_SOCKET_MESSAGE, action.payload.clone())
            .await;

        let frame = SocketFrame::from_value(&action.payload);
        let Some(name) = frame.action else {
            return Ok(());
        };
        let follow_on = run_action(&name, frame.payload)?;
        if follow_on.kind == ActionType::SocketMessage {
            debug!("socket: ignoring self-referencing frame");
            return Ok(());
        }
        if follow_on.kind.touches_local_files() {
            warn!(action = %follow_on.kind, "socket: refusing file action from a pushed frame");
            return Ok(());
        }
        ctx.run_action(follow_on)
    }
}
