//! The command whitelist gate: when the server was configured with an
//! explicit set of allowed commands, everything else is refused with 502.

use super::middleware::ControlChanMiddleware;
use super::{Command, ControlChanError, Reply, ReplyCode};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub struct CommandWhitelistMiddleware<Next>
where
    Next: ControlChanMiddleware,
{
    pub allowed_commands: Option<Arc<HashSet<String>>>,
    pub next: Next,
}

#[async_trait]
impl<Next> ControlChanMiddleware for CommandWhitelistMiddleware<Next>
where
    Next: ControlChanMiddleware,
{
    async fn handle(&mut self, command: Command) -> Result<Reply, ControlChanError> {
        if let Some(allowed) = &self.allowed_commands {
            if !allowed.contains(command.verb()) {
                return Ok(Reply::new(ReplyCode::CommandNotImplemented, "Command not implemented."));
            }
        }
        self.next.handle(command).await
    }
}
