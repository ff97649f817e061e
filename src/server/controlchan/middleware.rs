use super::{Command, ControlChanError, Reply};
use async_trait::async_trait;

// A middleware takes a parsed command and either answers it itself (the
// dispatch gates do this when they block a command) or passes it on to the
// next handler in the chain.
#[async_trait]
pub trait ControlChanMiddleware: Send + Sync {
    async fn handle(&mut self, command: Command) -> Result<Reply, ControlChanError>;
}
