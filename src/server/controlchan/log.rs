//! Logs the commands (with redacted passwords) and replies that travel
//! over the control channel of one session.

use super::middleware::ControlChanMiddleware;
use super::{Command, ControlChanError, Reply};
use async_trait::async_trait;

pub struct LoggingMiddleware<Next>
where
    Next: ControlChanMiddleware,
{
    pub logger: slog::Logger,
    pub sequence_nr: u64,
    pub next: Next,
}

#[async_trait]
impl<Next> ControlChanMiddleware for LoggingMiddleware<Next>
where
    Next: ControlChanMiddleware,
{
    async fn handle(&mut self, command: Command) -> Result<Reply, ControlChanError> {
        self.sequence_nr += 1;
        slog::debug!(self.logger, "Incoming command: {:?}", command; "seq" => self.sequence_nr);
        let result = self.next.handle(command).await;
        match &result {
            Ok(reply) => slog::debug!(self.logger, "Outgoing reply: {:?}", reply; "seq" => self.sequence_nr),
            Err(error) => slog::warn!(self.logger, "Command handler error: {}", error; "seq" => self.sequence_nr),
        }
        result
    }
}
