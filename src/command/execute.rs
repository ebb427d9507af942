use tracing::{debug, warn};

use crate::{
    backoff::RetryPolicy,
    command::{Command, CommandError, CommandState, Operation},
    transport::Transport,
};

impl<O: Operation> Command<O> {
    /// Runs the command to a terminal state and delivers the result to its
    /// callback.
    ///
    /// Attempts are strictly sequential. A retryable transport error consumes
    /// one unit of the retry budget and is followed by a backoff delay; a server
    /// error or an undecodable response ends the command immediately.
    pub async fn execute(mut self, transport: &dyn Transport, policy: &RetryPolicy) -> CommandState {
        let request = self.op.encode();
        let mut backoff = policy.start();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            self.state = CommandState::Sent;
            debug!(
                kind = %O::KIND,
                attempt = attempts,
                remaining_retries = self.remaining_retries,
                "sending command"
            );

            let error = match transport.send(request.clone()).await {
                Ok(response) => {
                    let result = self.op.interpret(&response);
                    if let Err(err) = &result {
                        debug!(kind = %O::KIND, error = %err, "command rejected");
                    }
                    return self.complete(result);
                }
                Err(error) => error,
            };

            self.state = CommandState::RetryableFailed;
            if !error.is_retryable() || self.remaining_retries == 0 {
                warn!(
                    kind = %O::KIND,
                    attempts,
                    retryable = error.is_retryable(),
                    error = %error,
                    "command failed"
                );
                return self.complete(Err(CommandError::Transport {
                    attempts,
                    source: error,
                }));
            }

            self.remaining_retries -= 1;
            let delay = backoff.next_delay();
            debug!(
                kind = %O::KIND,
                attempt = attempts,
                error = %error,
                ?delay,
                "transport error; retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
