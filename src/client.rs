use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    backoff::RetryPolicy,
    command::{Command, CommandState, Operation},
    transport::Transport,
};

/// Runs commands against one transport with a shared retry policy.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Drives the command to completion. The result goes to the command's
    /// callback; the returned state only says how it ended.
    pub async fn execute<O: Operation>(&self, command: Command<O>) -> CommandState {
        command.execute(self.transport.as_ref(), &self.retry).await
    }

    /// Spawns the command on the current runtime and returns immediately.
    pub fn submit<O: Operation>(&self, command: Command<O>) -> JoinHandle<CommandState> {
        let transport = Arc::clone(&self.transport);
        let retry = self.retry;
        tokio::spawn(async move { command.execute(transport.as_ref(), &retry).await })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        command::{CommandBuilder, completion_channel},
        commands::{FetchSchema, Schema},
        pb::{self, MessageCode},
        transport::{BoxFuture, TransportError, WireRequest, WireResponse},
    };

    struct EchoSchema;

    impl Transport for EchoSchema {
        fn send(
            &self,
            request: WireRequest,
        ) -> BoxFuture<'_, Result<WireResponse, TransportError>> {
            use prost::Message as _;

            let name = pb::RpbYokozunaSchemaGetReq::decode(request.payload.as_ref())
                .ok()
                .and_then(|req| req.name);
            let response = WireResponse::encode(
                MessageCode::YokozunaSchemaGetResp,
                &pb::RpbYokozunaSchemaGetResp {
                    schema: Some(pb::RpbYokozunaSchema {
                        name,
                        content: None,
                    }),
                },
            );
            Box::pin(async move { Ok(response) })
        }
    }

    #[tokio::test]
    async fn submit_delivers_through_callback() {
        let client = Client::new(Arc::new(EchoSchema)).with_retry_policy(RetryPolicy::immediate());
        let (callback, rx) = completion_channel::<Schema>();
        let cmd = FetchSchema::builder()
            .with_schema_name("my_schema")
            .with_callback(callback)
            .build()
            .unwrap();

        let state = client.submit(cmd).await.unwrap();
        assert_eq!(state, CommandState::Succeeded);
        assert_eq!(
            rx.await.unwrap().unwrap(),
            Schema {
                name: "my_schema".to_string(),
                content: None,
            }
        );
    }
}
