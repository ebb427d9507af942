//! The command lifecycle shared by every operation kind.
//!
//! A [`Command`] pairs one validated [`Operation`] with a retry budget and a
//! single-use completion callback. Operations only describe how to encode a
//! request and how to interpret the response; sending, retrying and completing
//! are handled here once for all kinds.

use std::str::FromStr;

use prost::Message as _;
use tokio::sync::oneshot;
use tracing::warn;

use crate::{
    commands::{
        FetchCounter, FetchHll, FetchMap, FetchSchema, FetchSet, TsDelete, UpdateCounter,
        UpdateGSet, UpdateHll, UpdateMap, UpdateSet,
    },
    pb::{self, MessageCode},
    transport::{TransportError, WireRequest, WireResponse},
    validate::OptionSpec,
};

pub mod builder;
mod execute;

#[cfg(test)]
mod tests;

pub use builder::{BuilderCore, CommandBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    TsDelete,
    FetchSchema,
    FetchCounter,
    UpdateCounter,
    FetchSet,
    UpdateSet,
    UpdateGSet,
    FetchMap,
    UpdateMap,
    FetchHll,
    UpdateHll,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        Self::TsDelete,
        Self::FetchSchema,
        Self::FetchCounter,
        Self::UpdateCounter,
        Self::FetchSet,
        Self::UpdateSet,
        Self::UpdateGSet,
        Self::FetchMap,
        Self::UpdateMap,
        Self::FetchHll,
        Self::UpdateHll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TsDelete => "ts_delete",
            Self::FetchSchema => "fetch_schema",
            Self::FetchCounter => "fetch_counter",
            Self::UpdateCounter => "update_counter",
            Self::FetchSet => "fetch_set",
            Self::UpdateSet => "update_set",
            Self::UpdateGSet => "update_gset",
            Self::FetchMap => "fetch_map",
            Self::UpdateMap => "update_map",
            Self::FetchHll => "fetch_hll",
            Self::UpdateHll => "update_hll",
        }
    }

    pub fn request_code(self) -> MessageCode {
        match self {
            Self::TsDelete => MessageCode::TsDelReq,
            Self::FetchSchema => MessageCode::YokozunaSchemaGetReq,
            Self::FetchCounter | Self::FetchSet | Self::FetchMap | Self::FetchHll => {
                MessageCode::DtFetchReq
            }
            Self::UpdateCounter
            | Self::UpdateSet
            | Self::UpdateGSet
            | Self::UpdateMap
            | Self::UpdateHll => MessageCode::DtUpdateReq,
        }
    }

    pub fn response_code(self) -> MessageCode {
        match self.request_code() {
            MessageCode::TsDelReq => MessageCode::TsDelResp,
            MessageCode::YokozunaSchemaGetReq => MessageCode::YokozunaSchemaGetResp,
            MessageCode::DtFetchReq => MessageCode::DtFetchResp,
            _ => MessageCode::DtUpdateResp,
        }
    }

    /// Resends allowed after a retryable transport failure. Updates that can
    /// carry counter increments are not idempotent and are never resent.
    pub fn default_retries(self) -> u32 {
        match self {
            Self::UpdateCounter | Self::UpdateMap => 0,
            _ => 1,
        }
    }

    pub fn options(self) -> &'static [OptionSpec] {
        match self {
            Self::TsDelete => TsDelete::OPTIONS,
            Self::FetchSchema => FetchSchema::OPTIONS,
            Self::FetchCounter => FetchCounter::OPTIONS,
            Self::UpdateCounter => UpdateCounter::OPTIONS,
            Self::FetchSet => FetchSet::OPTIONS,
            Self::UpdateSet => UpdateSet::OPTIONS,
            Self::UpdateGSet => UpdateGSet::OPTIONS,
            Self::FetchMap => FetchMap::OPTIONS,
            Self::UpdateMap => UpdateMap::OPTIONS,
            Self::FetchHll => FetchHll::OPTIONS,
            Self::UpdateHll => UpdateHll::OPTIONS,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown command kind: {s}"))
    }
}

/// Lifecycle of a live command. The builder is the created stage; no
/// `Command` value exists until validation has passed, so every command
/// starts at `Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Validated,
    Sent,
    RetryableFailed,
    Succeeded,
    FatalFailed,
}

impl CommandState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::FatalFailed)
    }

    fn is_in_flight(self) -> bool {
        matches!(self, Self::Sent | Self::RetryableFailed)
    }
}

#[derive(Debug)]
pub enum CommandError {
    Server {
        code: u32,
        message: String,
    },
    Transport {
        attempts: u32,
        source: TransportError,
    },
    UnexpectedResponse {
        expected: MessageCode,
        actual: u8,
    },
    Decode {
        reason: String,
    },
    Abandoned,
}

impl CommandError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<pb::RpbErrorResp> for CommandError {
    fn from(value: pb::RpbErrorResp) -> Self {
        Self::Server {
            code: value.errcode(),
            message: String::from_utf8_lossy(value.errmsg()).into_owned(),
        }
    }
}

impl From<prost::DecodeError> for CommandError {
    fn from(value: prost::DecodeError) -> Self {
        Self::decode(value.to_string())
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server { code, message } => write!(f, "server error ({code}): {message}"),
            Self::Transport { attempts, source } => {
                write!(f, "transport error after {attempts} attempt(s): {source}")
            }
            Self::UnexpectedResponse { expected, actual } => {
                write!(f, "unexpected response code {actual}, expected {expected}")
            }
            Self::Decode { reason } => write!(f, "malformed response: {reason}"),
            Self::Abandoned => write!(f, "command dropped before completion"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Callback<T> = Box<dyn FnOnce(Result<T, CommandError>) + Send + 'static>;

/// Adapts the completion callback to a oneshot channel.
///
/// The receiver yields `Err(RecvError)` only if the command is dropped before
/// it was ever sent.
pub fn completion_channel<T: Send + 'static>()
-> (Callback<T>, oneshot::Receiver<Result<T, CommandError>>) {
    let (tx, rx) = oneshot::channel();
    let callback: Callback<T> = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (callback, rx)
}

/// Per-kind encode/decode rules.
pub trait Operation: Send + Sync + 'static {
    type Request: prost::Message;
    type Response: prost::Message + Default;
    type Output: Send + 'static;

    const KIND: CommandKind;
    const OPTIONS: &'static [OptionSpec];

    /// Must depend on the validated options only.
    fn construct_request(&self) -> Self::Request;

    fn decode_success(&self, response: Self::Response) -> Result<Self::Output, CommandError>;

    fn decode_error(&self, error: pb::RpbErrorResp) -> CommandError {
        CommandError::from(error)
    }

    fn retry_budget(&self) -> u32 {
        Self::KIND.default_retries()
    }

    fn encode(&self) -> WireRequest {
        WireRequest::encode(Self::KIND, &self.construct_request())
    }

    fn interpret(&self, response: &WireResponse) -> Result<Self::Output, CommandError> {
        if response.code == MessageCode::ErrorResp.as_u8() {
            let error = pb::RpbErrorResp::decode(response.payload.as_ref())?;
            return Err(self.decode_error(error));
        }

        let expected = Self::KIND.response_code();
        if response.code != expected.as_u8() {
            return Err(CommandError::UnexpectedResponse {
                expected,
                actual: response.code,
            });
        }

        let decoded = Self::Response::decode(response.payload.as_ref())?;
        self.decode_success(decoded)
    }
}

pub struct Command<O: Operation> {
    op: O,
    remaining_retries: u32,
    callback: Option<Callback<O::Output>>,
    state: CommandState,
}

impl<O: Operation> Command<O> {
    pub(crate) fn new(op: O, callback: Callback<O::Output>, max_retries: Option<u32>) -> Self {
        let remaining_retries = max_retries.unwrap_or_else(|| op.retry_budget());
        Self {
            op,
            remaining_retries,
            callback: Some(callback),
            state: CommandState::Validated,
        }
    }

    pub fn kind(&self) -> CommandKind {
        O::KIND
    }

    pub fn operation(&self) -> &O {
        &self.op
    }

    pub fn remaining_retries(&self) -> u32 {
        self.remaining_retries
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn encode(&self) -> WireRequest {
        self.op.encode()
    }

    fn complete(&mut self, result: Result<O::Output, CommandError>) -> CommandState {
        let Some(callback) = self.callback.take() else {
            warn!(kind = %O::KIND, state = ?self.state, "completion already delivered; dropping late result");
            return self.state;
        };
        self.state = if result.is_ok() {
            CommandState::Succeeded
        } else {
            CommandState::FatalFailed
        };
        callback(result);
        self.state
    }
}

impl<O: Operation> Drop for Command<O> {
    fn drop(&mut self) {
        if self.state.is_in_flight() && self.callback.is_some() {
            warn!(kind = %O::KIND, "command dropped while in flight");
            self.complete(Err(CommandError::Abandoned));
        }
    }
}

impl<O: Operation + std::fmt::Debug> std::fmt::Debug for Command<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("op", &self.op)
            .field("remaining_retries", &self.remaining_retries)
            .field("state", &self.state)
            .field("completed", &self.callback.is_none())
            .finish()
    }
}
