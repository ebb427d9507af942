//! Typed commands for a Riak-style protocol-buffers (PBC) node.
//!
//! Each supported request is an [`Operation`]; a builder validates its options
//! once and yields a [`Command`], which a [`Client`] sends through a
//! [`Transport`] with a bounded retry budget. The result is delivered exactly
//! once through the callback given to the builder.

pub mod backoff;
pub mod client;
pub mod codec;
pub mod command;
pub mod commands;
pub mod config;
pub mod pb;
pub mod render;
pub mod transport;
pub mod validate;
pub mod version;

pub use client::Client;
pub use command::{
    Callback, Command, CommandBuilder, CommandError, CommandKind, CommandState, Operation,
    completion_channel,
};
pub use transport::{TcpTransport, TcpTransportConfig, Transport, TransportError};
pub use validate::ValidationError;

pub mod prelude {
    pub use crate::{
        Client, CommandBuilder, CommandError, CommandState, Operation, completion_channel,
        commands::*,
    };
}
