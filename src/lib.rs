//! Asterisk Gateway Interface (FastAGI) server for Rust
//!
//! Asterisk opens one TCP connection per call, sends a block of `agi_*`
//! metadata, then exchanges one command and one reply at a time until the
//! call ends. This crate runs that exchange on tokio.
//!
//! # Architecture
//!
//! The library uses a split reader/writer design:
//! - [`AgiChannel`] (Clone + Send) — send commands from any task
//! - [`AgiEventStream`] — observe traffic and lifecycle events from the
//!   background reader task
//!
//! Commands on one channel are serialized: each caller receives the reply
//! to its own command, even when several tasks share the handle.
//!
//! # Examples
//!
//! ## Server
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiError, AgiServer, AgiServerOptions, ServerEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let mut server = AgiServer::new(AgiServerOptions::default());
//!     let mut events = server.start().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         let ServerEvent::Channel(channel) = event else {
//!             continue;
//!         };
//!         tokio::spawn(async move {
//!             println!("Call from {}", channel.variables().caller_id());
//!             channel.answer().await?;
//!             channel.stream_file("demo-congrats", "#", None).await?;
//!             channel.hangup(None).await
//!         });
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Point the dialplan at it:
//! ```text
//! exten => 100,1,AGI(agi://127.0.0.1:3000/hello)
//! ```
//!
//! ## Single call
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiChannel, AgiError, AgiEvent};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AgiError> {
//!     let listener = TcpListener::bind("0.0.0.0:3000").await?;
//!     let channel = AgiChannel::accept(&listener).await?;
//!     let mut events = channel.subscribe();
//!
//!     let reply = channel.send_command("GET VARIABLE CALLERID(num)").await?;
//!     println!("{} -> {}", reply.result(), reply.arguments().nokey());
//!
//!     while let Some(Ok(event)) = events.recv().await {
//!         if event == AgiEvent::Hangup {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod arguments;
pub mod channel;
pub mod commands;
pub mod connection;
pub mod error;
pub mod server;
pub mod variables;

pub(crate) mod buffer;
pub mod command;
pub mod constants;
pub mod protocol;

pub use arguments::{Argument, ArgumentValue, ResponseArguments};
pub use channel::{
    ChannelState, DialStatus, ParseDialStatusError, ParsePlaybackStatusError, PlaybackStatus,
};
pub use command::{AgiResponse, CommandBuilder};
pub use commands::{
    ControlStreamOptions, ControlStreamResult, DigitResult, GetDataResult, ReceiveCharResult,
    RecordOptions, RecordResult,
};
pub use connection::{
    AgiChannel, AgiChannelOptions, AgiEvent, AgiEventStream, ConnectionStatus, DisconnectReason,
};
pub use constants::DEFAULT_AGI_PORT;
pub use error::{AgiError, AgiResult};
pub use protocol::{AgiParser, ContextState};
pub use server::{AgiServer, AgiServerEvents, AgiServerOptions, ServerEvent};
pub use variables::{AgiVariable, ChannelVariables, ParseAgiVariableError};
