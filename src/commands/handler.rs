//! Command Handler Implementation
//!
//! This module contains the dispatcher that maps a decoded request to its
//! handler and turns the outcome into a reply.
//!
//! ## Command Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the command name and the `PX` keyword are case-insensitive. Keys and
//! values are used byte-for-byte as the client sent them.

use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A request the dispatcher refused. Reported to the client as an error
/// reply; the connection keeps serving.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The request array had no elements
    #[error("empty command")]
    EmptyCommand,

    /// No handler for this name
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Argument count outside what the command accepts
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// An option keyword that the command does not understand
    #[error("syntax error")]
    Syntax,

    /// The `PX` count is not a non-negative integer
    #[error("invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(format!("ERR {}", err))
    }
}

type CommandResult = Result<RespValue, CommandError>;

/// Dispatches requests to the command implementations.
///
/// Cheap to clone; every connection gets its own copy sharing one engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes one request and returns the reply to send.
    ///
    /// `args[0]` is the command name. Failures come back as
    /// [`RespValue::Error`] so the caller never has to tear the connection
    /// down for them.
    pub fn execute(&self, args: Vec<Bytes>) -> RespValue {
        self.dispatch(args).unwrap_or_else(RespValue::from)
    }

    fn dispatch(&self, args: Vec<Bytes>) -> CommandResult {
        let name = match args.first() {
            Some(name) => name.to_ascii_lowercase(),
            None => return Err(CommandError::EmptyCommand),
        };

        match name.as_slice() {
            b"ping" => self.cmd_ping(&args),
            b"echo" => self.cmd_echo(&args),
            b"get" => self.cmd_get(&args),
            b"set" => self.cmd_set(&args),
            _ => Err(CommandError::UnknownCommand(printable(&args[0]))),
        }
    }

    /// PING
    fn cmd_ping(&self, args: &[Bytes]) -> CommandResult {
        if args.len() != 1 {
            return Err(CommandError::WrongArity("ping"));
        }
        Ok(RespValue::pong())
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        if args.len() != 2 {
            return Err(CommandError::WrongArity("echo"));
        }
        Ok(RespValue::bulk_string(args[1].clone()))
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        if args.len() != 2 {
            return Err(CommandError::WrongArity("get"));
        }

        Ok(match self.storage.get(&args[1]) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let ttl = match args.len() {
            3 => None,
            5 => {
                if !args[3].eq_ignore_ascii_case(b"px") {
                    return Err(CommandError::Syntax);
                }
                let ms = parse_millis(&args[4]).ok_or(CommandError::InvalidExpireTime("set"))?;
                Some(Duration::from_millis(ms))
            }
            _ => return Err(CommandError::WrongArity("set")),
        };

        self.storage.put(args[1].clone(), args[2].clone(), ttl);
        Ok(RespValue::ok())
    }
}

/// Client bytes made safe to quote inside a one-line error reply.
///
/// Control characters (including CR and LF) become spaces.
fn printable(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Parses a non-negative decimal millisecond count.
fn parse_millis(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}
