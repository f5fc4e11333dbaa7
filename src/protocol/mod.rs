//! Wire Protocol
//!
//! A subset of the Redis Serialization Protocol (RESP): requests are arrays
//! of bulk strings, replies are a simple status, a bulk string, a null or an
//! error.
//!
//! ## Modules
//!
//! - `types`: The `RespValue` reply enum and its serialization
//! - `parser`: Incremental request decoder
//!
//! ## Example
//!
//! ```
//! use pulsekv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n";
//! let (args, _consumed) = parse_message(data).unwrap().unwrap();
//!
//! let reply = RespValue::bulk_string(args[1].clone());
//! assert_eq!(reply.serialize(), b"$5\r\nhello\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser, MAX_REQUEST_SIZE};
pub use types::{encode_command, RespValue};
