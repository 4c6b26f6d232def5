//! cinder-protocol: the RESP wire codec.
//!
//! Implements the five tagged value kinds the server speaks on the wire
//! (simple string, error, integer, bulk string, array) plus the null
//! bulk and null array forms. The parser and serializer are mutual
//! inverses on non-null values.

pub mod error;
pub mod parse;
pub mod serialize;
pub mod types;

pub use error::ProtocolError;
pub use parse::{parse_frame, parse_frame_bytes};
pub use types::Frame;
