//! mss_msg protocol layer
//!
//! Pure, synchronous pieces of the protocol: the 32-byte frame codec, the
//! payload document tree and the status/event code tables. Socket I/O lives
//! in [`crate::connection`].
//!
//! # Example Usage
//!
//! ```ignore
//! use mssmon::protocol::{Command, Document, Message};
//!
//! let doc = Document::object().with("mclient", Document::object().with("mdu", "m1"));
//! let frame = Message::with_document(Command::StatusStart, &doc).encode();
//! ```

pub mod codes;
pub mod document;
pub mod error;
pub mod message;

// Re-export public API
pub use codes::{EventType, SubjectStatus};
pub use document::Document;
pub use error::ProtocolError;
pub use message::{
	checksum, AckCode, Command, Header, Message, Reason, HEADER_LEN, MAX_PAYLOAD, VERSION,
};

// vim: ts=4
