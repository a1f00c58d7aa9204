//! Protocol error types
//!
//! Codec-level failures. A frame that produces any of these is never acted
//! on; the connection that read it is treated as corrupted.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error while reading or writing a frame
	Io(io::Error),
	/// Header does not start with the "MS" magic
	BadMagic([u8; 2]),
	/// Header CRC does not match the first 28 header bytes
	HeaderChecksum { expected: u32, actual: u32 },
	/// Payload CRC does not match the payload bytes
	PayloadChecksum { expected: u32, actual: u32 },
	/// Declared payload length exceeds the configured maximum
	PayloadTooLarge { size: u32, max: u32 },
	/// Payload document could not be parsed
	Xml(String),
	/// Generic error message
	Other(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::BadMagic(m) => {
				write!(f, "Bad frame magic: {:02x}{:02x}", m[0], m[1])
			}
			ProtocolError::HeaderChecksum { expected, actual } => {
				write!(f, "Header checksum mismatch: expected {:08x}, got {:08x}", expected, actual)
			}
			ProtocolError::PayloadChecksum { expected, actual } => {
				write!(f, "Payload checksum mismatch: expected {:08x}, got {:08x}", expected, actual)
			}
			ProtocolError::PayloadTooLarge { size, max } => {
				write!(f, "Payload length {} exceeds maximum {}", size, max)
			}
			ProtocolError::Xml(msg) => write!(f, "XML parse error: {}", msg),
			ProtocolError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {}

// From implementations for automatic conversion
impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<String> for ProtocolError {
	fn from(e: String) -> Self {
		ProtocolError::Other(e)
	}
}

impl From<&str> for ProtocolError {
	fn from(e: &str) -> Self {
		ProtocolError::Other(e.to_string())
	}
}

impl From<roxmltree::Error> for ProtocolError {
	fn from(e: roxmltree::Error) -> Self {
		ProtocolError::Xml(e.to_string())
	}
}

// vim: ts=4
