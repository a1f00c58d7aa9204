//! mss_msg wire codec
//!
//! Every frame is a fixed 32-byte little-endian header followed by
//! `payload_len` bytes of payload:
//!
//! ```text
//! 0  2  magic "MS"
//! 2  1  version (1)
//! 3  1  command code
//! 4  1  ack code (0 none, 1 fail, 2 success)
//! 5  1  reason code
//! 6  2  word scratch
//! 8  8  qword scratch
//! 16 4  dword scratch
//! 20 4  payload CRC-32
//! 24 4  payload length
//! 28 4  header CRC-32 over bytes 0..28
//! ```
//!
//! Everything here is pure: encoding never fails and decoding reports
//! problems as [`ProtocolError`] values.

use super::document::Document;
use super::error::ProtocolError;

/// Frame magic, ASCII "MS"
pub const MAGIC: [u8; 2] = *b"MS";

/// Command-set version written into every frame
pub const VERSION: u8 = 1;

/// Size of the fixed header
pub const HEADER_LEN: usize = 32;

/// Number of header bytes covered by the header checksum
pub const HEADER_CRC_LEN: usize = 28;

/// Default upper bound for a payload announced by a peer
pub const MAX_PAYLOAD: u32 = 2_000_000;

/// Standard CRC-32 (IEEE) of a byte range
pub fn checksum(bytes: &[u8]) -> u32 {
	crc32fast::hash(bytes)
}

/// Command codes understood by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
	LoginRequest,
	LoginPassword,
	GetUnitList,
	StatusStart,
	StatusStop,
	LiveViewStart,
	LiveViewStop,
	GetAlerts,
	OpenFile,
	ReadFile,
	CloseFile,
	GetEvents,
	NotifyAlert,
	GetCameraInfo,
	Keepalive,
	/// Server push: skeleton pose frame for a live camera
	PoseData,
	/// Server push: subject status update
	StatusData,
	/// Server push: event record
	EventData,
	/// Any code this client does not know
	Other(u8),
}

impl Command {
	pub fn code(self) -> u8 {
		match self {
			Command::LoginRequest => 1,
			Command::LoginPassword => 2,
			Command::GetUnitList => 3,
			Command::StatusStart => 4,
			Command::StatusStop => 5,
			Command::LiveViewStart => 6,
			Command::LiveViewStop => 7,
			Command::GetAlerts => 8,
			Command::OpenFile => 9,
			Command::ReadFile => 10,
			Command::CloseFile => 11,
			Command::GetEvents => 12,
			Command::NotifyAlert => 13,
			Command::GetCameraInfo => 14,
			Command::Keepalive => 255,
			Command::PoseData => 202,
			Command::StatusData => 205,
			Command::EventData => 206,
			Command::Other(code) => code,
		}
	}

	pub fn from_code(code: u8) -> Self {
		match code {
			1 => Command::LoginRequest,
			2 => Command::LoginPassword,
			3 => Command::GetUnitList,
			4 => Command::StatusStart,
			5 => Command::StatusStop,
			6 => Command::LiveViewStart,
			7 => Command::LiveViewStop,
			8 => Command::GetAlerts,
			9 => Command::OpenFile,
			10 => Command::ReadFile,
			11 => Command::CloseFile,
			12 => Command::GetEvents,
			13 => Command::NotifyAlert,
			14 => Command::GetCameraInfo,
			255 => Command::Keepalive,
			202 => Command::PoseData,
			205 => Command::StatusData,
			206 => Command::EventData,
			other => Command::Other(other),
		}
	}
}

/// Reply classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
	/// The frame is a request
	None,
	Fail,
	Success,
	/// Non-zero but unknown; still a reply, never a success
	Other(u8),
}

impl AckCode {
	pub fn code(self) -> u8 {
		match self {
			AckCode::None => 0,
			AckCode::Fail => 1,
			AckCode::Success => 2,
			AckCode::Other(code) => code,
		}
	}

	pub fn from_code(code: u8) -> Self {
		match code {
			0 => AckCode::None,
			1 => AckCode::Fail,
			2 => AckCode::Success,
			other => AckCode::Other(other),
		}
	}
}

/// Failure reason carried by replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
	None,
	UnknownCommand,
	AuthFail,
	LoginWait,
	WrongFormat,
	FileAccess,
	ServerAccess,
	NoData,
	Timeout,
	DuplicateId,
	Checksum,
	Other(u8),
}

impl Reason {
	pub fn code(self) -> u8 {
		match self {
			Reason::None => 0,
			Reason::UnknownCommand => 1,
			Reason::AuthFail => 2,
			Reason::LoginWait => 3,
			Reason::WrongFormat => 4,
			Reason::FileAccess => 5,
			Reason::ServerAccess => 6,
			Reason::NoData => 7,
			Reason::Timeout => 8,
			Reason::DuplicateId => 9,
			Reason::Checksum => 10,
			Reason::Other(code) => code,
		}
	}

	pub fn from_code(code: u8) -> Self {
		match code {
			0 => Reason::None,
			1 => Reason::UnknownCommand,
			2 => Reason::AuthFail,
			3 => Reason::LoginWait,
			4 => Reason::WrongFormat,
			5 => Reason::FileAccess,
			6 => Reason::ServerAccess,
			7 => Reason::NoData,
			8 => Reason::Timeout,
			9 => Reason::DuplicateId,
			10 => Reason::Checksum,
			other => Reason::Other(other),
		}
	}
}

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub version: u8,
	pub command: Command,
	pub ack: AckCode,
	pub reason: Reason,
	pub word: u16,
	pub qword: u64,
	pub dword: u32,
	pub payload_crc: u32,
	pub payload_len: u32,
}

impl Header {
	/// Request header for `command` with every scratch field zeroed
	pub fn new(command: Command) -> Self {
		Header {
			version: VERSION,
			command,
			ack: AckCode::None,
			reason: Reason::None,
			word: 0,
			qword: 0,
			dword: 0,
			payload_crc: 0,
			payload_len: 0,
		}
	}

	/// Serialize to 32 bytes, computing the header checksum last
	pub fn encode(&self) -> [u8; HEADER_LEN] {
		let mut buf = [0u8; HEADER_LEN];
		buf[0..2].copy_from_slice(&MAGIC);
		buf[2] = self.version;
		buf[3] = self.command.code();
		buf[4] = self.ack.code();
		buf[5] = self.reason.code();
		buf[6..8].copy_from_slice(&self.word.to_le_bytes());
		buf[8..16].copy_from_slice(&self.qword.to_le_bytes());
		buf[16..20].copy_from_slice(&self.dword.to_le_bytes());
		buf[20..24].copy_from_slice(&self.payload_crc.to_le_bytes());
		buf[24..28].copy_from_slice(&self.payload_len.to_le_bytes());
		let crc = checksum(&buf[..HEADER_CRC_LEN]);
		buf[28..32].copy_from_slice(&crc.to_le_bytes());
		buf
	}

	/// Parse and validate 32 header bytes
	///
	/// Rejects frames whose magic or header checksum does not match. The
	/// payload bound is checked separately by [`Header::payload_size`].
	pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
		if buf[0..2] != MAGIC {
			return Err(ProtocolError::BadMagic([buf[0], buf[1]]));
		}

		let expected = read_u32(buf, 28);
		let actual = checksum(&buf[..HEADER_CRC_LEN]);
		if expected != actual {
			return Err(ProtocolError::HeaderChecksum { expected, actual });
		}

		Ok(Header {
			version: buf[2],
			command: Command::from_code(buf[3]),
			ack: AckCode::from_code(buf[4]),
			reason: Reason::from_code(buf[5]),
			word: u16::from_le_bytes([buf[6], buf[7]]),
			qword: u64::from_le_bytes([
				buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
			]),
			dword: read_u32(buf, 16),
			payload_crc: read_u32(buf, 20),
			payload_len: read_u32(buf, 24),
		})
	}

	/// Payload length as a buffer size, if it is within `max`
	pub fn payload_size(&self, max: u32) -> Result<usize, ProtocolError> {
		if self.payload_len > max {
			return Err(ProtocolError::PayloadTooLarge { size: self.payload_len, max });
		}
		Ok(self.payload_len as usize)
	}
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
	u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// A complete protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	header: Header,
	payload: Vec<u8>,
}

impl Message {
	/// Zero-payload request
	pub fn new(command: Command) -> Self {
		Message { header: Header::new(command), payload: Vec::new() }
	}

	/// Request carrying raw payload bytes
	pub fn with_payload(command: Command, payload: Vec<u8>) -> Self {
		Message { header: Header::new(command), payload }
	}

	/// Request carrying a structured document encoded as XML
	pub fn with_document(command: Command, doc: &Document) -> Self {
		Self::with_payload(command, doc.to_xml().into_bytes())
	}

	/// Assemble a received frame, verifying the payload against the header
	pub fn from_parts(header: Header, payload: Vec<u8>) -> Result<Self, ProtocolError> {
		if payload.len() != header.payload_len as usize {
			return Err(ProtocolError::Other(format!(
				"payload length {} does not match header length {}",
				payload.len(),
				header.payload_len
			)));
		}
		let actual = checksum(&payload);
		if actual != header.payload_crc {
			return Err(ProtocolError::PayloadChecksum { expected: header.payload_crc, actual });
		}
		Ok(Message { header, payload })
	}

	/// Decode a contiguous frame (header plus payload)
	pub fn decode(bytes: &[u8], max_payload: u32) -> Result<Self, ProtocolError> {
		if bytes.len() < HEADER_LEN {
			return Err(ProtocolError::Other(format!("short frame: {} bytes", bytes.len())));
		}
		let mut head = [0u8; HEADER_LEN];
		head.copy_from_slice(&bytes[..HEADER_LEN]);
		let header = Header::decode(&head)?;
		let size = header.payload_size(max_payload)?;
		let rest = &bytes[HEADER_LEN..];
		if rest.len() < size {
			return Err(ProtocolError::Other(format!(
				"truncated payload: {} of {} bytes",
				rest.len(),
				size
			)));
		}
		Self::from_parts(header, rest[..size].to_vec())
	}

	/// Header as it goes on the wire: payload length and CRC filled in
	pub fn sealed_header(&self) -> Header {
		let mut header = self.header;
		header.payload_len = self.payload.len() as u32;
		header.payload_crc = if self.payload.is_empty() { 0 } else { checksum(&self.payload) };
		header
	}

	/// Header followed by payload, ready to write
	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
		out.extend_from_slice(&self.sealed_header().encode());
		out.extend_from_slice(&self.payload);
		out
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn command(&self) -> Command {
		self.header.command
	}

	pub fn ack(&self) -> AckCode {
		self.header.ack
	}

	pub fn reason(&self) -> Reason {
		self.header.reason
	}

	/// True for frames with ack code none
	pub fn is_request(&self) -> bool {
		self.header.ack == AckCode::None
	}

	pub fn is_success(&self) -> bool {
		self.header.ack == AckCode::Success
	}

	pub fn word(&self) -> u16 {
		self.header.word
	}

	pub fn qword(&self) -> u64 {
		self.header.qword
	}

	pub fn dword(&self) -> u32 {
		self.header.dword
	}

	pub fn set_word(&mut self, v: u16) {
		self.header.word = v;
	}

	pub fn set_qword(&mut self, v: u64) {
		self.header.qword = v;
	}

	pub fn set_dword(&mut self, v: u32) {
		self.header.dword = v;
	}

	pub fn payload(&self) -> &[u8] {
		&self.payload
	}

	pub fn into_payload(self) -> Vec<u8> {
		self.payload
	}

	/// Payload parsed as a document; empty or unparsable payloads give an empty object
	pub fn document(&self) -> Document {
		if self.payload.is_empty() {
			return Document::object();
		}
		Document::from_xml_bytes(&self.payload).unwrap_or_else(|_| Document::object())
	}

	/// Turn a received request into its reply
	///
	/// The command code and scratch fields are kept so the peer can match
	/// the reply; the payload is dropped unless `keep_payload` is set.
	pub fn into_reply(mut self, ack: AckCode, reason: Reason, keep_payload: bool) -> Self {
		self.header.ack = ack;
		self.header.reason = reason;
		if !keep_payload {
			self.payload.clear();
		}
		self
	}

	/// Reply frame built from scratch, as a server would send it
	pub fn reply(command: Command, ack: AckCode, reason: Reason, payload: Vec<u8>) -> Self {
		let mut header = Header::new(command);
		header.ack = ack;
		header.reason = reason;
		Message { header, payload }
	}
}


// vim: ts=4
