//! Subject status and event type tables
//!
//! Numeric values are fixed by the server. Index 0 is the "unknown"
//! placeholder in both tables.

/// Payload value the server uses for "unit disconnected" alerts
pub const EVENT_UNIT_DISCONNECTED: i64 = 10000;

const STATUS_NAMES: [&str; 15] = [
	"Unknown",
	"Standing",
	"Lying on floor",
	"Lying on bed",
	"Sitting",
	"Walking",
	"Fallen",
	"On bed",
	"Upper body up from bed",
	"Feet off bed",
	"Sitting on toilet",
	"Sitting on sofa",
	"In shower",
	"Unit empty",
	"Standing on chair",
];

const EVENT_NAMES: [&str; 31] = [
	"Unknown event",
	"On floor",
	"On floor, no movement",
	"Off floor",
	"Entering",
	"Leaving",
	"On bed",
	"Off bed",
	"Standing",
	"Sitting",
	"Walking",
	"Entering at configured time",
	"Leaving at configured time",
	"Active at night",
	"Frequent bath use",
	"On bed, not moving too long",
	"On bed too long",
	"Upper body up from bed",
	"Stayed in washroom too long",
	"Feet off bed",
	"Sitting on toilet",
	"Sitting on sofa",
	"Entered shower",
	"Entered unit",
	"Left unit",
	"Unit empty",
	"Standing on chair",
	"Wandering at night",
	"Stayed in shower too long",
	"Sat on toilet too long",
	"Sitting on sofa too long",
];

/// Posture reported in status pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectStatus(pub u8);

impl SubjectStatus {
	/// Known status for `code`, or `None` outside the table
	pub fn from_code(code: i64) -> Option<Self> {
		if code >= 0 && (code as usize) < STATUS_NAMES.len() {
			Some(SubjectStatus(code as u8))
		} else {
			None
		}
	}

	pub fn name(self) -> &'static str {
		STATUS_NAMES[self.0 as usize]
	}
}

/// Event kind carried by alerts and event history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType(pub u8);

impl EventType {
	/// Known event for `code`; the disconnect marker maps to 0
	pub fn from_code(code: i64) -> Option<Self> {
		let code = if code == EVENT_UNIT_DISCONNECTED { 0 } else { code };
		if code >= 0 && (code as usize) < EVENT_NAMES.len() {
			Some(EventType(code as u8))
		} else {
			None
		}
	}

	pub fn code(self) -> u32 {
		self.0 as u32
	}

	pub fn name(self) -> &'static str {
		EVENT_NAMES[self.0 as usize]
	}
}


// vim: ts=4
