//! Structured payload documents
//!
//! Payloads are tag-based markup (XML). They are decoded into a small tree
//! and read back with permissive path lookups: a missing or mistyped path
//! yields the zero value, never an error. Paths are `/`-separated element
//! names, e.g. `mclient/mdup/poses/pose`.

use std::fmt::Write;

use super::error::ProtocolError;

const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Tag name used for array elements that have no enclosing key
const ANONYMOUS_TAG: &str = "item";

/// Payload tree
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
	Null,
	String(String),
	Number(i64),
	Array(Vec<Document>),
	/// Ordered key/value pairs; keys are unique
	Object(Vec<(String, Document)>),
}

impl Default for Document {
	fn default() -> Self {
		Document::Null
	}
}

impl Document {
	/// Empty object
	pub fn object() -> Self {
		Document::Object(Vec::new())
	}

	/// Builder form of [`Document::insert`]
	pub fn with(mut self, key: &str, value: impl Into<Document>) -> Self {
		self.insert(key, value);
		self
	}

	/// Set `key` on an object, replacing any previous value.
	/// A non-object document is turned into an object first.
	pub fn insert(&mut self, key: &str, value: impl Into<Document>) {
		if !matches!(self, Document::Object(_)) {
			*self = Document::object();
		}
		if let Document::Object(entries) = self {
			let value = value.into();
			match entries.iter_mut().find(|(k, _)| k == key) {
				Some((_, slot)) => *slot = value,
				None => entries.push((key.to_string(), value)),
			}
		}
	}

	/// Direct child of an object
	pub fn field(&self, key: &str) -> Option<&Document> {
		match self {
			Document::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
			_ => None,
		}
	}

	/// Walk a `/`-separated path. Numeric segments index into arrays.
	pub fn get(&self, path: &str) -> Option<&Document> {
		let mut node = self;
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			node = match node {
				Document::Object(_) => node.field(segment)?,
				Document::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
				_ => return None,
			};
		}
		Some(node)
	}

	/// String at `path`, or "" if missing
	pub fn get_string(&self, path: &str) -> String {
		self.get(path).map(|d| d.as_string()).unwrap_or_default()
	}

	/// Integer at `path`, or 0 if missing or not numeric
	pub fn get_int(&self, path: &str) -> i64 {
		self.get(path).map(|d| d.as_int()).unwrap_or(0)
	}

	/// Array at `path`. A single non-null value is returned as a one-element
	/// list, since markup cannot tell one repeated element from a scalar.
	pub fn get_array(&self, path: &str) -> Vec<Document> {
		match self.get(path) {
			Some(Document::Array(items)) => items.clone(),
			Some(Document::Null) | None => Vec::new(),
			Some(other) => vec![other.clone()],
		}
	}

	/// Text form of a scalar; containers and null give ""
	pub fn as_string(&self) -> String {
		match self {
			Document::String(s) => s.clone(),
			Document::Number(n) => n.to_string(),
			_ => String::new(),
		}
	}

	/// Numeric form of a scalar; anything unparsable gives 0
	pub fn as_int(&self) -> i64 {
		match self {
			Document::Number(n) => *n,
			Document::String(s) => s.trim().parse().unwrap_or(0),
			_ => 0,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Document::Null)
	}

	/// Serialize as an XML document with prolog
	pub fn to_xml(&self) -> String {
		let mut out = String::from(XML_PROLOG);
		write_node(&mut out, self, ANONYMOUS_TAG);
		out
	}

	/// Parse XML text. The root element becomes the single key of the
	/// returned object.
	pub fn from_xml(text: &str) -> Result<Document, ProtocolError> {
		let xml = roxmltree::Document::parse(text)?;
		let root = xml.root_element();
		Ok(Document::object().with(root.tag_name().name(), element_to_document(root)))
	}

	pub fn from_xml_bytes(bytes: &[u8]) -> Result<Document, ProtocolError> {
		let text = std::str::from_utf8(bytes).map_err(|e| ProtocolError::Xml(e.to_string()))?;
		Self::from_xml(text)
	}
}

fn write_node(out: &mut String, doc: &Document, tag: &str) {
	match doc {
		Document::Null => {}
		Document::String(s) => escape_into(out, s),
		Document::Number(n) => {
			let _ = write!(out, "{}", n);
		}
		Document::Array(items) => {
			for item in items {
				write_element(out, tag, item);
			}
		}
		Document::Object(entries) => {
			for (key, value) in entries {
				match value {
					Document::Array(_) => write_node(out, value, key),
					_ => write_element(out, key, value),
				}
			}
		}
	}
}

fn write_element(out: &mut String, tag: &str, value: &Document) {
	let _ = write!(out, "<{}>", tag);
	write_node(out, value, ANONYMOUS_TAG);
	let _ = write!(out, "</{}>", tag);
}

fn escape_into(out: &mut String, text: &str) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			_ => out.push(c),
		}
	}
}

fn element_to_document(node: roxmltree::Node<'_, '_>) -> Document {
	let mut entries: Vec<(String, Document)> = Vec::new();
	let mut text = String::new();

	for child in node.children() {
		if child.is_element() {
			let key = child.tag_name().name();
			let value = element_to_document(child);
			match entries.iter_mut().find(|(k, _)| k == key) {
				Some((_, Document::Array(items))) => items.push(value),
				Some((_, slot)) => {
					let first = std::mem::take(slot);
					*slot = Document::Array(vec![first, value]);
				}
				None => entries.push((key.to_string(), value)),
			}
		} else if child.is_text() {
			text.push_str(child.text().unwrap_or_default());
		}
	}

	if entries.is_empty() {
		Document::String(text.trim().to_string())
	} else {
		Document::Object(entries)
	}
}

impl From<&str> for Document {
	fn from(s: &str) -> Self {
		Document::String(s.to_string())
	}
}

impl From<String> for Document {
	fn from(s: String) -> Self {
		Document::String(s)
	}
}

impl From<&String> for Document {
	fn from(s: &String) -> Self {
		Document::String(s.clone())
	}
}

impl From<i64> for Document {
	fn from(n: i64) -> Self {
		Document::Number(n)
	}
}

impl From<i32> for Document {
	fn from(n: i32) -> Self {
		Document::Number(n as i64)
	}
}

impl From<u32> for Document {
	fn from(n: u32) -> Self {
		Document::Number(n as i64)
	}
}

impl From<Vec<Document>> for Document {
	fn from(items: Vec<Document>) -> Self {
		Document::Array(items)
	}
}

impl From<&serde_json::Value> for Document {
	fn from(value: &serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Document::Null,
			serde_json::Value::Bool(b) => Document::String(b.to_string()),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => Document::Number(i),
				None => Document::String(n.to_string()),
			},
			serde_json::Value::String(s) => Document::String(s.clone()),
			serde_json::Value::Array(items) => {
				Document::Array(items.iter().map(Document::from).collect())
			}
			serde_json::Value::Object(map) => Document::Object(
				map.iter().map(|(k, v)| (k.clone(), Document::from(v))).collect(),
			),
		}
	}
}


// vim: ts=4
