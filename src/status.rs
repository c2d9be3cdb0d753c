use serde::Deserialize;
use wasm_bindgen::JsValue;

/// One displayed entity's current resource snapshot, as it appears on the wire.
///
/// Frames arrive as JSON arrays of these. A record announcing a disappeared service may carry
/// nothing but `id` and `exited`, so every other field falls back to its empty default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceStatus {
	/// Unique key; doubles as the table row's element id.
	pub id: String,
	#[serde(default)]
	pub name: String,
	/// Pre-formatted by the server for direct display.
	#[serde(default)]
	pub memory_usage: String,
	/// Pre-formatted by the server for direct display.
	#[serde(default)]
	pub cpu_usage: String,
	/// Signals the row should be removed rather than updated.
	#[serde(default)]
	pub exited: bool,
}

/// Decodes one inbound text frame into records, preserving the order they were sent in.
///
/// # Errors
///
/// Iff `text` is not a JSON array of [`ServiceStatus`] objects.
pub fn decode_frame(text: &str) -> Result<Vec<ServiceStatus>, JsValue> {
	let parsed = js_sys::JSON::parse(text)?;
	serde_wasm_bindgen::from_value(parsed).map_err(JsValue::from)
}
