#![warn(clippy::pedantic)]

//! Browser-side table synchronizer: subscribes to a server-pushed stream of
//! [`ServiceStatus`] records on a persistent [***WebSocket***](https://developer.mozilla.org/en-US/docs/Web/API/WebSocket)
//! and reconciles them into the hosting page's `<table>`, adding, updating and removing rows.
//!
//! The DOM table is the only state; the connection survives server restarts through an
//! unbounded fixed-delay reconnect loop.

pub mod socket;
pub mod status;
pub mod table;

pub use socket::SocketManager;
pub use status::ServiceStatus;
pub use table::{Column, ColumnLayout, ServiceTable};

use wasm_bindgen::JsValue;

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

/// Behavior switches between the script generations this crate unifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
	/// Render a restart-action column (and strip the restart marker from the URL on connect).
	pub restart_action: bool,
	/// Remove a row when its record arrives with `exited = true`. With this off, exited
	/// records are ignored entirely and the row's last snapshot stays on display (the
	/// original append-only mode, which predates the `exited` flag; a sparse tombstone
	/// must not blank the usage cells).
	pub prune_exited: bool,
	/// Fixed delay between a close and the next connection attempt.
	pub reconnect_delay_ms: u32,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			restart_action: true,
			prune_exited: true,
			reconnect_delay_ms: 1_000,
		}
	}
}

impl Options {
	#[must_use]
	pub fn layout(&self) -> ColumnLayout {
		if self.restart_action {
			ColumnLayout::WithRestart
		} else {
			ColumnLayout::Plain
		}
	}
}

/// Page entry point: wires the document's `<table>` to the host's `/ws` stream with
/// the default [`Options`] and keeps the connection alive for the page's lifetime.
///
/// # Errors
///
/// Iff the page's document or location is unavailable.
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn boot() -> Result<(), JsValue> {
	let options = Options::default();
	let document = web_sys::window()
		.and_then(|window| window.document())
		.ok_or_else(|| JsValue::from_str("service-table: no document"))?;

	let table = ServiceTable::new(document, options.layout(), options.prune_exited);
	let manager = SocketManager::new(table, &options)?;
	manager.start();

	// The running handlers keep the connection state alive; the handle itself is no longer needed.
	std::mem::forget(manager);
	Ok(())
}
