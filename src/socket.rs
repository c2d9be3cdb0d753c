use crate::{status, table::ServiceTable, Options};
use gloo_timers::callback::Timeout;
use std::{cell::RefCell, rc::Rc};
use tracing::{info, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{CloseEvent, MessageEvent, WebSocket};

/// Path of the stream endpoint on the hosting page's origin.
pub const SOCKET_PATH: &str = "/ws";

/// Query parameter the restart anchors carry; interpreted by the serving side.
pub const RESTART_PARAM: &str = "restart";

/// Derives the stream endpoint from the hosting page's origin: same host, path [`SOCKET_PATH`],
/// secure scheme iff the page itself was loaded over a secure transport.
#[must_use]
pub fn endpoint_url(page_protocol: &str, page_host: &str) -> String {
	let scheme = if page_protocol.starts_with("https") { "wss" } else { "ws" };
	format!("{}://{}{}", scheme, page_host, SOCKET_PATH)
}

struct Live {
	socket: WebSocket,
	_on_open: Closure<dyn FnMut()>,
	_on_message: Closure<dyn FnMut(MessageEvent)>,
	_on_close: Closure<dyn FnMut(CloseEvent)>,
}

struct State {
	url: String,
	reconnect_delay: u32,
	strip_restart_marker: bool,
	table: ServiceTable,
	socket: Option<Live>,
	reconnect: Option<Timeout>,
	reconnect_attempts: u32,
	last_message_at: Option<f64>,
	running: bool,
}

/// Owns one live socket connection to the stream endpoint and keeps it alive indefinitely:
/// any close, including a failed connection attempt, schedules exactly one new attempt after
/// a fixed delay. No backoff, no retry cap; a failed attempt is cheap and the delay bounds
/// the retry frequency.
///
/// The lifecycle is caller-controlled through [`start`](`SocketManager::start`) and
/// [`stop`](`SocketManager::stop`). Event handlers and the reconnect timer are owned handles,
/// dropped (and thereby cancelled) on `stop`; while running, they keep the shared state alive
/// even if this handle is dropped, so a page entry point may simply leak it.
pub struct SocketManager {
	state: Rc<RefCell<State>>,
}

impl SocketManager {
	/// Creates a manager for the hosting page's own origin.
	///
	/// # Errors
	///
	/// Iff the page's location cannot be read (detached worker context and the like).
	pub fn new(table: ServiceTable, options: &Options) -> Result<Self, JsValue> {
		let window = web_sys::window().ok_or_else(|| JsValue::from_str("service-table: no window"))?;
		let location = window.location();
		let url = endpoint_url(&location.protocol()?, &location.host()?);
		Ok(Self::with_url(table, url, options))
	}

	/// Creates a manager for an explicit endpoint URL.
	#[must_use]
	pub fn with_url(table: ServiceTable, url: String, options: &Options) -> Self {
		Self {
			state: Rc::new(RefCell::new(State {
				url,
				reconnect_delay: options.reconnect_delay_ms,
				strip_restart_marker: options.restart_action,
				table,
				socket: None,
				reconnect: None,
				reconnect_attempts: 0,
				last_message_at: None,
				running: false,
			})),
		}
	}

	/// Opens the connection. Idempotent while running.
	pub fn start(&self) {
		{
			let mut state = self.state.borrow_mut();
			if state.running {
				return;
			}
			state.running = true;
		}
		Self::connect(&self.state);
	}

	/// Tears the connection down: cancels any pending reconnect and drops the socket's
	/// event handlers before closing it, so no further attempt is scheduled.
	pub fn stop(&self) {
		let mut state = self.state.borrow_mut();
		state.running = false;
		state.reconnect = None;
		if let Some(live) = state.socket.take() {
			live.socket.set_onopen(None);
			live.socket.set_onmessage(None);
			live.socket.set_onclose(None);
			if let Err(error) = live.socket.close() {
				warn!("Could not close the socket: {:?}", error);
			}
		}
		info!("Stopped.");
	}

	#[must_use]
	pub fn is_running(&self) -> bool {
		self.state.borrow().running
	}

	/// Whether a reconnect attempt is currently scheduled. At most one can be pending,
	/// since it is an owned handle only replaced from the previous connection's close.
	#[must_use]
	pub fn has_pending_reconnect(&self) -> bool {
		self.state.borrow().reconnect.is_some()
	}

	/// How many reconnect attempts have been scheduled so far. Diagnostic only.
	#[must_use]
	pub fn reconnect_attempts(&self) -> u32 {
		self.state.borrow().reconnect_attempts
	}

	/// Timestamp (`Date.now()` milliseconds) of the last processed frame. Diagnostic only.
	#[must_use]
	pub fn last_message_at(&self) -> Option<f64> {
		self.state.borrow().last_message_at
	}

	fn connect(state_rc: &Rc<RefCell<State>>) {
		let url = {
			let state = state_rc.borrow();
			if !state.running {
				return;
			}
			state.url.clone()
		};

		let socket = match WebSocket::new(&url) {
			Ok(socket) => socket,
			Err(error) => {
				// E.g. a blocked port. Treated like any other failed attempt.
				warn!("Could not open a socket to {}: {:?}", url, error);
				Self::schedule_reconnect(state_rc);
				return;
			}
		};

		let on_open = {
			let state_rc = Rc::clone(state_rc);
			Closure::wrap(Box::new(move || Self::handle_open(&state_rc)) as Box<dyn FnMut()>)
		};
		let on_message = {
			let state_rc = Rc::clone(state_rc);
			Closure::wrap(Box::new(move |event: MessageEvent| Self::handle_message(&state_rc, &event)) as Box<dyn FnMut(MessageEvent)>)
		};
		let on_close = {
			let state_rc = Rc::clone(state_rc);
			Closure::wrap(Box::new(move |event: CloseEvent| Self::handle_close(&state_rc, &event)) as Box<dyn FnMut(CloseEvent)>)
		};
		socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
		socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
		socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

		trace!("Connecting to {}.", url);
		let mut state = state_rc.borrow_mut();
		state.reconnect = None;
		state.socket = Some(Live {
			socket,
			_on_open: on_open,
			_on_message: on_message,
			_on_close: on_close,
		});
	}

	fn handle_open(state_rc: &Rc<RefCell<State>>) {
		let state = state_rc.borrow();
		info!("Connected to {}.", state.url);
		if state.strip_restart_marker {
			strip_restart_marker();
		}
	}

	fn handle_message(state_rc: &Rc<RefCell<State>>, event: &MessageEvent) {
		let text = match event.data().as_string() {
			Some(text) => text,
			None => return trace!("Ignoring a non-text frame."),
		};
		// A bad frame must not unhook the handler; it only costs that one frame.
		let records = match status::decode_frame(&text) {
			Ok(records) => records,
			Err(error) => return warn!("Discarding a malformed frame: {:?}", error),
		};

		let mut state = state_rc.borrow_mut();
		state.last_message_at = Some(js_sys::Date::now());
		trace!("Processing {} record(s) at {:?}.", records.len(), state.last_message_at);
		state.table.apply_frame(&records);
	}

	fn handle_close(state_rc: &Rc<RefCell<State>>, event: &CloseEvent) {
		info!("Socket closed (code {}).", event.code());
		Self::schedule_reconnect(state_rc);
	}

	/// Schedules exactly one attempt after the fixed delay. A stale pending timer is
	/// replaced (cancelled), so attempts never stack.
	fn schedule_reconnect(state_rc: &Rc<RefCell<State>>) {
		let mut state = state_rc.borrow_mut();
		if !state.running {
			return;
		}
		state.reconnect_attempts += 1;
		let timer = Timeout::new(state.reconnect_delay, {
			let state_rc = Rc::clone(state_rc);
			move || Self::connect(&state_rc)
		});
		if state.reconnect.replace(timer).is_some() {
			trace!("Replaced a pending reconnect timer.");
		} else {
			trace!("Reconnecting in {} ms.", state.reconnect_delay);
		}
	}
}

/// Removes the [`RESTART_PARAM`] marker from the visible URL without reloading, so refreshing
/// the page does not re-trigger the restart the server just performed. Other query parameters
/// are preserved.
pub fn strip_restart_marker() {
	let window = match web_sys::window() {
		Some(window) => window,
		None => return,
	};
	let href = match window.location().href() {
		Ok(href) => href,
		Err(_) => return,
	};
	let url = match web_sys::Url::new(&href) {
		Ok(url) => url,
		Err(_) => return,
	};
	let params = url.search_params();
	if params.get(RESTART_PARAM).is_none() {
		return;
	}
	params.delete(RESTART_PARAM);

	match window.history() {
		Ok(history) => {
			if let Err(error) = history.replace_state_with_url(&JsValue::NULL, "", Some(&url.href())) {
				warn!("Could not strip the restart marker: {:?}", error);
			} else {
				trace!("Stripped the restart marker from the visible URL.");
			}
		}
		Err(error) => warn!("No history to rewrite: {:?}", error),
	}
}
