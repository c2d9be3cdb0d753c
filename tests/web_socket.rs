#![cfg(target_arch = "wasm32")]

use gloo_timers::future::TimeoutFuture;
use service_table::{
	socket::{endpoint_url, strip_restart_marker},
	ColumnLayout, Options, ServiceTable, SocketManager,
};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::window;

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn init_log() {
	unsafe {
		if !LOG_INITIALIZED {
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}
}

fn manager(url: &str, reconnect_delay_ms: u32) -> SocketManager {
	let options = Options {
		restart_action: false,
		prune_exited: true,
		reconnect_delay_ms,
	};
	let document = window().unwrap().document().unwrap();
	let table = ServiceTable::new(document, ColumnLayout::Plain, options.prune_exited);
	SocketManager::with_url(table, url.to_string(), &options)
}

#[wasm_bindgen_test]
fn endpoint_follows_the_page_transport() {
	assert_eq!(endpoint_url("http:", "localhost:42069"), "ws://localhost:42069/ws");
	assert_eq!(endpoint_url("https:", "example.com"), "wss://example.com/ws");
	assert_eq!(endpoint_url("https:", "example.com:8443"), "wss://example.com:8443/ws");
	// Anything that isn't HTTPS gets the insecure scheme.
	assert_eq!(endpoint_url("file:", "localhost"), "ws://localhost/ws");
}

#[wasm_bindgen_test]
async fn closed_connections_keep_scheduling_single_reconnects() {
	init_log();

	// Nothing listens here, so every attempt fails over into the reconnect loop.
	let manager = manager("ws://127.0.0.1:39999/ws", 100);
	manager.start();
	assert!(manager.is_running());

	TimeoutFuture::new(600).await;
	// Each close schedules exactly one follow-up attempt: at a 100 ms delay,
	// 600 ms fits at most seven scheduling points. Stacked timers would blow
	// well past that.
	let attempts = manager.reconnect_attempts();
	assert!(attempts >= 2, "expected repeated reconnects, got {}", attempts);
	assert!(attempts <= 7, "reconnect attempts stacked up: {}", attempts);

	manager.stop();
	assert!(!manager.is_running());
	assert!(!manager.has_pending_reconnect());

	let attempts = manager.reconnect_attempts();
	TimeoutFuture::new(300).await;
	assert_eq!(manager.reconnect_attempts(), attempts);
}

#[wasm_bindgen_test]
fn start_is_idempotent_while_running() {
	let manager = manager("ws://127.0.0.1:39999/ws", 60_000);
	manager.start();
	manager.start();
	assert!(manager.is_running());
	manager.stop();
	assert!(!manager.is_running());
}

#[wasm_bindgen_test]
fn restart_marker_is_stripped_and_other_parameters_survive() {
	let history = window().unwrap().history().unwrap();
	let original = window().unwrap().location().href().unwrap();

	history
		.replace_state_with_url(&JsValue::NULL, "", Some("?restart=svc1&sort_key=name"))
		.unwrap();
	strip_restart_marker();
	assert_eq!(window().unwrap().location().search().unwrap(), "?sort_key=name");

	history
		.replace_state_with_url(&JsValue::NULL, "", Some("?sort_key=name"))
		.unwrap();
	strip_restart_marker();
	assert_eq!(window().unwrap().location().search().unwrap(), "?sort_key=name");

	history.replace_state_with_url(&JsValue::NULL, "", Some(&original)).unwrap();
}

#[wasm_bindgen_test]
fn restart_marker_alone_leaves_an_empty_query() {
	let history = window().unwrap().history().unwrap();
	let original = window().unwrap().location().href().unwrap();

	history.replace_state_with_url(&JsValue::NULL, "", Some("?restart=svc1")).unwrap();
	strip_restart_marker();
	assert_eq!(window().unwrap().location().search().unwrap(), "");

	history.replace_state_with_url(&JsValue::NULL, "", Some(&original)).unwrap();
}
