use crate::status::ServiceStatus;
use gloo_timers::callback::Timeout;
use hashbrown::HashMap;
use tracing::{trace, trace_span, warn};
use wasm_bindgen::{JsCast, UnwrapThrowExt};
use web_sys::{Document, HtmlAnchorElement, HtmlTableCellElement, HtmlTableElement, HtmlTableRowElement};

/// Element id of the transient result banner, auto-removed a few seconds after any frame is processed.
pub const RESULT_BANNER_ID: &str = "result";

const RESULT_BANNER_MS: u32 = 3_000;

/// A named table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
	Name,
	Restart,
	Memory,
	Cpu,
}

/// Which cells a row carries, in which order.
///
/// This is the single source of truth for cell positions: row creation, adoption of
/// server-rendered rows and in-place updates all resolve named columns through it,
/// so the layouts can never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLayout {
	/// Name, memory, CPU.
	Plain,
	/// Name, restart action, memory, CPU.
	WithRestart,
}

impl ColumnLayout {
	#[must_use]
	pub fn columns(self) -> &'static [Column] {
		match self {
			ColumnLayout::Plain => &[Column::Name, Column::Memory, Column::Cpu],
			ColumnLayout::WithRestart => &[Column::Name, Column::Restart, Column::Memory, Column::Cpu],
		}
	}

	#[must_use]
	pub fn index_of(self, column: Column) -> Option<u32> {
		self.columns().iter().position(|&candidate| candidate == column).map(|i| i as u32)
	}
}

/// Resolved cell handles for one live row.
///
/// Only the cells that change after creation are kept; the name and action cells are
/// written once and never touched again.
struct Row {
	tr: HtmlTableRowElement,
	memory: HtmlTableCellElement,
	cpu: HtmlTableCellElement,
}

/// Outcome of resolving a record's id against the document.
///
/// `Mismatched` means an element with the id exists but cannot back a row of the
/// configured layout; treating it as absent would append a duplicate id.
enum RowLookup {
	Adopted,
	Missing,
	Mismatched,
}

/// Reconciles [`ServiceStatus`] records into the document's `<table>`.
///
/// The table itself IS the state: rows are keyed by element id equal to the record's `id`,
/// so rows the server rendered into the initial page are picked up seamlessly. The internal
/// map is only a handle cache and is rebuilt lazily from the DOM.
pub struct ServiceTable {
	document: Document,
	layout: ColumnLayout,
	prune_exited: bool,
	rows: HashMap<String, Row>,
	banner_timer: Option<Timeout>,
}

impl ServiceTable {
	#[must_use]
	pub fn new(document: Document, layout: ColumnLayout, prune_exited: bool) -> Self {
		Self {
			document,
			layout,
			prune_exited,
			rows: HashMap::new(),
			banner_timer: None,
		}
	}

	#[must_use]
	pub fn layout(&self) -> ColumnLayout {
		self.layout
	}

	/// Applies one decoded frame, record by record in array order, then (re)arms the
	/// result banner removal timer.
	pub fn apply_frame(&mut self, records: &[ServiceStatus]) {
		let span = trace_span!("apply_frame", records = records.len());
		let _enter = span.enter();

		for record in records {
			self.reconcile(record);
		}
		self.schedule_banner_removal();
	}

	/// Maps one record to a create, update or remove on the displayed table.
	pub fn reconcile(&mut self, record: &ServiceStatus) {
		if record.exited {
			if self.prune_exited {
				self.remove(&record.id);
			}
			// Append-only mode: the row's last snapshot stays on display.
			return;
		}

		match self.cache_row(&record.id) {
			RowLookup::Adopted => {
				let row = &self.rows[&record.id];
				row.memory.set_text_content(Some(&record.memory_usage));
				row.cpu.set_text_content(Some(&record.cpu_usage));
			}
			RowLookup::Missing => self.create(record),
			// Something with this id exists but does not match the layout. Appending
			// anyway would display two elements sharing one id, so the record is dropped.
			RowLookup::Mismatched => {}
		}
	}

	/// Ensures the cache holds a live handle for `id`, adopting a matching DOM row
	/// (e.g. one the server rendered) if the cache misses.
	fn cache_row(&mut self, id: &str) -> RowLookup {
		if let Some(row) = self.rows.get(id) {
			if row.tr.is_connected() {
				return RowLookup::Adopted;
			}
			// Removed behind our back; fall through to the DOM.
			self.rows.remove(id);
		}

		let element = match self.document.get_element_by_id(id) {
			Some(element) => element,
			None => return RowLookup::Missing,
		};
		let tr = match element.dyn_into::<HtmlTableRowElement>() {
			Ok(tr) => tr,
			Err(element) => {
				warn!("Expected a <tr> for {:?} but found {:?}; leaving it alone.", id, element);
				return RowLookup::Mismatched;
			}
		};
		match self.adopt(tr) {
			Some(row) => {
				self.rows.insert(id.to_string(), row);
				RowLookup::Adopted
			}
			None => {
				warn!("Row for {:?} carries fewer cells than the configured layout; leaving it alone.", id);
				RowLookup::Mismatched
			}
		}
	}

	/// Resolves the mutable cell handles of an existing `<tr>` through the configured layout.
	fn adopt(&self, tr: HtmlTableRowElement) -> Option<Row> {
		let cells = tr.cells();
		let cell_at = |column| {
			self.layout
				.index_of(column)
				.and_then(|i| cells.item(i))
				.and_then(|cell| cell.dyn_into::<HtmlTableCellElement>().ok())
		};
		let memory = cell_at(Column::Memory)?;
		let cpu = cell_at(Column::Cpu)?;
		Some(Row { tr, memory, cpu })
	}

	/// Appends a fresh row at the end of the table and populates every cell.
	fn create(&mut self, record: &ServiceStatus) {
		let table = match self
			.document
			.query_selector("table")
			.ok()
			.flatten()
			.and_then(|element| element.dyn_into::<HtmlTableElement>().ok())
		{
			Some(table) => table,
			// The script may run before the page markup does.
			None => return trace!("No <table> in the document; dropping record {:?}.", record.id),
		};

		let tr: HtmlTableRowElement = table
			.insert_row_with_index(-1)
			.expect_throw("service-table: could not insert a table row")
			.unchecked_into();
		tr.set_id(&record.id);

		let mut memory = None;
		let mut cpu = None;
		for column in self.layout.columns() {
			let cell: HtmlTableCellElement = tr
				.insert_cell()
				.expect_throw("service-table: could not insert a table cell")
				.unchecked_into();
			match column {
				Column::Name => cell.set_text_content(Some(&record.name)),
				Column::Restart => self.fill_restart_cell(&cell, &record.id),
				Column::Memory => {
					cell.set_text_content(Some(&record.memory_usage));
					memory = Some(cell);
				}
				Column::Cpu => {
					cell.set_text_content(Some(&record.cpu_usage));
					cpu = Some(cell);
				}
			}
		}

		trace!("Appended row for {:?}.", record.id);
		self.rows.insert(
			record.id.clone(),
			Row {
				tr,
				memory: memory.expect_throw("service-table: layout without a memory column"),
				cpu: cpu.expect_throw("service-table: layout without a CPU column"),
			},
		);
	}

	/// The anchor's query string is interpreted by the serving side; see
	/// [`crate::socket::RESTART_PARAM`].
	fn fill_restart_cell(&self, cell: &HtmlTableCellElement, id: &str) {
		let anchor: HtmlAnchorElement = match self.document.create_element("a") {
			Ok(element) => element.unchecked_into(),
			Err(error) => return warn!("Could not create the restart anchor: {:?}", error),
		};
		anchor.set_href(&format!("?{}={}", crate::socket::RESTART_PARAM, id));
		anchor.set_text_content(Some("restart"));
		if let Err(error) = cell.append_child(&anchor) {
			warn!("Could not attach the restart anchor: {:?}", error);
		}
	}

	/// Removing an id that has no row is a no-op, so an exited tombstone can never
	/// materialise a row for a dead service.
	fn remove(&mut self, id: &str) {
		if let Some(row) = self.rows.remove(id) {
			row.tr.remove();
			trace!("Removed row for {:?}.", id);
		} else if let Some(element) = self.document.get_element_by_id(id) {
			element.remove();
			trace!("Removed uncached row for {:?}.", id);
		}
	}

	/// Arms (or re-arms, cancelling the stale timer) removal of the `#result` banner.
	fn schedule_banner_removal(&mut self) {
		let banner = match self.document.get_element_by_id(RESULT_BANNER_ID) {
			Some(banner) => banner,
			None => return,
		};
		let timer = Timeout::new(RESULT_BANNER_MS, move || {
			if banner.is_connected() {
				banner.remove();
			}
		});
		if self.banner_timer.replace(timer).is_some() {
			trace!("Replaced a pending result banner timer.");
		}
	}
}
