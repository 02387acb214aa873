//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`layout`]: Heap map, one coloured cell per slice of the address space
//! - [`allocations`]: Live allocations in address order
//! - [`log`]: Recent stress operations, failures highlighted
//! - [`status`]: Status bar with keybindings and run state
//!
//! Each pane module exports a `render_*` function that draws from borrowed
//! state and keeps at most a scroll offset of its own.

pub mod allocations;
pub mod layout;
pub mod log;
pub mod status;

pub use allocations::render_allocations_pane;
pub use layout::render_layout_pane;
pub use log::render_log_pane;
pub use status::{render_status_bar, StatusRenderData};
