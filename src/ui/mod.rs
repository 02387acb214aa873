//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! The UI is organized into three layers:
//!
//! - **[`app`]**: application state, keyboard event loop, playback
//! - **[`panes`]**: render functions for each visible pane (heap map,
//!   allocations, operation log, status bar)
//! - **[`theme`]**: centralized color palette used by all panes
//!
//! Construct an [`App`] with a [`StressRun`] and call [`App::run`] to start the
//! event loop.
//!
//! [`StressRun`]: crate::stress::StressRun
//! [`App::run`]: app::App::run

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
