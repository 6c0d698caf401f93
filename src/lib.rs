//! Declarative, state-machine driven scraping workflows.
//!
//! A workflow document names a graph of states; each state dispatches to one
//! capability (page navigation, structured extraction, API calls, data
//! submission) and threads its result into the next state.

pub mod actions;
pub mod browser;
pub mod compiler;
pub mod dsl;
pub mod error;
pub mod extract;
pub mod runtime;

pub use error::{BrowserError, ConfigError, ExtractError, NavigationError, WorkflowError};
