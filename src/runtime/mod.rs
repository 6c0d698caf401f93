pub mod context;
pub mod engine;
pub mod store;
pub mod transition;

pub use context::ExecutionContext;
pub use engine::{Engine, Outcome, RunReport};
pub use store::ConfigStore;
