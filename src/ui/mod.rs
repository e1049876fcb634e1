//! Terminal output for the client commands
//!
//! Spinners and styled output in interactive terminals, with a plain text
//! fallback in CI and when output is piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, section, step_ok};
pub use progress::TaskSpinner;
