//! Data models for rules, events and their compiled forms

mod alert;
mod compiled;
mod event;
mod rule;

pub use alert::*;
pub use compiled::*;
pub use event::*;
pub use rule::*;
