//! Transport-facing abstractions (Telegram today).

pub mod deadline;
pub mod port;
pub mod types;
