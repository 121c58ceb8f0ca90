//! # Built-in subscribers
//!
//! Small, self-contained implementations useful for demos.
//!
//! - [`LogWriter`]: renders events through `tracing` (demo/debug).

mod log;

pub use log::LogWriter;
