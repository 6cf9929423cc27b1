//! Display-facing status primitives.
//!
//! [`ConsoleBuffer`] backs the live console view (process output) and the
//! provisioning sub-status view; [`EtaCalculator`] turns progress samples
//! into a time-remaining estimate for long downloads.

mod buffer;
mod eta;

pub use buffer::{ConsoleBuffer, NotifyFn};
pub use eta::EtaCalculator;

/// Capacity of the process-output console log.
pub const CONSOLE_CAPACITY: usize = 1000;

/// Capacity of the provisioning sub-status log.
pub const SUB_STATUS_CAPACITY: usize = 50;
