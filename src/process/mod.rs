//! Supervision of the external capture/encode process.

mod diagnostics;
mod supervisor;

pub use diagnostics::{DiagnosticBuffer, DIAGNOSTIC_CAPACITY};
pub use supervisor::{CaptureCommand, CaptureProcess, StopHandle};
