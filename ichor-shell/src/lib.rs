//! Command-line support for ichor.
//!
//! [`ProcessSandbox`] runs generated code in an external engine shell, one
//! process per call. [`report`] renders run results for the terminal and as
//! JSON.

pub mod process;
pub mod report;

pub use process::ProcessSandbox;
pub use report::RunReport;
