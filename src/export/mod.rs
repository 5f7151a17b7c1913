pub mod csv;
pub mod report;

pub use report::{log_report, run_stamp, write_report};
