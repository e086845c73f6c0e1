//! Port traits the domain depends on.

pub mod config_port;
pub mod data_port;
pub mod indicator_port;
pub mod report_port;
pub mod valuation_port;
