//! Command handlers for the CLI application.
//!
//! - `unit`: unit field decode/encode
//! - `status`: status code lookup
//! - `demo`: loopback queue and transaction walkthroughs

pub mod demo;
pub mod status;
pub mod unit;
