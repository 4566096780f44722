//! Error catalog and definitions for Remedy
//!
//! Typed errors live next to the code that raises them (`StoreError`,
//! `OracleError`, `ActuationError`, ...). Each of them maps onto a stable
//! [`ErrorCode`] from the catalog so log records carry a searchable code.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                               |
//! |------------|-------------|-------------------------------------------|
//! | E001-E099  | Config      | Configuration, credentials and startup    |
//! | E100-E199  | Oracle      | Telemetry query evaluation                |
//! | E200-E299  | Actuation   | Power-cycle requests                      |
//! | E300-E399  | Persistence | Durable record store                      |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
