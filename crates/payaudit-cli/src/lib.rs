//! # payaudit-cli -- Operator Command-Line Interface
//!
//! Drives the payroll audit portal's `/v1/admin/*` API from a terminal.
//!
//! ## Subcommands
//!
//! - `missing-reports`: Paid requests without a report (`--apply` re-queues)
//! - `undelivered`: Undelivered reports (`--apply` resends)
//! - `show`: One request's operator view
//! - `resend`: Resend one report
//! - `correct-email`: Fix a customer address and resend
//! - `find`: Search requests by customer email
//!
//! ## Crate Policy
//!
//! - CLI construction (argument parsing) is separated from request handling.
//! - No lifecycle logic here; every decision is made by the service.
//! - Exit code 0 on success, 2 when a repair ran but a delivery failed,
//!   1 on any error.

pub mod client;
pub mod output;
pub mod reconcile;
pub mod requests;
