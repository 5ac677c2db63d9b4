//! # payaudit-state -- Audit Request Lifecycle
//!
//! The [`AuditRequest`] aggregate and the state machine that governs it.
//!
//! ```text
//! PENDING ──pay──▶ PAID ──upload──▶ PROCESSING ──deliver──▶ COMPLETE
//!                                    │      ▲
//!                        analysis err│      │re-queue
//!                                    ▼      │
//!                                    FAILED ─┘
//! ```
//!
//! ## Design
//!
//! Every mutation is a method on the aggregate that validates the current
//! state before touching any field, so a rejected transition leaves the
//! record unchanged. Methods take `now` explicitly; nothing in this crate
//! reads the clock, which keeps expiry and ordering rules deterministic
//! under test.
//!
//! A request that has a report but no successful delivery stays in
//! `PROCESSING` with `report_delivered = false`. That sub-state is
//! distinguishable through [`AuditRequest::is_undelivered`] and is what the
//! undelivered reconciliation scans for.

pub mod request;
pub mod status;

pub use request::{
    AuditRequest, GeneratedReport, LifecycleError, PaymentConfirmation, PaymentOutcome,
    UploadedDataset,
};
pub use status::{AuditStatus, UnknownStatus};
