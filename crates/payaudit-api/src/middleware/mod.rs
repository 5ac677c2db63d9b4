//! # HTTP Middleware
//!
//! Request metrics and lifecycle counters. Admin authentication lives in
//! [`crate::auth`].

pub mod metrics;
