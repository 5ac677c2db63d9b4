//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in [`crate::app`].

pub mod admin;
pub mod payments;
pub mod portal;
pub mod requests;
