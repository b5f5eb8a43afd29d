//! Gatepass - polls a visit-tracking API and renders printable driver
//! sign-in forms.
//!
//! Gatepass is a scheduled synchronization-and-rendering job. It polls
//! a visit-export endpoint on a fixed cadence, detects which records
//! are new or changed by content fingerprint, and renders each
//! distinct record state exactly once as a printable sign-in form —
//! even across restarts, and despite duplicate or out-of-order
//! fetches.
//!
//! # Architecture
//!
//! - [`config`] - startup configuration from environment and local files
//! - [`extract`] - field table and total field extraction from raw records
//! - [`fingerprint`] - order-independent content digests
//! - [`ledger`] - durable export ledger with atomic persistence
//! - [`detect`] - completion gate and NEW/CHANGED/UNCHANGED classification
//! - [`render`] - printable form layout, dated paths, collision handling
//! - [`fetch`] - visit API client with rolling-day query windows
//! - [`cycle`] - sync cycle driver and the scheduler/janitor loop
//! - [`error`] - error types and exit codes

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cycle;
pub mod detect;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fingerprint;
pub mod ledger;
pub mod render;

pub use error::{Error, Result};
