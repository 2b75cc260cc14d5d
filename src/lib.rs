//! otpgate — OTP delivery over WhatsApp Web.
//!
//! Single Rust binary. Accepts delivery requests over HTTP, drives one
//! authenticated WhatsApp Web browser session through a WebDriver endpoint,
//! and accounts for every request with a terminal outcome.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod driver;
pub mod session;

pub mod delivery;
pub mod scheduler;

pub mod api;
pub mod service;
pub mod store;
