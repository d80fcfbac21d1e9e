//! # Utility Modules
//!
//! Supporting utilities shared across the protocol implementation.
//!
//! ## Components
//! - **Logging**: structured logging configuration

pub mod logging;
