//! Core types and utilities for goalgetter
//!
//! This crate provides the error type, configuration loading, logging
//! setup, and the memory event bus shared by the goalgetter components.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
