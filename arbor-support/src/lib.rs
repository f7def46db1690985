//! # Arbor Support
//!
//! Shared utilities for the Arbor composition container.
//!
//! This crate provides:
//! - Text rendering for error messages (dependency chains, candidate lists)
//! - Short type names and "did you mean?" suggestions
//! - Vertical rendering of a component's behavior stack

pub mod rendering;
