//! # Tazriq Support
//!
//! Shared utilities for the Tazriq DI engine.
//!
//! This crate provides:
//! - Text rendering for error messages and event log lines
//! - Type-name helpers shared between tazriq crates

pub mod rendering;
