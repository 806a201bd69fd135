//! Shared utility functions for yamon-ci.

pub mod bytes;

pub use bytes::format_bytes;
