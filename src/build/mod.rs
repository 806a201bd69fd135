//! Build tasks and their invocation records.
//!
//! A [`BuildTask`] turns one [`BuildInvocation`] into one artifact:
//!
//! ```text
//! pending status → toolchain image → container build → success status
//!     → latest upload (optional) → release asset (optional)
//! ```

pub mod invocation;
pub mod task;

pub use invocation::{BuildInvocation, Provenance, PublishIntent};
pub use task::{BuildOutcome, BuildTask};
