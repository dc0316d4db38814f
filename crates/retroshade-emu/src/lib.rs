//! Contracts between the shader pipeline and the emulated execution backend.
//!
//! The emulator that actually decodes and executes the foreign native modules lives outside this
//! workspace. Everything the pipeline needs from it is expressed here:
//!
//! - [`ModuleLoader`] turns a module path plus an [`EntryCapability`] into a running
//!   [`ExecutionContext`] (or nothing, if the module is unavailable).
//! - [`ExecutionContext`] is the stepping primitive plus read-only inspection used for halt
//!   diagnostics, and the channel through which the module's byte output is collected.
//! - [`MonotonicClock`] is the only notion of time the scheduler depends on.

#![forbid(unsafe_code)]

mod clock;
mod context;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clock::{FakeClock, MonotonicClock, StdClock};
pub use context::{
    EntryCapability, ExecutionContext, LoadRequest, ModuleLoader, OutputWrite, StageInput,
    WriteMode, PRIMARY_STAGE,
};
