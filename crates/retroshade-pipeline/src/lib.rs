//! Frame-budgeted execution of legacy shader compiler and driver modules.
//!
//! A [`Pipeline`] runs at most one emulated module at a time:
//!
//! - the [`Controller`] decides when the compiler and machine stages restart, based on
//!   [`DirtyFlags`] set by user input;
//! - the [`Scheduler`] steps the active context in fixed quanta within a per-frame wall-clock
//!   budget, collecting output into the [`OutputStore`];
//! - on halt, a [`ResolverChain`] picks the follow-on module, if any.
//!
//! Module loading and the clock are injected, so everything here can be driven by scripted
//! contexts in tests.
#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod state;

pub use config::{ConfigError, PipelineConfig, SchedulerConfig};
pub use controller::{select_capability, Controller, Stage, StageEvent};
pub use diagnostics::{HaltDiagnostics, StackWindow, StackWord};
pub use output::{hex_listing, Disassembler, OutputStore, StageOutput, TextOrHexListing};
pub use pipeline::{Pipeline, Tick};
pub use resolver::{
    ChainOutcome, ContinuationResolver, FnResolver, HandoffResolver, Resolution, ResolverChain,
};
pub use scheduler::{FrameOutcome, Scheduler};
pub use state::{DirtyFlags, SchedulerState};
