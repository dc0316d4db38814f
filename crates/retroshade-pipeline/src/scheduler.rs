//! Frame-sliced execution of the active context.
//!
//! The host calls [`Scheduler::run_frame`] once per frame. Each call steps the active context in
//! fixed instruction quanta until it halts or the frame budget is spent:
//!
//! ```text
//! Idle ──start──▶ Running ──budget spent──▶ Suspended ──next frame──▶ Running
//!                    │
//!                    └──halt──▶ resolve ──▶ Running (next context) | Idle (chain exhausted)
//! ```
//!
//! The clock is only read once per quantum, so a frame may overrun the budget by at most one
//! quantum's worth of work.

use std::time::Duration;

use retroshade_emu::{ExecutionContext, ModuleLoader, MonotonicClock};

use crate::config::SchedulerConfig;
use crate::diagnostics::HaltDiagnostics;
use crate::resolver::{ChainOutcome, ResolverChain};
use crate::state::SchedulerState;

/// What one [`Scheduler::run_frame`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No context was active.
    Idle,
    /// The frame budget ran out; the same context resumes next frame.
    Suspended { quanta: u64 },
    /// The context halted and `resolver` produced the next one.
    Continued { resolver: String, quanta: u64 },
    /// The context halted and the pipeline ended after `elapsed` since it started.
    Finished { elapsed: Duration, quanta: u64 },
}

pub struct Scheduler {
    config: SchedulerConfig,
    clock: Box<dyn MonotonicClock>,
    resolvers: ResolverChain,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        clock: Box<dyn MonotonicClock>,
        resolvers: ResolverChain,
    ) -> Self {
        Self {
            config,
            clock,
            resolvers,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn MonotonicClock {
        self.clock.as_ref()
    }

    pub fn resolvers(&self) -> &ResolverChain {
        &self.resolvers
    }

    /// Step the active context for at most one frame budget.
    pub fn run_frame(
        &mut self,
        state: &mut SchedulerState,
        loader: &mut dyn ModuleLoader,
    ) -> FrameOutcome {
        let Some(mut ctx) = state.take_active() else {
            return FrameOutcome::Idle;
        };

        let quantum = self.config.step_quantum.max(1);
        let budget = self.config.frame_budget();
        let frame_start = self.clock.now();
        let mut quanta = 0u64;

        loop {
            let running = ctx.step(quantum);
            quanta += 1;
            state.outputs_mut().apply(ctx.take_output());

            if !running {
                break;
            }
            if self.clock.elapsed_since(frame_start) > budget {
                state.resume(ctx);
                return FrameOutcome::Suspended { quanta };
            }
        }

        self.halted(state, ctx, loader, quanta)
    }

    fn halted(
        &mut self,
        state: &mut SchedulerState,
        ctx: Box<dyn ExecutionContext>,
        loader: &mut dyn ModuleLoader,
        quanta: u64,
    ) -> FrameOutcome {
        let diagnostics = HaltDiagnostics::capture(ctx.as_ref(), self.config.stack_window());
        tracing::debug!(
            module = %diagnostics.module.display(),
            pc = %format!("{:08x}", diagnostics.program),
            instruction = %diagnostics.instruction,
            "context halted"
        );
        tracing::debug!("processor status:\n{}", diagnostics.status);
        tracing::debug!("stack:\n{}", diagnostics.stack_listing());
        state.record_halt(diagnostics);

        match self.resolvers.resolve(ctx, state.outputs(), loader) {
            ChainOutcome::Next { resolver, context } => {
                tracing::debug!(
                    resolver = %resolver,
                    module = %context.module().display(),
                    capability = %context.capability(),
                    "continuing pipeline"
                );
                state.resume(context);
                FrameOutcome::Continued { resolver, quanta }
            }
            ChainOutcome::Stopped { resolver } => {
                let elapsed = state.finish(self.clock.now());
                tracing::info!(
                    resolver = %resolver,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "pipeline finished (continuation target unavailable)"
                );
                FrameOutcome::Finished { elapsed, quanta }
            }
            ChainOutcome::Exhausted(ctx) => {
                drop(ctx);
                let elapsed = state.finish(self.clock.now());
                tracing::info!(
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "pipeline finished"
                );
                FrameOutcome::Finished { elapsed, quanta }
            }
        }
    }
}
