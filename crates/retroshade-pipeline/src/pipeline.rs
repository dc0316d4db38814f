use std::time::Duration;

use retroshade_emu::{ModuleLoader, MonotonicClock};
use retroshade_registry::Registry;

use crate::config::{PipelineConfig, Result};
use crate::controller::{Controller, StageEvent};
use crate::diagnostics::HaltDiagnostics;
use crate::output::{Disassembler, OutputStore};
use crate::resolver::ResolverChain;
use crate::scheduler::{FrameOutcome, Scheduler};
use crate::state::{DirtyFlags, SchedulerState};

/// Result of one [`Pipeline::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Stage (re)starts decided before stepping.
    pub stages: Vec<StageEvent>,
    pub frame: FrameOutcome,
}

impl Tick {
    /// Nothing was started and nothing ran.
    pub fn is_idle(&self) -> bool {
        self.stages.is_empty() && self.frame == FrameOutcome::Idle
    }
}

/// The controller, scheduler and their shared state wired to one module loader.
///
/// Host integrations call [`Pipeline::tick`] once per frame and feed user input through the
/// setters; everything else is read-only.
pub struct Pipeline {
    controller: Controller,
    scheduler: Scheduler,
    state: SchedulerState,
    loader: Box<dyn ModuleLoader>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("controller", &self.controller)
            .field("scheduler", &self.scheduler)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Registry,
        loader: Box<dyn ModuleLoader>,
        clock: Box<dyn MonotonicClock>,
        resolvers: ResolverChain,
    ) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            compilers = registry.compilers.len(),
            drivers = registry.drivers.len(),
            resolvers = resolvers.len(),
            "pipeline created"
        );
        let controller = Controller::new(&config, registry);
        let scheduler = Scheduler::new(config.scheduler, clock, resolvers);
        Ok(Self {
            controller,
            scheduler,
            state: SchedulerState::default(),
            loader,
        })
    }

    /// Render stage binaries with `disassembler`. Discards any output captured so far.
    pub fn with_disassembler(mut self, disassembler: Box<dyn Disassembler>) -> Self {
        *self.state.outputs_mut() = OutputStore::new(disassembler);
        self
    }

    /// Start dirty stages, then step the active context for one frame.
    pub fn tick(&mut self) -> Tick {
        let stages = self.controller.evaluate(
            &mut self.state,
            self.loader.as_mut(),
            self.scheduler.clock(),
        );
        let frame = self
            .scheduler
            .run_frame(&mut self.state, self.loader.as_mut());
        Tick { stages, frame }
    }

    /// Tick until a tick does nothing, at most `max_ticks` times. Returns the number of ticks
    /// that did work.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        let mut busy = 0;
        for _ in 0..max_ticks {
            if self.tick().is_idle() {
                break;
            }
            busy += 1;
        }
        busy
    }

    pub fn set_shader_text(&mut self, text: impl Into<String>) {
        let dirty = self.controller.set_shader_text(text);
        self.state.mark_dirty(dirty);
    }

    pub fn select_compiler(&mut self, index: usize) {
        let dirty = self.controller.select_compiler(index);
        self.state.mark_dirty(dirty);
    }

    pub fn select_driver(&mut self, index: usize) {
        let dirty = self.controller.select_driver(index);
        self.state.mark_dirty(dirty);
    }

    pub fn select_machine(&mut self, index: usize) {
        let dirty = self.controller.select_machine(index);
        self.state.mark_dirty(dirty);
    }

    /// Re-run both stages with the current inputs.
    pub fn rebuild(&mut self) {
        self.state
            .mark_dirty(DirtyFlags::COMPILER | DirtyFlags::MACHINE);
    }

    /// Move the display cursor of `stage`. Returns false if the stage has no output.
    pub fn set_cursor(&mut self, stage: &str, cursor: usize) -> bool {
        self.state.outputs_mut().set_cursor(stage, cursor)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn outputs(&self) -> &OutputStore {
        self.state.outputs()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn last_halt(&self) -> Option<&HaltDiagnostics> {
        self.state.last_halt()
    }

    pub fn last_run(&self) -> Option<Duration> {
        self.state.last_run()
    }
}
