use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use retroshade_emu::ExecutionContext;

use crate::diagnostics::HaltDiagnostics;
use crate::output::OutputStore;

bitflags! {
    /// Pending restart requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const COMPILER = 1 << 0;
        const MACHINE = 1 << 1;
    }
}

/// Everything the scheduler and controller mutate: the single active context, the output store,
/// the dirty flags and run bookkeeping.
pub struct SchedulerState {
    active: Option<Box<dyn ExecutionContext>>,
    outputs: OutputStore,
    dirty: DirtyFlags,
    pipeline_start: Option<Duration>,
    last_halt: Option<HaltDiagnostics>,
    last_run: Option<Duration>,
}

impl fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerState")
            .field("active", &self.active.as_ref().map(|ctx| ctx.module().to_path_buf()))
            .field("outputs", &self.outputs)
            .field("dirty", &self.dirty)
            .field("pipeline_start", &self.pipeline_start)
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new(OutputStore::default())
    }
}

impl SchedulerState {
    pub fn new(outputs: OutputStore) -> Self {
        Self {
            active: None,
            outputs,
            dirty: DirtyFlags::empty(),
            pipeline_start: None,
            last_halt: None,
            last_run: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&dyn ExecutionContext> {
        self.active.as_deref()
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut OutputStore {
        &mut self.outputs
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    pub fn clear_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.remove(flags);
    }

    /// Clock reading taken when the current pipeline's first context was created.
    pub fn pipeline_start(&self) -> Option<Duration> {
        self.pipeline_start
    }

    pub fn last_halt(&self) -> Option<&HaltDiagnostics> {
        self.last_halt.as_ref()
    }

    /// Duration of the most recently completed pipeline run.
    pub fn last_run(&self) -> Option<Duration> {
        self.last_run
    }

    /// Install a freshly created context as the active one.
    ///
    /// Callers must have torn down any previous context first.
    pub fn start(&mut self, ctx: Box<dyn ExecutionContext>, now: Duration) {
        debug_assert!(self.active.is_none(), "a context is already active");
        self.active = Some(ctx);
        self.pipeline_start = Some(now);
    }

    /// Destroy the active context, if any. Returns whether one was destroyed.
    pub fn teardown(&mut self) -> bool {
        let Some(ctx) = self.active.take() else {
            return false;
        };
        tracing::debug!(module = %ctx.module().display(), "tearing down active context");
        drop(ctx);
        self.pipeline_start = None;
        true
    }

    pub(crate) fn take_active(&mut self) -> Option<Box<dyn ExecutionContext>> {
        self.active.take()
    }

    pub(crate) fn resume(&mut self, ctx: Box<dyn ExecutionContext>) {
        debug_assert!(self.active.is_none(), "a context is already active");
        self.active = Some(ctx);
    }

    pub(crate) fn record_halt(&mut self, diagnostics: HaltDiagnostics) {
        self.last_halt = Some(diagnostics);
    }

    /// Mark the pipeline finished and return its duration.
    pub(crate) fn finish(&mut self, now: Duration) -> Duration {
        let elapsed = now.saturating_sub(self.pipeline_start.take().unwrap_or(now));
        self.last_run = Some(elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retroshade_emu::test_utils::{ScriptedLoader, ScriptedProgram};
    use retroshade_emu::{EntryCapability, LoadRequest, ModuleLoader, StageInput};

    #[test]
    fn dirty_flags_are_independent() {
        let mut state = SchedulerState::default();
        state.mark_dirty(DirtyFlags::COMPILER | DirtyFlags::MACHINE);
        state.clear_dirty(DirtyFlags::COMPILER);
        assert_eq!(state.dirty(), DirtyFlags::MACHINE);
    }

    #[test]
    fn teardown_drops_context_and_start_time() {
        let mut loader = ScriptedLoader::new().with_program("a.dll", ScriptedProgram::endless());
        let live = loader.live();
        let ctx = loader
            .load(LoadRequest::new(
                "a.dll",
                EntryCapability::Assemble,
                StageInput::Source("nop".into()),
            ))
            .unwrap();

        let mut state = SchedulerState::default();
        state.start(ctx, Duration::from_millis(7));
        assert!(state.is_active());
        assert_eq!(state.pipeline_start(), Some(Duration::from_millis(7)));

        assert!(state.teardown());
        assert!(!state.teardown());
        assert_eq!(live.current(), 0);
        assert_eq!(state.pipeline_start(), None);
    }

    #[test]
    fn finish_measures_from_start() {
        let mut state = SchedulerState::default();
        state.pipeline_start = Some(Duration::from_millis(10));
        assert_eq!(state.finish(Duration::from_millis(35)), Duration::from_millis(25));
        assert_eq!(state.last_run(), Some(Duration::from_millis(25)));
        assert_eq!(state.pipeline_start(), None);
    }
}
