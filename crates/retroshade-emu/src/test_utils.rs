//! Scripted stand-ins for the emulator, used to drive the pipeline deterministically in tests.
//!
//! A [`ScriptedProgram`] describes how long a module "runs" and what it writes; the
//! [`ScriptedLoader`] hands out [`ScriptedContext`]s for registered module paths and returns
//! `None` for anything else, like a real loader given a missing file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{ExecutionContext, FakeClock, LoadRequest, ModuleLoader, OutputWrite};

/// Tracks how many scripted contexts are alive at once.
#[derive(Debug, Clone, Default)]
pub struct LiveContexts {
    inner: Arc<LiveCounts>,
}

#[derive(Debug, Default)]
struct LiveCounts {
    current: AtomicUsize,
    peak: AtomicUsize,
    created: AtomicUsize,
}

impl LiveContexts {
    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive contexts observed.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    fn enter(&self) -> LiveGuard {
        let now = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        self.inner.created.fetch_add(1, Ordering::SeqCst);
        LiveGuard {
            counts: self.inner.clone(),
        }
    }
}

#[derive(Debug)]
struct LiveGuard {
    counts: Arc<LiveCounts>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.counts.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Behaviour of one scripted module.
#[derive(Debug, Clone)]
pub struct ScriptedProgram {
    instructions: u64,
    cost_per_step: Duration,
    streamed: Vec<OutputWrite>,
    on_halt: Vec<OutputWrite>,
    echo: Option<(String, Vec<u8>)>,
    stack_pointer: u32,
    memory: BTreeMap<u32, u32>,
}

impl ScriptedProgram {
    /// A program that halts after executing `instructions` instructions.
    pub fn new(instructions: u64) -> Self {
        Self {
            instructions,
            cost_per_step: Duration::ZERO,
            streamed: Vec::new(),
            on_halt: Vec::new(),
            echo: None,
            stack_pointer: 0x0010_0000,
            memory: BTreeMap::new(),
        }
    }

    /// Never halts.
    pub fn endless() -> Self {
        Self::new(u64::MAX)
    }

    /// Wall-clock time each `step` call advances the loader's [`FakeClock`] by.
    pub fn cost_per_step(mut self, cost: Duration) -> Self {
        self.cost_per_step = cost;
        self
    }

    /// Emitted on every `step` call.
    pub fn stream(mut self, write: OutputWrite) -> Self {
        self.streamed.push(write);
        self
    }

    /// Emitted by the `step` call that halts.
    pub fn on_halt(mut self, write: OutputWrite) -> Self {
        self.on_halt.push(write);
        self
    }

    /// On halt, replace `stage` with `prefix` followed by the input bytes.
    pub fn echo_input(mut self, stage: impl Into<String>, prefix: impl Into<Vec<u8>>) -> Self {
        self.echo = Some((stage.into(), prefix.into()));
        self
    }

    /// Map `words` consecutive words starting at `base`, with value `base_value + index`.
    pub fn stack(mut self, stack_pointer: u32, base: u32, words: u32) -> Self {
        self.stack_pointer = stack_pointer;
        for i in 0..words {
            self.memory.insert(base + i * 4, 0xCAFE_0000 + i);
        }
        self
    }
}

/// Execution context that follows a [`ScriptedProgram`].
#[derive(Debug)]
pub struct ScriptedContext {
    origin: LoadRequest,
    program: ScriptedProgram,
    remaining: u64,
    executed: u64,
    pc: u32,
    halted: bool,
    pending: Vec<OutputWrite>,
    clock: Option<FakeClock>,
    steps: Arc<AtomicU64>,
    _live: LiveGuard,
}

impl ScriptedContext {
    fn new(
        origin: LoadRequest,
        program: ScriptedProgram,
        clock: Option<FakeClock>,
        steps: Arc<AtomicU64>,
        live: &LiveContexts,
    ) -> Self {
        Self {
            origin,
            remaining: program.instructions,
            program,
            executed: 0,
            pc: 0x0040_1000,
            halted: false,
            pending: Vec::new(),
            clock,
            steps,
            _live: live.enter(),
        }
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl ExecutionContext for ScriptedContext {
    fn origin(&self) -> &LoadRequest {
        &self.origin
    }

    fn step(&mut self, quantum: u32) -> bool {
        if self.halted {
            return false;
        }
        self.steps.fetch_add(1, Ordering::SeqCst);
        if let Some(clock) = &self.clock {
            clock.advance(self.program.cost_per_step);
        }

        let run = self.remaining.min(u64::from(quantum));
        self.remaining -= run;
        self.executed += run;
        self.pc = self.pc.wrapping_add((run as u32).wrapping_mul(4));
        self.pending.extend(self.program.streamed.iter().cloned());

        if self.remaining > 0 {
            return true;
        }

        self.halted = true;
        self.pending.extend(self.program.on_halt.iter().cloned());
        if let Some((stage, prefix)) = &self.program.echo {
            let mut bytes = prefix.clone();
            bytes.extend_from_slice(self.origin.input.bytes());
            self.pending.push(OutputWrite::replace(stage.clone(), bytes));
        }
        false
    }

    fn disassemble(&self, count: usize) -> String {
        (0..count as u32)
            .rev()
            .map(|back| format!("{:08x}: ret", self.pc.wrapping_sub(back * 4)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn status(&self) -> String {
        format!(
            "pc={:08x} sp={:08x} executed={}",
            self.pc, self.program.stack_pointer, self.executed
        )
    }

    fn stack(&self) -> u32 {
        self.program.stack_pointer
    }

    fn memory(&self, address: u32) -> Option<u32> {
        self.program.memory.get(&address).copied()
    }

    fn program(&self) -> u32 {
        self.pc
    }

    fn take_output(&mut self) -> Vec<OutputWrite> {
        std::mem::take(&mut self.pending)
    }
}

/// Loader serving [`ScriptedProgram`]s by module path. Clones share state, so a test can keep a
/// handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLoader {
    inner: Arc<Mutex<LoaderState>>,
    live: LiveContexts,
    steps: Arc<AtomicU64>,
}

#[derive(Debug, Default)]
struct LoaderState {
    programs: HashMap<PathBuf, ScriptedProgram>,
    requests: Vec<LoadRequest>,
    clock: Option<FakeClock>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts created from now on advance `clock` as they step.
    pub fn with_clock(self, clock: FakeClock) -> Self {
        self.lock().clock = Some(clock);
        self
    }

    pub fn with_program(self, module: impl Into<PathBuf>, program: ScriptedProgram) -> Self {
        self.register(module, program);
        self
    }

    pub fn register(&self, module: impl Into<PathBuf>, program: ScriptedProgram) {
        self.lock().programs.insert(module.into(), program);
    }

    pub fn unregister(&self, module: &Path) {
        self.lock().programs.remove(module);
    }

    /// Every request seen so far, including ones that produced no context.
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.lock().requests.clone()
    }

    pub fn live(&self) -> LiveContexts {
        self.live.clone()
    }

    /// Total `step` calls made on contexts from this loader.
    pub fn steps_taken(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoaderState> {
        self.inner.lock().expect("scripted loader lock poisoned")
    }
}

impl ModuleLoader for ScriptedLoader {
    fn load(&mut self, request: LoadRequest) -> Option<Box<dyn ExecutionContext>> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let program = state.programs.get(&request.module)?.clone();
        let clock = state.clock.clone();
        drop(state);

        Some(Box::new(ScriptedContext::new(
            request,
            program,
            clock,
            self.steps.clone(),
            &self.live,
        )))
    }
}
