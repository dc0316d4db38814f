//! Decides when the compiler and machine stages (re)start and what they are fed.

use std::path::PathBuf;

use retroshade_emu::{
    EntryCapability, LoadRequest, ModuleLoader, MonotonicClock, StageInput, PRIMARY_STAGE,
};
use retroshade_registry::{CompilerDescriptor, DriverDescriptor, MachineVariant, Registry};

use crate::config::PipelineConfig;
use crate::state::{DirtyFlags, SchedulerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Shader text to intermediate byte output.
    Compiler,
    /// Intermediate output to a machine-specific binary.
    Machine,
}

/// What a stage evaluation decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Shader text was stored verbatim as the primary output.
    Passthrough { marker: String },
    /// A context was created and handed to the scheduler.
    Started {
        stage: Stage,
        capability: EntryCapability,
        module: PathBuf,
    },
    /// Nothing to run: empty text, bad selection, or the module failed to load.
    Unavailable { stage: Stage },
}

/// Compile for brace-style source, assemble otherwise.
pub fn select_capability(text: &str) -> EntryCapability {
    if text.contains('{') {
        EntryCapability::Compile
    } else {
        EntryCapability::Assemble
    }
}

#[derive(Debug, Clone)]
pub struct Controller {
    compilers: Vec<CompilerDescriptor>,
    drivers: Vec<DriverDescriptor>,
    compiler_root: PathBuf,
    driver_root: PathBuf,
    markers: Vec<String>,
    shader_text: String,
    compiler: usize,
    driver: usize,
    machine: usize,
}

impl Controller {
    pub fn new(config: &PipelineConfig, registry: Registry) -> Self {
        Self {
            compilers: registry.compilers,
            drivers: registry.drivers,
            compiler_root: config.compiler_root.clone(),
            driver_root: config.driver_root.clone(),
            markers: config.passthrough_markers.clone(),
            shader_text: String::new(),
            compiler: 0,
            driver: 0,
            machine: 0,
        }
    }

    pub fn shader_text(&self) -> &str {
        &self.shader_text
    }

    pub fn compilers(&self) -> &[CompilerDescriptor] {
        &self.compilers
    }

    pub fn drivers(&self) -> &[DriverDescriptor] {
        &self.drivers
    }

    pub fn selected_compiler(&self) -> Option<&CompilerDescriptor> {
        self.compilers.get(self.compiler)
    }

    pub fn selected_driver(&self) -> Option<&DriverDescriptor> {
        self.drivers.get(self.driver)
    }

    pub fn selected_machine(&self) -> Option<&MachineVariant> {
        self.selected_driver()?.machine(self.machine)
    }

    /// Returns the stages that need to re-run.
    pub fn set_shader_text(&mut self, text: impl Into<String>) -> DirtyFlags {
        let text = text.into();
        if text == self.shader_text {
            return DirtyFlags::empty();
        }
        self.shader_text = text;
        DirtyFlags::COMPILER | DirtyFlags::MACHINE
    }

    pub fn select_compiler(&mut self, index: usize) -> DirtyFlags {
        if index == self.compiler {
            return DirtyFlags::empty();
        }
        self.compiler = index;
        DirtyFlags::COMPILER | DirtyFlags::MACHINE
    }

    /// Selecting a different driver also resets the machine selection to its first variant.
    pub fn select_driver(&mut self, index: usize) -> DirtyFlags {
        if index == self.driver {
            return DirtyFlags::empty();
        }
        self.driver = index;
        self.machine = 0;
        DirtyFlags::MACHINE
    }

    pub fn select_machine(&mut self, index: usize) -> DirtyFlags {
        if index == self.machine {
            return DirtyFlags::empty();
        }
        self.machine = index;
        DirtyFlags::MACHINE
    }

    /// The pass-through marker `text` starts with, if any.
    pub fn passthrough_marker(&self, text: &str) -> Option<&str> {
        self.markers
            .iter()
            .map(String::as_str)
            .find(|marker| text.starts_with(marker))
    }

    /// Start whichever stages are dirty and allowed to run.
    ///
    /// The compiler stage is evaluated first, so a pass-through result can feed the machine
    /// stage within the same call.
    pub fn evaluate(
        &self,
        state: &mut SchedulerState,
        loader: &mut dyn ModuleLoader,
        clock: &dyn MonotonicClock,
    ) -> Vec<StageEvent> {
        let mut events = Vec::new();

        if state.dirty().contains(DirtyFlags::COMPILER) {
            events.push(self.start_compiler_stage(state, loader, clock));
        }

        if state.dirty().contains(DirtyFlags::MACHINE)
            && !state.outputs().binary(PRIMARY_STAGE).is_empty()
            && !state.is_active()
        {
            events.push(self.start_machine_stage(state, loader, clock));
        }

        events
    }

    fn start_compiler_stage(
        &self,
        state: &mut SchedulerState,
        loader: &mut dyn ModuleLoader,
        clock: &dyn MonotonicClock,
    ) -> StageEvent {
        state.teardown();
        state.outputs_mut().clear();
        state.clear_dirty(DirtyFlags::COMPILER);

        let text = self.shader_text.as_str();
        if let Some(marker) = self.passthrough_marker(text) {
            tracing::debug!(marker, bytes = text.len(), "shader text passed through");
            state
                .outputs_mut()
                .replace(PRIMARY_STAGE, text.as_bytes().to_vec());
            return StageEvent::Passthrough {
                marker: marker.to_string(),
            };
        }

        if text.is_empty() {
            tracing::debug!("compiler stage skipped: empty shader text");
            return StageEvent::Unavailable {
                stage: Stage::Compiler,
            };
        }

        let Some(compiler) = self.selected_compiler() else {
            tracing::warn!(
                index = self.compiler,
                available = self.compilers.len(),
                "compiler stage skipped: no compiler selected"
            );
            return StageEvent::Unavailable {
                stage: Stage::Compiler,
            };
        };

        let capability = select_capability(text);
        let module = self.compiler_root.join(&compiler.path);
        let request = LoadRequest::new(
            module.clone(),
            capability,
            StageInput::Source(text.to_string()),
        );
        self.launch(state, loader, clock, Stage::Compiler, request)
    }

    fn start_machine_stage(
        &self,
        state: &mut SchedulerState,
        loader: &mut dyn ModuleLoader,
        clock: &dyn MonotonicClock,
    ) -> StageEvent {
        state.teardown();
        state.outputs_mut().clear_non_primary();
        state.clear_dirty(DirtyFlags::MACHINE);

        let Some(driver) = self.selected_driver() else {
            tracing::warn!(
                index = self.driver,
                available = self.drivers.len(),
                "machine stage skipped: no driver selected"
            );
            return StageEvent::Unavailable {
                stage: Stage::Machine,
            };
        };
        let (Some(module), Some(machine)) = (driver.module(), driver.machine(self.machine)) else {
            tracing::warn!(
                driver = driver.label(),
                machine = self.machine,
                "machine stage skipped: driver has no module or machine selection is out of range"
            );
            return StageEvent::Unavailable {
                stage: Stage::Machine,
            };
        };

        let request = LoadRequest::new(
            self.driver_root.join(module),
            EntryCapability::DriverExecution,
            StageInput::Binary {
                bytes: state.outputs().binary(PRIMARY_STAGE).to_vec(),
                machine: machine.fields.clone(),
            },
        );
        self.launch(state, loader, clock, Stage::Machine, request)
    }

    fn launch(
        &self,
        state: &mut SchedulerState,
        loader: &mut dyn ModuleLoader,
        clock: &dyn MonotonicClock,
        stage: Stage,
        request: LoadRequest,
    ) -> StageEvent {
        let module = request.module.clone();
        let capability = request.capability;
        match loader.load(request) {
            Some(ctx) => {
                tracing::info!(
                    ?stage,
                    module = %module.display(),
                    %capability,
                    "stage started"
                );
                state.start(ctx, clock.now());
                StageEvent::Started {
                    stage,
                    capability,
                    module,
                }
            }
            None => {
                tracing::warn!(?stage, module = %module.display(), "module failed to load");
                StageEvent::Unavailable { stage }
            }
        }
    }
}
