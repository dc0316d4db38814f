use std::fmt;
use std::path::{Path, PathBuf};

/// Stage key of the primary (compiler) output.
///
/// Named intermediate stages produced by continuations use non-empty keys.
pub const PRIMARY_STAGE: &str = "";

/// Entry point a module is started through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryCapability {
    /// High-level shader source compilation (brace-style languages).
    Compile,
    /// Low-level shader assembly.
    Assemble,
    /// Driver-side translation of compiled output into a machine-specific binary.
    DriverExecution,
}

impl EntryCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryCapability::Compile => "compile",
            EntryCapability::Assemble => "assemble",
            EntryCapability::DriverExecution => "driver-execution",
        }
    }
}

impl fmt::Display for EntryCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data handed to a module's entry capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    /// Shader source text for a compiler module.
    Source(String),
    /// Output of an earlier stage, plus the machine variant fields (display name first, then
    /// flags/parameters) the translation targets.
    Binary { bytes: Vec<u8>, machine: Vec<String> },
}

impl StageInput {
    pub fn bytes(&self) -> &[u8] {
        match self {
            StageInput::Source(text) => text.as_bytes(),
            StageInput::Binary { bytes, .. } => bytes,
        }
    }

    /// Machine variant fields; empty for source input.
    pub fn machine(&self) -> &[String] {
        match self {
            StageInput::Source(_) => &[],
            StageInput::Binary { machine, .. } => machine,
        }
    }
}

/// Everything a [`ModuleLoader`] needs to create an execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub module: PathBuf,
    pub capability: EntryCapability,
    pub input: StageInput,
}

impl LoadRequest {
    pub fn new(module: impl Into<PathBuf>, capability: EntryCapability, input: StageInput) -> Self {
        Self {
            module: module.into(),
            capability,
            input,
        }
    }

    /// File name of the bound module, used by resolvers to recognise vendor backends.
    pub fn module_name(&self) -> Option<&str> {
        self.module.file_name().and_then(|name| name.to_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Replace,
}

/// A chunk of byte output produced by a running module for one stage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputWrite {
    pub stage: String,
    pub mode: WriteMode,
    pub bytes: Vec<u8>,
}

impl OutputWrite {
    pub fn append(stage: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            stage: stage.into(),
            mode: WriteMode::Append,
            bytes: bytes.into(),
        }
    }

    pub fn replace(stage: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            stage: stage.into(),
            mode: WriteMode::Replace,
            bytes: bytes.into(),
        }
    }
}

/// One emulated program bound to one native module.
///
/// Inspection methods (`disassemble`, `status`, `stack`, `memory`, `program`) must not mutate
/// emulator state.
pub trait ExecutionContext {
    /// The request this context was created from.
    fn origin(&self) -> &LoadRequest;

    /// Execute at most `quantum` instructions. Returns `false` once the program has halted and no
    /// further instructions can execute.
    fn step(&mut self, quantum: u32) -> bool;

    /// Disassembly of the last `count` executed instructions.
    fn disassemble(&self, count: usize) -> String;

    /// Human-readable processor status (registers, flags).
    fn status(&self) -> String;

    /// Current stack pointer.
    fn stack(&self) -> u32;

    /// Read one word of emulated memory; `None` if the address is unmapped.
    fn memory(&self, address: u32) -> Option<u32>;

    /// Current program counter.
    fn program(&self) -> u32;

    /// Drain byte output the module produced since the last call.
    fn take_output(&mut self) -> Vec<OutputWrite> {
        Vec::new()
    }

    fn module(&self) -> &Path {
        &self.origin().module
    }

    fn capability(&self) -> EntryCapability {
        self.origin().capability
    }
}

/// Creates execution contexts for native modules.
pub trait ModuleLoader {
    /// Load `request.module` and prepare it to run through `request.capability`.
    ///
    /// Must return `None` (not panic) for a nonexistent or unloadable module.
    fn load(&mut self, request: LoadRequest) -> Option<Box<dyn ExecutionContext>>;
}

impl<L: ModuleLoader + ?Sized> ModuleLoader for Box<L> {
    fn load(&mut self, request: LoadRequest) -> Option<Box<dyn ExecutionContext>> {
        (**self).load(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_is_file_name_only() {
        let req = LoadRequest::new(
            "drivers/vendor/libsc.so",
            EntryCapability::DriverExecution,
            StageInput::Binary {
                bytes: vec![1, 2, 3],
                machine: vec!["Model X".into(), "-fast".into()],
            },
        );
        assert_eq!(req.module_name(), Some("libsc.so"));
        assert_eq!(req.input.bytes(), &[1, 2, 3]);
        assert_eq!(req.input.machine()[0], "Model X");
    }

    #[test]
    fn source_input_has_no_machine_fields() {
        let input = StageInput::Source("mov r0, r1".into());
        assert!(input.machine().is_empty());
        assert_eq!(input.bytes(), b"mov r0, r1");
    }

    #[test]
    fn capability_display_names() {
        assert_eq!(EntryCapability::Compile.to_string(), "compile");
        assert_eq!(EntryCapability::Assemble.to_string(), "assemble");
        assert_eq!(
            EntryCapability::DriverExecution.to_string(),
            "driver-execution"
        );
    }
}
