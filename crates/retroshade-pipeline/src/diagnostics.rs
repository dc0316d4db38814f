//! Read-only inspection of a halted execution context.

use std::fmt::Write as _;
use std::path::PathBuf;

use retroshade_emu::ExecutionContext;

/// Stack words to dump around the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackWindow {
    pub words_before: u32,
    pub words_after: u32,
    pub word_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackWord {
    pub address: u32,
    pub value: u32,
}

/// Snapshot taken when a context halts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltDiagnostics {
    pub module: PathBuf,
    pub program: u32,
    /// Disassembly of the last executed instruction.
    pub instruction: String,
    pub status: String,
    pub stack_pointer: u32,
    /// Words from `sp - words_before * word_size` upwards, truncated at the first unmapped
    /// address.
    pub stack: Vec<StackWord>,
}

impl HaltDiagnostics {
    pub fn capture(ctx: &dyn ExecutionContext, window: StackWindow) -> Self {
        let stack_pointer = ctx.stack();
        Self {
            module: ctx.module().to_path_buf(),
            program: ctx.program(),
            instruction: ctx.disassemble(1),
            status: ctx.status(),
            stack_pointer,
            stack: dump_stack(ctx, stack_pointer, window),
        }
    }

    /// `address: value` lines, the stack pointer's line marked with `<- sp`.
    pub fn stack_listing(&self) -> String {
        let mut out = String::new();
        for word in &self.stack {
            let _ = write!(out, "{:08x}: {:08x}", word.address, word.value);
            if word.address == self.stack_pointer {
                out.push_str(" <- sp");
            }
            out.push('\n');
        }
        out
    }
}

fn dump_stack(ctx: &dyn ExecutionContext, sp: u32, window: StackWindow) -> Vec<StackWord> {
    let stride = i64::from(window.word_size);
    let first = -i64::from(window.words_before);
    let last = i64::from(window.words_after);

    let mut words = Vec::new();
    for index in first..last {
        let address = i64::from(sp) + index * stride;
        // Addresses below zero are not representable; start at the first valid one.
        if address < 0 {
            continue;
        }
        let Ok(address) = u32::try_from(address) else {
            break;
        };
        let Some(value) = ctx.memory(address) else {
            break;
        };
        words.push(StackWord { address, value });
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use retroshade_emu::test_utils::{ScriptedLoader, ScriptedProgram};
    use retroshade_emu::{EntryCapability, LoadRequest, ModuleLoader, StageInput};

    const WINDOW: StackWindow = StackWindow {
        words_before: 4,
        words_after: 16,
        word_size: 4,
    };

    fn load(program: ScriptedProgram) -> Box<dyn ExecutionContext> {
        let mut loader = ScriptedLoader::new().with_program("cc.dll", program);
        loader
            .load(LoadRequest::new(
                "cc.dll",
                EntryCapability::Assemble,
                StageInput::Source("mov r0, r1".into()),
            ))
            .unwrap()
    }

    #[test]
    fn full_window_is_twenty_words() {
        // sp = 0x2040, mapped from 0x2000 for 64 words.
        let ctx = load(ScriptedProgram::new(1).stack(0x2040, 0x2000, 64));
        let diag = HaltDiagnostics::capture(ctx.as_ref(), WINDOW);
        assert_eq!(diag.stack.len(), 20);
        assert_eq!(diag.stack[0].address, 0x2030);
        assert_eq!(diag.stack[4].address, 0x2040);
        assert_eq!(diag.stack[19].address, 0x207C);
        assert_eq!(diag.stack_pointer, 0x2040);
    }

    #[test]
    fn unmapped_word_truncates_dump() {
        // Only 6 words mapped starting at sp - 16: the dump stops after sp + 4.
        let ctx = load(ScriptedProgram::new(1).stack(0x2040, 0x2030, 6));
        let diag = HaltDiagnostics::capture(ctx.as_ref(), WINDOW);
        assert_eq!(diag.stack.len(), 6);
        assert_eq!(diag.stack.last().unwrap().address, 0x2044);
    }

    #[test]
    fn stack_near_zero_skips_negative_addresses() {
        let ctx = load(ScriptedProgram::new(1).stack(0x4, 0x0, 32));
        let diag = HaltDiagnostics::capture(ctx.as_ref(), WINDOW);
        assert_eq!(diag.stack[0].address, 0x0);
        assert_eq!(diag.stack.len(), 17);
    }

    #[test]
    fn listing_marks_stack_pointer() {
        let ctx = load(ScriptedProgram::new(1).stack(0x1008, 0x1000, 3));
        let diag = HaltDiagnostics::capture(
            ctx.as_ref(),
            StackWindow {
                words_before: 2,
                words_after: 4,
                word_size: 4,
            },
        );
        assert_eq!(
            diag.stack_listing(),
            "00001000: cafe0000\n00001004: cafe0001\n00001008: cafe0002 <- sp\n"
        );
    }

    #[test]
    fn capture_reads_status_and_instruction() {
        let ctx = load(ScriptedProgram::new(1));
        let diag = HaltDiagnostics::capture(ctx.as_ref(), WINDOW);
        assert_eq!(diag.module, PathBuf::from("cc.dll"));
        assert_eq!(diag.instruction, format!("{:08x}: ret", diag.program));
        assert!(diag.status.starts_with("pc="));
        // Default scripted stack is unmapped.
        assert!(diag.stack.is_empty());
    }
}
