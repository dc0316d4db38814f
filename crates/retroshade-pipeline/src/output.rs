//! Stage-keyed output captured from the pipeline.
//!
//! Presentation layers only read from the store; the scheduler and controller are the only
//! writers (apart from moving the display cursor).

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use retroshade_emu::{OutputWrite, WriteMode, PRIMARY_STAGE};

/// Renders a stage binary as text.
pub trait Disassembler {
    fn disassemble(&self, stage: &str, bytes: &[u8]) -> String;
}

impl<F> Disassembler for F
where
    F: Fn(&str, &[u8]) -> String,
{
    fn disassemble(&self, stage: &str, bytes: &[u8]) -> String {
        self(stage, bytes)
    }
}

/// Printable UTF-8 is shown as-is; anything else as a hex listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOrHexListing;

impl Disassembler for TextOrHexListing {
    fn disassemble(&self, _stage: &str, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) if is_printable(text) => text.to_string(),
            _ => hex_listing(bytes),
        }
    }
}

fn is_printable(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
}

/// 16 bytes per line: offset, hex bytes, ASCII column.
pub fn hex_listing(bytes: &[u8]) -> String {
    const ROW: usize = 16;

    let mut out = String::with_capacity(bytes.len() / ROW * 78 + 78);
    for (row, chunk) in bytes.chunks(ROW).enumerate() {
        let _ = write!(out, "{:08x} ", row * ROW);
        for i in 0..ROW {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, " {b:02x}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

/// Output of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    binary: Vec<u8>,
    cursor: usize,
    /// Rendered on first read after a write.
    disassembly: OnceCell<String>,
}

impl StageOutput {
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Offset at which the most recent write began (or where the presentation moved it).
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

pub struct OutputStore {
    stages: BTreeMap<String, StageOutput>,
    disassembler: Box<dyn Disassembler>,
}

impl fmt::Debug for OutputStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStore")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new(Box::new(TextOrHexListing))
    }
}

impl OutputStore {
    pub fn new(disassembler: Box<dyn Disassembler>) -> Self {
        Self {
            stages: BTreeMap::new(),
            disassembler,
        }
    }

    pub fn get(&self, stage: &str) -> Option<&StageOutput> {
        self.stages.get(stage)
    }

    pub fn primary(&self) -> Option<&StageOutput> {
        self.get(PRIMARY_STAGE)
    }

    /// Binary of `stage`; empty if the stage has not been reached.
    pub fn binary(&self, stage: &str) -> &[u8] {
        self.get(stage).map(StageOutput::binary).unwrap_or_default()
    }

    /// Stage keys in order; the primary stage (empty key) sorts first.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageOutput)> {
        self.stages.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Disassembly of `stage`, rendered from the current binary.
    pub fn disassembly(&self, stage: &str) -> Option<&str> {
        let entry = self.stages.get(stage)?;
        Some(
            entry
                .disassembly
                .get_or_init(|| self.disassembler.disassemble(stage, &entry.binary)),
        )
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn write(&mut self, write: OutputWrite) {
        match write.mode {
            WriteMode::Append => self.append(&write.stage, &write.bytes),
            WriteMode::Replace => self.replace(&write.stage, write.bytes),
        }
    }

    pub fn apply(&mut self, writes: impl IntoIterator<Item = OutputWrite>) {
        for write in writes {
            self.write(write);
        }
    }

    pub fn append(&mut self, stage: &str, bytes: &[u8]) {
        let entry = self.stages.entry(stage.to_string()).or_default();
        entry.cursor = entry.binary.len();
        entry.binary.extend_from_slice(bytes);
        entry.disassembly.take();
    }

    pub fn replace(&mut self, stage: &str, bytes: Vec<u8>) {
        let entry = self.stages.entry(stage.to_string()).or_default();
        entry.cursor = 0;
        entry.binary = bytes;
        entry.disassembly.take();
    }

    /// Move the display cursor of `stage`, clamped to the binary length.
    pub fn set_cursor(&mut self, stage: &str, cursor: usize) -> bool {
        match self.stages.get_mut(stage) {
            Some(entry) => {
                entry.cursor = cursor.min(entry.binary.len());
                true
            }
            None => false,
        }
    }

    /// Drop every stage, primary included.
    pub fn clear(&mut self) {
        self.stages.clear();
    }

    /// Drop every stage except the primary one.
    pub fn clear_non_primary(&mut self) {
        self.stages.retain(|stage, _| stage == PRIMARY_STAGE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_moves_cursor_to_new_bytes() {
        let mut store = OutputStore::default();
        store.append("", b"abc");
        store.append("", b"def");
        let primary = store.primary().unwrap();
        assert_eq!(primary.binary(), b"abcdef");
        assert_eq!(primary.cursor(), 3);
        assert_eq!(store.disassembly(""), Some("abcdef"));
    }

    #[test]
    fn replace_resets_cursor_and_disassembly() {
        let mut store = OutputStore::default();
        store.append("isa", b"long text here");
        assert_eq!(store.disassembly("isa"), Some("long text here"));
        store.replace("isa", vec![0x00, 0xFF]);
        let out = store.get("isa").unwrap();
        assert_eq!(out.binary(), &[0x00, 0xFF]);
        assert_eq!(out.cursor(), 0);
        assert!(store
            .disassembly("isa")
            .unwrap()
            .starts_with("00000000  00 ff"));
        assert_eq!(store.disassembly("missing"), None);
    }

    #[test]
    fn clear_non_primary_keeps_primary() {
        let mut store = OutputStore::default();
        store.apply([
            OutputWrite::replace("", b"il".to_vec()),
            OutputWrite::append("gen2", b"x".to_vec()),
            OutputWrite::append("gen3", b"y".to_vec()),
        ]);
        assert_eq!(store.stages().collect::<Vec<_>>(), ["", "gen2", "gen3"]);

        store.clear_non_primary();
        assert_eq!(store.stages().collect::<Vec<_>>(), [""]);
        assert_eq!(store.binary(""), b"il");

        store.clear();
        assert!(store.is_empty());
        assert!(store.binary("").is_empty());
    }

    #[test]
    fn cursor_is_clamped() {
        let mut store = OutputStore::default();
        store.replace("", b"1234".to_vec());
        assert!(store.set_cursor("", 99));
        assert_eq!(store.primary().unwrap().cursor(), 4);
        assert!(!store.set_cursor("missing", 0));
    }

    #[test]
    fn custom_disassembler_sees_stage_key() {
        let mut store = OutputStore::new(Box::new(|stage: &str, bytes: &[u8]| {
            format!("{stage}:{}", bytes.len())
        }));
        store.append("gen2", &[1, 2, 3]);
        assert_eq!(store.disassembly("gen2"), Some("gen2:3"));
    }

    #[test]
    fn streamed_appends_render_once_per_read() {
        let renders = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = renders.clone();
        let mut store = OutputStore::new(Box::new(move |_: &str, bytes: &[u8]| {
            counter.set(counter.get() + 1);
            bytes.len().to_string()
        }));

        for _ in 0..1000 {
            store.append("gen1", b"op;");
        }
        assert_eq!(renders.get(), 0);
        assert_eq!(store.disassembly("gen1"), Some("3000"));
        assert_eq!(store.disassembly("gen1"), Some("3000"));
        assert_eq!(renders.get(), 1);

        store.append("gen1", b"op;");
        assert_eq!(store.disassembly("gen1"), Some("3003"));
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn hex_listing_layout() {
        let bytes: Vec<u8> = (0x41..0x41 + 18).collect();
        assert_eq!(
            hex_listing(&bytes),
            "00000000  41 42 43 44 45 46 47 48 49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|\n\
             00000010  51 52                                            |QR|\n"
        );
    }

    #[test]
    fn text_with_control_bytes_falls_back_to_hex() {
        let listing = TextOrHexListing.disassemble("", b"ok\0");
        assert_eq!(listing, "00000000  6f 6b 00                                         |ok.|\n");
        assert_eq!(TextOrHexListing.disassemble("", b"a\n\tb"), "a\n\tb");
    }
}
