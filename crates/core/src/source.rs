//! Source map: files, byte offsets, and (line, column) positions.
//!
//! A [`SourceMap`] owns every [`SourceFile`] compiled in one run. Positions
//! are plain `u32` offsets into the map's flat address space, not pointers,
//! so an AST node or a bytecode position-map entry can carry a `Pos` by
//! value without borrowing the file that produced it.

use std::fmt;

/// A byte offset into a [`SourceMap`]'s flat address space.
pub type Pos = u32;

/// A single source file: its name, raw bytes, and a sorted index of where
/// each line starts (for O(log lines) offset -> position lookups).
#[derive(Clone)]
pub struct SourceFile {
    name: String,
    /// Offset of this file's first byte within the owning [`SourceMap`].
    base: Pos,
    bytes: Vec<u8>,
    /// Offsets (relative to `base`) where each line begins; `line_starts[0] == 0`.
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(name: impl Into<String>, base: Pos, bytes: Vec<u8>) -> Self {
        let mut line_starts = vec![0u32];
        for (i, &b) in bytes.iter().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        SourceFile {
            name: name.into(),
            base,
            bytes,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn base(&self) -> Pos {
        self.base
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Converts a file-local offset into a 1-indexed (line, column) pair.
    /// `offset` is clamped to the file's length.
    fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[idx];
        let line = idx as u32 + 1;
        let column = offset - line_start + 1;
        (line, column)
    }

    /// The byte range of the given 1-indexed line, excluding its newline.
    fn line_bytes(&self, line: u32) -> &[u8] {
        let idx = (line - 1) as usize;
        if idx >= self.line_starts.len() {
            return &[];
        }
        let start = self.line_starts[idx] as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize - 1)
            .unwrap_or(self.bytes.len());
        let end = end.min(self.bytes.len()).max(start);
        &self.bytes[start..end]
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }
}

/// A resolved (file, line, column) position, suitable for user-facing
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub file: u32,
    pub line: u32,
    pub column: u32,
    pub offset: Pos,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Owns every [`SourceFile`] compiled during a run and converts between the
/// flat `Pos` offsets carried by tokens/AST nodes/bytecode and resolved
/// [`Position`]s.
#[derive(Default, Clone)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    /// Adds a file to the map and returns its index.
    pub fn add_file(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> u32 {
        let base = self
            .files
            .last()
            .map(|f| f.base + f.len() + 1)
            .unwrap_or(0);
        let idx = self.files.len() as u32;
        self.files.push(SourceFile::new(name, base, bytes));
        idx
    }

    pub fn file(&self, idx: u32) -> &SourceFile {
        &self.files[idx as usize]
    }

    /// Number of files registered in this map, so a caller holding a
    /// [`Position`] resolved against a *different* map (an imported
    /// module's own `SourceMap`, say) can check it's in range before
    /// indexing with it.
    pub fn file_count(&self) -> u32 {
        self.files.len() as u32
    }

    /// Finds which file a flat offset belongs to and resolves it to a
    /// [`Position`].
    pub fn position(&self, offset: Pos) -> Position {
        let idx = self.file_index_for(offset);
        let file = &self.files[idx as usize];
        let local = offset - file.base;
        let (line, column) = file.line_col(local);
        Position {
            file: idx,
            line,
            column,
            offset,
        }
    }

    fn file_index_for(&self, offset: Pos) -> u32 {
        for (i, f) in self.files.iter().enumerate().rev() {
            if offset >= f.base {
                return i as u32;
            }
        }
        0
    }

    /// Renders a source trace: `context` lines above and below the position,
    /// with a `^` caret under the offending column.
    pub fn render_trace(&self, pos: Position, context: u32) -> String {
        let file = &self.files[pos.file as usize];
        let first = pos.line.saturating_sub(context).max(1);
        let last = (pos.line + context).min(file.line_count());
        let mut out = String::new();
        for line in first..=last {
            let text = String::from_utf8_lossy(file.line_bytes(line));
            out.push_str(&format!("{line:>5} | {text}\n"));
            if line == pos.line {
                let gutter = "      | ";
                let caret_col = pos.column.saturating_sub(1) as usize;
                out.push_str(gutter);
                out.push_str(&" ".repeat(caret_col));
                out.push_str("^\n");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_position() {
        let mut map = SourceMap::new();
        let idx = map.add_file("a.gad", b"abc".to_vec());
        let pos = map.position(map.file(idx).base() + 1);
        assert_eq!((pos.line, pos.column), (1, 2));
    }

    #[test]
    fn multi_line_position() {
        let mut map = SourceMap::new();
        let base = map.add_file("a.gad", b"abc\ndef\nghi".to_vec());
        let file = map.file(base).base();
        // offset of 'e' on line 2
        let pos = map.position(file + 5);
        assert_eq!((pos.line, pos.column), (2, 2));
    }

    #[test]
    fn multiple_files_resolve_independently() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.gad", b"xx\nyy".to_vec());
        let b = map.add_file("b.gad", b"zz".to_vec());
        let base_b = map.file(b).base();
        let pos = map.position(base_b);
        assert_eq!(pos.file, b);
        assert_eq!((pos.line, pos.column), (1, 1));
        let _ = a;
    }

    #[test]
    fn render_trace_has_caret() {
        let mut map = SourceMap::new();
        map.add_file("a.gad", b"var x = 1\nx +\n".to_vec());
        let pos = map.position(11); // the '+' on line 2
        let out = map.render_trace(pos, 1);
        assert!(out.contains('^'));
        assert!(out.contains("var x = 1"));
    }
}
