//! Text positioning and edit application
//!
//! LSP positions count lines from zero and columns in UTF-16 code units.
//! The helpers here convert between byte offsets (what Rust string slicing
//! wants) and UTF-16 columns (what the wire carries).

pub mod edits;
pub mod position;

pub use edits::{apply_text_edits, workspace_edit_changes};
pub use position::{
    LineError, LineTarget, PositionError, SymbolError, find_symbol, resolve_line,
    resolve_symbol_position, symbol_occurrences,
};

/// Length of a string in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Convert a byte offset within a line to a UTF-16 column
///
/// The offset must lie on a character boundary.
pub fn byte_to_utf16(line: &str, byte_offset: usize) -> usize {
    utf16_len(&line[..byte_offset])
}

/// Convert a UTF-16 column to a byte offset within a line
///
/// Columns past the end of the line clamp to its end, which is how
/// servers commonly express "to end of line". A column landing inside a
/// surrogate pair rounds down to the character it belongs to.
pub fn utf16_to_byte(line: &str, utf16_column: usize) -> usize {
    let mut units = 0;
    for (byte_offset, ch) in line.char_indices() {
        if units + ch.len_utf16() > utf16_column {
            return byte_offset;
        }
        units += ch.len_utf16();
    }
    line.len()
}
