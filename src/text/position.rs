//! Resolving human-friendly line and symbol descriptors to LSP positions
//!
//! Callers describe a target as "line 14" or "the line containing
//! `fn parse`", plus a symbol substring and an occurrence index. Resolution
//! errors carry the counts and candidates needed to self-correct: an
//! ambiguous substring lists the matching lines, an out-of-range occurrence
//! reports how many occurrences exist.

use lsp_types::Position;

use crate::text::byte_to_utf16;

// ============================================================================
// Line Resolution
// ============================================================================

/// How a caller designates a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTarget {
    /// 1-based line number, the way humans and editors count
    Number(u32),
    /// Substring that must match exactly one line
    Text(String),
}

impl From<u32> for LineTarget {
    fn from(number: u32) -> Self {
        LineTarget::Number(number)
    }
}

impl From<&str> for LineTarget {
    fn from(text: &str) -> Self {
        LineTarget::Text(text.to_string())
    }
}

/// Line resolution errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LineError {
    #[error("Invalid line number {given}: document has {line_count} lines")]
    InvalidLineNumber { given: u32, line_count: usize },

    #[error("No line contains {needle:?}")]
    LineNotFound { needle: String },

    #[error("{needle:?} matches multiple lines: {matches:?} (1-based); use a line number instead")]
    AmbiguousLine { needle: String, matches: Vec<u32> },
}

/// Resolve a line target to a zero-based line index
pub fn resolve_line(text: &str, target: &LineTarget) -> Result<u32, LineError> {
    let lines: Vec<&str> = text.split('\n').collect();

    match target {
        LineTarget::Number(number) => {
            if *number == 0 || *number as usize > lines.len() {
                return Err(LineError::InvalidLineNumber {
                    given: *number,
                    line_count: lines.len(),
                });
            }
            Ok(number - 1)
        }
        LineTarget::Text(needle) => {
            let matches: Vec<u32> = lines
                .iter()
                .enumerate()
                .filter(|(_, line)| line.contains(needle.as_str()))
                .map(|(index, _)| index as u32)
                .collect();

            match matches.as_slice() {
                [] => Err(LineError::LineNotFound {
                    needle: needle.clone(),
                }),
                [index] => Ok(*index),
                _ => Err(LineError::AmbiguousLine {
                    needle: needle.clone(),
                    matches: matches.iter().map(|index| index + 1).collect(),
                }),
            }
        }
    }
}

// ============================================================================
// Symbol Resolution
// ============================================================================

/// Symbol resolution errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Symbol {symbol:?} not found in line {line:?}")]
    SymbolNotFound { symbol: String, line: String },

    #[error("Occurrence index {requested} out of range: {symbol:?} occurs {found} times")]
    OccurrenceOutOfRange {
        symbol: String,
        requested: usize,
        found: usize,
    },
}

/// All occurrences of a substring in a line, as UTF-16 columns
///
/// Matches may overlap: the scan advances one character per match, so
/// searching `"aa"` in `"aaaa"` yields three occurrences.
pub fn symbol_occurrences(line: &str, symbol: &str) -> Vec<u32> {
    let mut occurrences = Vec::new();
    if symbol.is_empty() {
        return occurrences;
    }

    let mut search_from = 0;
    while let Some(relative) = line[search_from..].find(symbol) {
        let byte_offset = search_from + relative;
        occurrences.push(byte_to_utf16(line, byte_offset) as u32);

        // Step over one character, not the whole match
        let first_char_len = line[byte_offset..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        search_from = byte_offset + first_char_len;
    }

    occurrences
}

/// UTF-16 column of the nth (zero-based) occurrence of a symbol in a line
pub fn find_symbol(line: &str, symbol: &str, occurrence: usize) -> Result<u32, SymbolError> {
    let occurrences = symbol_occurrences(line, symbol);

    if occurrences.is_empty() {
        return Err(SymbolError::SymbolNotFound {
            symbol: symbol.to_string(),
            line: line.to_string(),
        });
    }

    occurrences
        .get(occurrence)
        .copied()
        .ok_or(SymbolError::OccurrenceOutOfRange {
            symbol: symbol.to_string(),
            requested: occurrence,
            found: occurrences.len(),
        })
}

// ============================================================================
// Composition
// ============================================================================

/// Position resolution errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PositionError {
    #[error(transparent)]
    Line(#[from] LineError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// Resolve a line target plus symbol occurrence to an LSP position
pub fn resolve_symbol_position(
    text: &str,
    target: &LineTarget,
    symbol: &str,
    occurrence: usize,
) -> Result<Position, PositionError> {
    let line_index = resolve_line(text, target)?;
    // resolve_line guarantees the index is in range
    let line = text.split('\n').nth(line_index as usize).unwrap_or("");
    let character = find_symbol(line, symbol, occurrence)?;
    Ok(Position::new(line_index, character))
}

// ============================================================================
// Tests
// ============================================================================
