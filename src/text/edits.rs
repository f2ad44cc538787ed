//! Applying LSP text edits to document content
//!
//! Edits are applied in strict reverse document order (last edit first).
//! Applying a later-in-document edit never shifts the offsets of earlier
//! regions, so the result of a non-overlapping edit set is independent of
//! the order the server listed them in. Overlapping edits are outside the
//! contract and produce unspecified (but non-panicking) results.

use lsp_types::{DocumentChangeOperation, DocumentChanges, OneOf, TextEdit, Uri, WorkspaceEdit};
use std::collections::HashMap;
use tracing::warn;

use crate::text::utf16_to_byte;

/// Apply a set of text edits to document content
///
/// Positions beyond the document clamp to its end, matching how servers
/// express "to end of line" ranges.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| {
        (b.range.start.line, b.range.start.character)
            .cmp(&(a.range.start.line, a.range.start.character))
    });

    for edit in ordered {
        apply_one(&mut lines, edit);
    }

    lines.join("\n")
}

/// Splice one edit into the line array
fn apply_one(lines: &mut Vec<String>, edit: &TextEdit) {
    let last_line = lines.len() - 1;
    let start_line = (edit.range.start.line as usize).min(last_line);
    let end_line = (edit.range.end.line as usize).min(last_line);

    let start_byte = utf16_to_byte(&lines[start_line], edit.range.start.character as usize);
    let end_byte = utf16_to_byte(&lines[end_line], edit.range.end.character as usize);

    let mut combined = String::new();
    combined.push_str(&lines[start_line][..start_byte]);
    combined.push_str(&edit.new_text);
    combined.push_str(&lines[end_line][end_byte..]);

    let replacement: Vec<String> = combined.split('\n').map(str::to_string).collect();
    lines.splice(start_line..=end_line, replacement);
}

/// Collect the per-document edits of a workspace edit
///
/// Merges the legacy `changes` map and the `documentChanges` list. Resource
/// operations (create/rename/delete file) carry no text edits and are
/// skipped with a warning.
pub fn workspace_edit_changes(edit: &WorkspaceEdit) -> HashMap<Uri, Vec<TextEdit>> {
    let mut collected: HashMap<Uri, Vec<TextEdit>> = HashMap::new();

    if let Some(changes) = &edit.changes {
        for (uri, edits) in changes {
            collected
                .entry(uri.clone())
                .or_default()
                .extend(edits.iter().cloned());
        }
    }

    match &edit.document_changes {
        Some(DocumentChanges::Edits(document_edits)) => {
            for document_edit in document_edits {
                let entry = collected
                    .entry(document_edit.text_document.uri.clone())
                    .or_default();
                for edit in &document_edit.edits {
                    match edit {
                        OneOf::Left(text_edit) => entry.push(text_edit.clone()),
                        OneOf::Right(annotated) => entry.push(annotated.text_edit.clone()),
                    }
                }
            }
        }
        Some(DocumentChanges::Operations(operations)) => {
            for operation in operations {
                match operation {
                    DocumentChangeOperation::Edit(document_edit) => {
                        let entry = collected
                            .entry(document_edit.text_document.uri.clone())
                            .or_default();
                        for edit in &document_edit.edits {
                            match edit {
                                OneOf::Left(text_edit) => entry.push(text_edit.clone()),
                                OneOf::Right(annotated) => {
                                    entry.push(annotated.text_edit.clone())
                                }
                            }
                        }
                    }
                    DocumentChangeOperation::Op(op) => {
                        warn!("Skipping resource operation in workspace edit: {:?}", op);
                    }
                }
            }
        }
        None => {}
    }

    collected
}

// ============================================================================
// Tests
// ============================================================================
