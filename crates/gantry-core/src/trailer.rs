//! Change-Id extraction from commit messages.
//!
//! The review identity of a commit is carried in a `Change-Id:` footer line.
//! Only the last paragraph of the message counts as the footer, so a
//! `Change-Id:` mentioned in prose earlier in the message is ignored.

use crate::model::ChangeId;

/// Footer key for the review identity.
pub const CHANGE_ID_KEY: &str = "Change-Id:";

/// Why a commit message yields no usable Change-Id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeIdProblem {
    /// No `Change-Id:` line in the footer paragraph.
    Missing,
    /// More than one `Change-Id:` line in the footer paragraph.
    Multiple,
    /// A `Change-Id:` line whose value is not `I` + 40 lowercase hex digits.
    Invalid,
}

/// Extract the single Change-Id from a commit message footer.
///
/// The footer is the last non-empty paragraph. Exactly one well-formed
/// `Change-Id:` line must appear there.
pub fn change_id_of(message: &str) -> Result<ChangeId, ChangeIdProblem> {
    let footer = last_paragraph(message);
    let mut found: Option<&str> = None;
    for line in footer.lines() {
        if let Some(value) = line.strip_prefix(CHANGE_ID_KEY) {
            if found.is_some() {
                return Err(ChangeIdProblem::Multiple);
            }
            found = Some(value.trim());
        }
    }
    let value = found.ok_or(ChangeIdProblem::Missing)?;
    ChangeId::new(value).map_err(|_| ChangeIdProblem::Invalid)
}

/// The last non-empty paragraph of a message, paragraphs being separated by
/// blank lines.
fn last_paragraph(message: &str) -> &str {
    let trimmed = message.trim_end();
    let mut start = 0;
    let mut prev_blank = false;
    for (offset, line) in line_spans(trimmed) {
        let blank = line.trim().is_empty();
        if prev_blank && !blank {
            start = offset;
        }
        prev_blank = blank;
    }
    trimmed[start..].trim_start_matches('\n')
}

fn line_spans(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.split_inclusive('\n').scan(0usize, |offset, line| {
        let at = *offset;
        *offset += line.len();
        Some((at, line))
    })
}
