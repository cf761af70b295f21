//! Clause finalization: turns the splitter's raw entries into the fixed
//! clause sequence every later stage is aligned to.
//!
//! Non-operative text (preamble, recitals, signature and execution blocks)
//! is dropped here, before indices are assigned, so downstream stages never
//! see it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::schema::ExtractedClause;
use crate::types::{Clause, TextSpan};

lazy_static! {
    /// Headings that introduce non-operative text, with an optional section number
    static ref NON_OPERATIVE_HEADING: Regex = Regex::new(
        r"(?i)^\s*(?:(?:article|section)\s+)?(?:[0-9ivx]+[.)]?\s*)*(?:preamble|recitals?|whereas(?:\s+clauses?)?|background|witnesseth|signatures?(?:\s+(?:block|blocks|page))?|in\s+witness\s+whereof|execution(?:\s+(?:block|page))?)\s*[:.]?\s*$"
    ).unwrap();

    /// Opening words of recitals and execution blocks
    static ref NON_OPERATIVE_OPENING: Regex = Regex::new(
        r"(?i)^\s*(?:whereas\b|witnesseth\b|in\s+witness\s+whereof\b)"
    ).unwrap();

    /// The agreement's introductory sentence ("This Agreement is made ...")
    static ref INTRODUCTION: Regex = Regex::new(
        r"(?i)^\s*this\b[^.]{0,120}?\bagreement\b[^.]{0,200}?\b(?:made|entered\s+into)\b"
    ).unwrap();
}

/// Whether a clause with this title and text carries operative terms.
///
/// Operative clauses often open with "This Agreement ... made", so the
/// introductory-sentence rule only applies to untitled entries here.
/// [`finalize_clauses`] also applies it to the first entry.
pub fn is_operative(title: &str, text: &str) -> bool {
    !NON_OPERATIVE_HEADING.is_match(title)
        && !NON_OPERATIVE_OPENING.is_match(text)
        && !(title.trim().is_empty() && is_introduction(text))
}

/// Whether the text reads like the sentence that introduces the agreement and its parties.
pub fn is_introduction(text: &str) -> bool {
    INTRODUCTION.is_match(text)
}

/// Build the final clause sequence from the splitter's entries.
///
/// Drops empty and non-operative entries, then assigns 0-based indices,
/// `clause_<n>` ids (1-based) and, where the text can be found in the
/// document, byte spans.
pub fn finalize_clauses(document_text: &str, extracted: Vec<ExtractedClause>) -> Vec<Clause> {
    let mut locator = SpanLocator::new(document_text);
    let received = extracted.len();

    let clauses: Vec<Clause> = extracted
        .into_iter()
        .enumerate()
        .filter(|(position, entry)| {
            let text = entry.clause_text.trim();
            !text.is_empty()
                && entry.operative
                && is_operative(&entry.clause_title, text)
                && !(*position == 0 && is_introduction(text))
        })
        .map(|(_, entry)| entry)
        .enumerate()
        .map(|(index, entry)| {
            let text = entry.clause_text.trim().to_string();
            let title = match entry.clause_title.trim() {
                "" => format!("Clause {}", index + 1),
                t => t.to_string(),
            };
            let number = entry
                .clause_number
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());

            Clause {
                index,
                id: format!("clause_{}", index + 1),
                number,
                title,
                span: locator.locate(&text),
                text,
            }
        })
        .collect();

    if clauses.len() < received {
        tracing::debug!(
            received,
            kept = clauses.len(),
            "Dropped empty or non-operative clause entries"
        );
    }

    clauses
}

/// Locate a passage in the document, ignoring whitespace differences.
pub fn locate_span(document_text: &str, passage: &str) -> Option<TextSpan> {
    SpanLocator::new(document_text).locate(passage)
}

/// Finds clause texts in a document in order.
///
/// Matching collapses whitespace runs on both sides. Searches start after
/// the previous match, falling back to the whole document.
pub struct SpanLocator {
    normalized: String,
    /// Original byte offset of each byte in `normalized`
    offsets: Vec<usize>,
    cursor: usize,
}

impl SpanLocator {
    pub fn new(source: &str) -> Self {
        let mut normalized = String::with_capacity(source.len());
        let mut offsets = Vec::with_capacity(source.len());
        let mut pending_space = None;

        for (i, ch) in source.char_indices() {
            if ch.is_whitespace() {
                if pending_space.is_none() && !normalized.is_empty() {
                    pending_space = Some(i);
                }
                continue;
            }

            if let Some(at) = pending_space.take() {
                normalized.push(' ');
                offsets.push(at);
            }
            normalized.push(ch);
            offsets.extend(i..i + ch.len_utf8());
        }

        Self {
            normalized,
            offsets,
            cursor: 0,
        }
    }

    /// Locate the next occurrence of `passage`.
    pub fn locate(&mut self, passage: &str) -> Option<TextSpan> {
        let needle = passage.split_whitespace().collect::<Vec<_>>().join(" ");
        if needle.is_empty() {
            return None;
        }

        let start = self.normalized[self.cursor..]
            .find(&needle)
            .map(|pos| self.cursor + pos)
            .or_else(|| self.normalized.find(&needle))?;
        let end = start + needle.len();
        self.cursor = end;

        Some(TextSpan {
            start: self.offsets[start],
            end: self.offsets[end - 1] + 1,
        })
    }
}
