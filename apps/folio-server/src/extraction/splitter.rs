//! Chapter splitter
//!
//! Bounds unit size for display. A unit above the word limit is cut into
//! ordered parts at block boundaries, then sentence boundaries inside an
//! oversized block, then whitespace inside an oversized sentence. Words are
//! never cut. Order indexes are renumbered contiguously over the whole list.

use crate::html::{count_words, html_to_text, is_block, is_void, Scanner, Token};

use super::types::ContentUnit;

/// Guard against pathological nesting when descending into containers
const MAX_DEPTH: usize = 16;

/// Splits oversized units into numbered parts
#[derive(Debug, Clone, Copy)]
pub struct ChapterSplitter {
    max_words_per_part: usize,
}

impl ChapterSplitter {
    pub fn new(max_words_per_part: usize) -> Self {
        Self { max_words_per_part }
    }

    pub fn max_words_per_part(&self) -> usize {
        self.max_words_per_part
    }

    /// Split every oversized unit and renumber `order_index` across the output
    pub fn split(&self, units: Vec<ContentUnit>) -> Vec<ContentUnit> {
        self.split_mapped(units).0
    }

    /// Like `split`, also returning for each input unit the output index of
    /// its first part
    pub fn split_mapped(&self, units: Vec<ContentUnit>) -> (Vec<ContentUnit>, Vec<usize>) {
        let mut output = Vec::with_capacity(units.len());
        let mut first_part = Vec::with_capacity(units.len());

        for (position, unit) in units.into_iter().enumerate() {
            first_part.push(output.len());
            if self.max_words_per_part == 0 || unit.word_count <= self.max_words_per_part {
                output.push(unit);
                continue;
            }

            let chapter_number = unit.original_chapter_number.unwrap_or(position + 1);
            let pieces = match &unit.html {
                Some(html) => self.split_html(html),
                None => self.split_plain(&unit.plain_text),
            };

            if pieces.len() <= 1 {
                // Nothing to cut at (one giant word run inside markup)
                output.push(unit);
                continue;
            }

            let total = pieces.len();
            tracing::debug!(
                chapter = chapter_number,
                words = unit.word_count,
                parts = total,
                "Splitting oversized unit"
            );

            for (i, piece) in pieces.into_iter().enumerate() {
                let mut part = if unit.html.is_some() {
                    ContentUnit::from_html(unit.unit_type, unit.title.clone(), piece, 0)
                } else {
                    let word_count = count_words(&piece);
                    ContentUnit {
                        unit_type: unit.unit_type,
                        title: unit.title.clone(),
                        html: None,
                        plain_text: piece,
                        order_index: 0,
                        word_count,
                        original_chapter_number: None,
                        part_number: None,
                        total_parts: None,
                    }
                };
                part.original_chapter_number = Some(chapter_number);
                part.part_number = Some(i + 1);
                part.total_parts = Some(total);
                output.push(part);
            }
        }

        for (index, unit) in output.iter_mut().enumerate() {
            unit.order_index = index;
        }
        (output, first_part)
    }

    fn split_html(&self, html: &str) -> Vec<String> {
        let blocks = segment_blocks(html);
        self.pack(blocks, 0)
    }

    fn split_plain(&self, text: &str) -> Vec<String> {
        let mut pieces: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_words = 0usize;

        let mut atoms: Vec<String> = Vec::new();
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if count_words(paragraph) > self.max_words_per_part {
                for sentence in split_sentences(paragraph) {
                    if count_words(&sentence) > self.max_words_per_part {
                        atoms.extend(split_words(&sentence, self.max_words_per_part));
                    } else {
                        atoms.push(sentence);
                    }
                }
            } else {
                atoms.push(paragraph.to_string());
            }
        }

        for atom in atoms {
            let words = count_words(&atom);
            if !current.is_empty() && current_words + words > self.max_words_per_part {
                pieces.push(current.join("\n\n"));
                current.clear();
                current_words = 0;
            }
            current_words += words;
            current.push(atom);
        }
        if !current.is_empty() {
            pieces.push(current.join("\n\n"));
        }
        pieces
    }

    /// Greedily pack HTML fragments into parts of at most the word limit
    fn pack(&self, items: Vec<String>, depth: usize) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_words = 0usize;

        for item in items {
            let words = html_words(&item);
            if words > self.max_words_per_part && depth < MAX_DEPTH {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                    current_words = 0;
                }
                parts.extend(self.split_oversized(&item, depth + 1));
                continue;
            }
            if !current.is_empty() && current_words + words > self.max_words_per_part {
                parts.push(std::mem::take(&mut current));
                current_words = 0;
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&item);
            current_words += words;
        }
        if !current.trim().is_empty() {
            parts.push(current);
        }
        parts
    }

    /// Cut one oversized block, re-wrapping each piece in the block's element
    fn split_oversized(&self, block: &str, depth: usize) -> Vec<String> {
        let (open, inner, close) = match unwrap_element(block) {
            Some(parts) => parts,
            None => ("", block, ""),
        };

        let children = segment_blocks(inner);
        let pieces = if children.len() > 1 {
            self.pack(children, depth)
        } else {
            let atoms = sentence_atoms(inner)
                .into_iter()
                .flat_map(|atom| {
                    if html_words(&atom) > self.max_words_per_part && !atom.contains('<') {
                        split_words(&atom, self.max_words_per_part)
                    } else {
                        vec![atom]
                    }
                })
                .collect::<Vec<_>>();
            self.pack_inline(atoms)
        };

        pieces
            .into_iter()
            .map(|piece| format!("{}{}{}", open, piece.trim(), close))
            .collect()
    }

    /// Pack inline atoms (sentences) without inserting separators
    fn pack_inline(&self, atoms: Vec<String>) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_words = 0usize;

        for atom in atoms {
            let words = html_words(&atom);
            if !current.trim().is_empty() && current_words + words > self.max_words_per_part {
                parts.push(std::mem::take(&mut current));
                current_words = 0;
            }
            current.push_str(&atom);
            current_words += words;
        }
        if !current.trim().is_empty() {
            parts.push(current);
        }
        parts
    }
}

fn html_words(fragment: &str) -> usize {
    count_words(&html_to_text(fragment))
}

/// Split HTML into top-level blocks
///
/// Loose inline content between block elements forms its own block.
/// Whitespace-only runs are dropped.
fn segment_blocks(html: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    let flush = |current: &mut String, blocks: &mut Vec<String>| {
        if !current.trim().is_empty() {
            blocks.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for token in Scanner::new(html) {
        match token {
            Token::StartTag {
                name,
                raw,
                self_closing,
            } => {
                let opens = !self_closing && !is_void(name);
                if depth == 0 && is_block(name) {
                    flush(&mut current, &mut blocks);
                }
                current.push_str(raw);
                if opens {
                    depth += 1;
                } else if depth == 0 && is_block(name) {
                    flush(&mut current, &mut blocks);
                }
            }
            Token::EndTag { name, raw } => {
                current.push_str(raw);
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 && is_block(name) {
                        flush(&mut current, &mut blocks);
                    }
                }
            }
            Token::Text(text) => current.push_str(text),
            Token::Other(raw) => current.push_str(raw),
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

/// If `block` is exactly one element, return (start tag, inner, end tag)
fn unwrap_element(block: &str) -> Option<(&str, &str, &str)> {
    let trimmed = block.trim();
    let tokens: Vec<Token<'_>> = Scanner::new(trimmed).collect();
    let (first, last) = (tokens.first()?, tokens.last()?);

    let (open_name, open_raw) = match first {
        Token::StartTag {
            name,
            raw,
            self_closing: false,
        } => (*name, *raw),
        _ => return None,
    };
    let close_raw = match last {
        Token::EndTag { name, raw } if name.eq_ignore_ascii_case(open_name) => *raw,
        _ => return None,
    };

    // The first element must close only at the very end
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::StartTag {
                name, self_closing, ..
            } if !*self_closing && !is_void(name) => depth += 1,
            Token::EndTag { .. } => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != tokens.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }

    let inner = &trimmed[open_raw.len()..trimmed.len() - close_raw.len()];
    Some((open_raw, inner, close_raw))
}

/// Break inline markup into sentence-sized atoms
///
/// Cuts happen only in text at nesting depth zero, so every atom keeps its
/// inline tags balanced.
fn sentence_atoms(inner: &str) -> Vec<String> {
    let mut atoms: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for token in Scanner::new(inner) {
        match token {
            Token::Text(text) if depth == 0 => {
                let sentences = split_sentences_raw(text);
                let last = sentences.len().saturating_sub(1);
                for (i, sentence) in sentences.into_iter().enumerate() {
                    current.push_str(sentence);
                    if i < last {
                        atoms.push(std::mem::take(&mut current));
                    }
                }
            }
            Token::StartTag {
                name,
                raw,
                self_closing,
            } => {
                current.push_str(raw);
                if !self_closing && !is_void(name) {
                    depth += 1;
                }
            }
            Token::EndTag { raw, .. } => {
                current.push_str(raw);
                depth = depth.saturating_sub(1);
            }
            other => current.push_str(other.raw()),
        }
    }
    if !current.is_empty() {
        atoms.push(current);
    }
    atoms
}

/// Split text after sentence terminators, keeping trailing whitespace with
/// the sentence it follows. Concatenating the pieces yields the input.
fn split_sentences_raw(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut after_terminator = false;
    let mut in_gap = false;

    for (i, ch) in text.char_indices() {
        if in_gap && !ch.is_whitespace() {
            pieces.push(&text[start..i]);
            start = i;
            in_gap = false;
            after_terminator = false;
        }
        if matches!(ch, '.' | '!' | '?' | '…') {
            after_terminator = true;
        } else if ch.is_whitespace() {
            if after_terminator {
                in_gap = true;
            }
        } else if !matches!(ch, '"' | '\'' | '”' | '’' | '»' | ')') {
            after_terminator = false;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_sentences(text: &str) -> Vec<String> {
    split_sentences_raw(text)
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a run of text into chunks of at most `max` words at whitespace
fn split_words(text: &str, max: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max.max(1))
        .map(|chunk| chunk.join(" ") + " ")
        .collect()
}
