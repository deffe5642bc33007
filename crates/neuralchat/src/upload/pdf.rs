//! Heuristic PDF text extraction.
//!
//! This is a byte-level scan, not a PDF parser. It reads string operands
//! inside uncompressed `BT ... ET` text objects only, so PDFs with compressed
//! content streams, object streams, embedded CID fonts or non-Latin encodings
//! yield little or nothing.

pub const MINIMAL_CONTENT: &str = "[PDF text extraction yielded minimal content: \
the PDF may use embedded fonts or images for text]";

pub const EXTRACTION_FAILED: &str = "[Could not extract PDF text]";

/// Results at or below this many characters are reported as minimal.
const MIN_TEXT_CHARS: usize = 50;

/// The `%PDF-` header must start within this many leading bytes.
const HEADER_WINDOW: usize = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PdfError {
    #[error("missing %PDF header")]
    MissingHeader,
}

/// Extract readable text, or [`MINIMAL_CONTENT`] when too little was found.
///
/// Input without a `%PDF-` header near the start is rejected.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if !window.windows(5).any(|w| w == b"%PDF-") {
        return Err(PdfError::MissingHeader);
    }

    let text = collect_strings(bytes);
    if text.chars().count() > MIN_TEXT_CHARS {
        Ok(text)
    } else {
        Ok(MINIMAL_CONTENT.to_string())
    }
}

fn collect_strings(bytes: &[u8]) -> String {
    // Latin-1: one byte, one character.
    let source: Vec<char> = bytes.iter().map(|&b| char::from(b)).collect();

    let mut parts = Vec::new();
    for block in text_blocks(&source) {
        extract_operands(block, &mut parts);
    }

    parts
        .join(" ")
        .split(is_collapsible_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// ASCII whitespace, vertical tab and NBSP. U+0085 from byte 0x85 stays literal text.
fn is_collapsible_space(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\u{0b}' || c == '\u{a0}'
}

/// Every region between a `BT` and the nearest following `ET`.
fn text_blocks(source: &[char]) -> Vec<&[char]> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i + 1 < source.len() {
        if source[i] == 'B' && source[i + 1] == 'T' {
            let start = i + 2;
            let Some(end) = find_pair(source, start, 'E', 'T') else {
                break;
            };
            if end > start {
                blocks.push(&source[start..end]);
            }
            i = end + 2;
        } else {
            i += 1;
        }
    }
    blocks
}

fn find_pair(source: &[char], from: usize, a: char, b: char) -> Option<usize> {
    (from..source.len().saturating_sub(1)).find(|&i| source[i] == a && source[i + 1] == b)
}

fn extract_operands(block: &[char], parts: &mut Vec<String>) {
    let mut i = 0;
    while i < block.len() {
        let found = match block[i] {
            '(' => literal_at(block, i + 1).map(|(raw, next)| (unescape(raw), next)),
            '<' => hex_at(block, i + 1).map(|(hex, next)| (decode_hex(hex), next)),
            _ => None,
        };
        match found {
            Some((text, next)) => {
                parts.push(text);
                i = next;
            }
            None => i += 1,
        }
    }
}

/// Body of a `( ... )` literal starting at `start`, and the index after it.
fn literal_at(block: &[char], start: usize) -> Option<(&[char], usize)> {
    let mut j = start;
    loop {
        match block.get(j)? {
            ')' => return Some((&block[start..j], j + 1)),
            '\\' => match block.get(j + 1) {
                Some('\n' | '\r') | None => return None,
                Some(_) => j += 2,
            },
            _ => j += 1,
        }
    }
}

/// Digits of a `< ... >` hex string starting at `start`, and the index after it.
fn hex_at(block: &[char], start: usize) -> Option<(&[char], usize)> {
    let mut j = start;
    while block.get(j).is_some_and(|c| c.is_ascii_hexdigit()) {
        j += 1;
    }
    (j > start && block.get(j) == Some(&'>')).then(|| (&block[start..j], j + 1))
}

fn unescape(raw: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.iter().copied();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(escaped @ ('(' | ')' | '\\')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn decode_hex(digits: &[char]) -> String {
    digits
        .chunks(2)
        .filter_map(|pair| {
            let pair: String = pair.iter().collect();
            u8::from_str_radix(&pair, 16).ok()
        })
        .map(char::from)
        .collect()
}
