use std::sync::LazyLock;

use regex::Regex;

static SUBSECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((\d{1,3})\)").expect("subsection regex"));

/// Split a section body at lines starting with a subsection marker `(N)`.
///
/// Text before the first marker is returned with `None`. Marker text is kept
/// in the piece it introduces.
pub fn split_subsections(body: &str) -> Vec<(Option<String>, String)> {
    let mut pieces: Vec<(Option<String>, String)> = Vec::new();
    let mut current: (Option<String>, String) = (None, String::new());

    for line in body.lines() {
        let trimmed = line.trim_start();
        if let Some(caps) = SUBSECTION_RE.captures(trimmed) {
            if !current.1.trim().is_empty() {
                pieces.push(current);
            }
            current = (caps.get(1).map(|m| m.as_str().to_string()), String::new());
        }
        if !current.1.is_empty() {
            current.1.push('\n');
        }
        current.1.push_str(line);
    }

    if !current.1.trim().is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .map(|(n, text)| (n, text.trim().to_string()))
        .collect()
}

/// Splits text into chunks of at most `chunk_size` characters (`char` count).
///
/// Paragraphs (separated by a blank line) are packed greedily; a paragraph
/// longer than `chunk_size` is cut at sentence boundaries. A `chunk_size`
/// of zero is treated as one.
pub fn split_into_chunks(content: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    if content.trim().chars().count() <= chunk_size {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current_chunk = String::new();
    let mut current_len = 0usize;

    for para in content.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_len = para.chars().count();

        // Flush when this paragraph would overflow the window
        if current_len > 0 && current_len + para_len + 2 > chunk_size {
            chunks.push(std::mem::take(&mut current_chunk));
            current_len = 0;
        }

        if para_len > chunk_size {
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current_chunk));
                current_len = 0;
            }
            chunks.extend(split_large_paragraph(para, chunk_size));
        } else {
            if current_len > 0 {
                current_chunk.push_str("\n\n");
                current_len += 2;
            }
            current_chunk.push_str(para);
            current_len += para_len;
        }
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

/// Splits a large paragraph, preferring a sentence boundary in the back half
/// of each window and hard-cutting when none exists.
fn split_large_paragraph(para: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut chars: Vec<char> = para.chars().collect();

    while chars.len() > chunk_size {
        let min_search = chunk_size / 2;
        let cut_point = (min_search..chunk_size)
            .rev()
            .find(|&i| matches!(chars[i], '.' | '!' | '?' | ';' | '\n' | '।'))
            .map_or(chunk_size, |i| i + 1);

        let piece: String = chars[..cut_point].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        let remaining: String = chars[cut_point..].iter().collect();
        chars = remaining.trim().chars().collect();
    }

    if !chars.is_empty() {
        chunks.push(chars.into_iter().collect());
    }

    chunks
}
