//! Line classification for statute text.
//!
//! Recognises chapter lines, numbered section lines and stand-alone
//! upper-case headings; everything else is body text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^chapter\s*[-–:]?\s*(\d+|[ivxlc]+)\b\s*[-–:.]?\s*(.*)$")
        .expect("chapter regex")
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.\s+([A-Z][^:]{0,150}?)\s*:-?\s*(.*)$").expect("section regex")
});

static PAGE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(page\s*)?\d{1,4}(\s*(of|/)\s*\d{1,4})?$").expect("page number regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Chapter { number: &'a str, title: &'a str },
    Section {
        number: &'a str,
        title: &'a str,
        rest: &'a str,
    },
    Heading(&'a str),
    Body(&'a str),
}

/// Classify a single extracted line.
pub fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() || PAGE_NUMBER_RE.is_match(line) {
        return Line::Blank;
    }

    if let Some(caps) = CHAPTER_RE.captures(line) {
        let number = caps.get(1).map_or("", |m| m.as_str());
        let title = caps.get(2).map_or("", |m| m.as_str().trim());
        return Line::Chapter { number, title };
    }

    if let Some(caps) = SECTION_RE.captures(line) {
        return Line::Section {
            number: caps.get(1).map_or("", |m| m.as_str()),
            title: caps.get(2).map_or("", |m| m.as_str().trim()),
            rest: caps.get(3).map_or("", |m| m.as_str().trim()),
        };
    }

    if is_likely_heading(line) {
        return Line::Heading(line);
    }

    Line::Body(line)
}

/// Upper-case lines of modest length are treated as headings.
fn is_likely_heading(line: &str) -> bool {
    if line.chars().count() >= 100 || line.ends_with('.') || line.ends_with(',') {
        return false;
    }
    let alpha_count = line.chars().filter(|c| c.is_alphabetic()).count();
    if alpha_count < 3 {
        return false;
    }
    let upper_count = line.chars().filter(|c| c.is_uppercase()).count();
    upper_count as f64 / alpha_count as f64 >= 0.8
}

/// Remove running headers and footers: lines that repeat on most pages.
///
/// Only applies once there are at least three pages, so short documents
/// keep every line.
pub fn strip_running_lines(pages: &[(u32, String)]) -> Vec<(u32, String)> {
    if pages.len() < 3 {
        return pages.to_vec();
    }

    let mut seen_on: HashMap<&str, usize> = HashMap::new();
    for (_, text) in pages {
        let mut distinct: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        for line in distinct {
            *seen_on.entry(line).or_default() += 1;
        }
    }

    let threshold = pages.len() / 2;
    pages
        .iter()
        .map(|(page, text)| {
            let kept: Vec<&str> = text
                .lines()
                .filter(|l| {
                    let t = l.trim();
                    t.is_empty() || seen_on.get(t).copied().unwrap_or(0) <= threshold
                })
                .collect();
            (*page, kept.join("\n"))
        })
        .collect()
}
