//! PDF extraction: turns the source statute into ordered [`Section`]s.
pub mod legal;
pub mod pdf;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{self, ArtifactError};
use legal::Line;

/// Heading used for text that appears before the first recognised heading.
pub const PREAMBLE_HEADING: &str = "Preamble";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF {}: {source}", .path.display())]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("no extractable text in {}", .0.display())]
    NoText(PathBuf),
}

/// A heading plus the body text that follows it, with its page of origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub body_text: String,
    /// 1-based page on which the heading (or first body line) appeared.
    pub source_page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
}

/// Extract sections from the PDF at `path`.
pub fn extract_sections(path: &Path) -> Result<Vec<Section>, ExtractError> {
    let pages = pdf::extract_pages(path)?;
    let sections = sections_from_pages(&pages);
    if sections.is_empty() {
        return Err(ExtractError::NoText(path.to_path_buf()));
    }
    info!(
        "Extracted {} sections from {} pages of {}",
        sections.len(),
        pages.len(),
        path.display()
    );
    Ok(sections)
}

/// Build sections from `(page_number, text)` pairs in page order.
pub fn sections_from_pages(pages: &[(u32, String)]) -> Vec<Section> {
    let pages = legal::strip_running_lines(pages);
    let mut builder = SectionBuilder::default();

    for (page, text) in &pages {
        for raw in text.lines() {
            builder.push(*page, legal::classify(raw));
        }
        builder.end_paragraph();
    }

    builder.finish()
}

#[derive(Default)]
struct SectionBuilder {
    done: Vec<Section>,
    current: Option<Section>,
    chapter: Option<String>,
    chapter_title: Option<String>,
    awaiting_chapter_title: bool,
}

impl SectionBuilder {
    fn push(&mut self, page: u32, line: Line<'_>) {
        match line {
            Line::Blank => self.end_paragraph(),
            Line::Chapter { number, title } => {
                self.flush();
                self.chapter = Some(number.to_string());
                self.chapter_title = non_empty(title);
                self.awaiting_chapter_title = title.is_empty();
            }
            Line::Heading(text) if self.awaiting_chapter_title => {
                self.chapter_title = Some(text.to_string());
                self.awaiting_chapter_title = false;
            }
            Line::Section {
                number,
                title,
                rest,
            } => {
                self.open(
                    page,
                    format!("Section {number}. {title}"),
                    Some(number),
                    non_empty(title),
                );
                self.append(page, rest);
            }
            Line::Heading(text) => {
                self.open(page, text.to_string(), None, None);
            }
            Line::Body(text) => self.append(page, text),
        }
    }

    fn open(&mut self, page: u32, heading: String, number: Option<&str>, title: Option<String>) {
        self.flush();
        self.awaiting_chapter_title = false;
        self.current = Some(Section {
            heading,
            body_text: String::new(),
            source_page: page,
            chapter: self.chapter.clone(),
            chapter_title: self.chapter_title.clone(),
            section: number.map(str::to_string),
            section_title: title,
        });
    }

    fn append(&mut self, page: u32, text: &str) {
        if text.is_empty() {
            return;
        }
        self.awaiting_chapter_title = false;
        if self.current.is_none() {
            self.open(page, PREAMBLE_HEADING.to_string(), None, None);
        }
        if let Some(section) = self.current.as_mut() {
            if !section.body_text.is_empty() && !section.body_text.ends_with("\n\n") {
                section.body_text.push('\n');
            }
            section.body_text.push_str(text);
        }
    }

    /// Blank lines separate paragraphs.
    fn end_paragraph(&mut self) {
        if let Some(section) = self.current.as_mut() {
            if !section.body_text.is_empty() && !section.body_text.ends_with("\n\n") {
                section.body_text.push_str("\n\n");
            }
        }
    }

    fn flush(&mut self) {
        if let Some(mut section) = self.current.take() {
            section.body_text = section.body_text.trim().to_string();
            if section.body_text.is_empty() && section.section_title.is_none() {
                debug!("Dropping empty section: {}", section.heading);
            } else {
                self.done.push(section);
            }
        }
    }

    fn finish(mut self) -> Vec<Section> {
        self.flush();
        self.done
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Persist sections as the structured-sections JSON artifact.
pub fn save_sections(path: &Path, sections: &[Section]) -> Result<(), ArtifactError> {
    artifact::write_json(path, sections)
}

pub fn load_sections(path: &Path) -> Result<Vec<Section>, ArtifactError> {
    artifact::read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<(u32, String)> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32 + 1, t.to_string()))
            .collect()
    }

    #[test]
    fn test_two_sections_across_pages() {
        let input = pages(&[
            "Chapter-1 Preliminary\n1. Short title: (1) This Act may be cited as the Code.\n(2) It commences at once.",
            "2. Definitions: In this Act, unless the context otherwise requires,\npublic servant means a holder of public office.",
        ]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections.len(), 2);

        assert_eq!(sections[0].heading, "Section 1. Short title");
        assert_eq!(sections[0].section.as_deref(), Some("1"));
        assert_eq!(sections[0].section_title.as_deref(), Some("Short title"));
        assert_eq!(sections[0].chapter.as_deref(), Some("1"));
        assert_eq!(sections[0].chapter_title.as_deref(), Some("Preliminary"));
        assert_eq!(sections[0].source_page, 1);
        assert_eq!(
            sections[0].body_text,
            "(1) This Act may be cited as the Code.\n(2) It commences at once."
        );

        assert_eq!(sections[1].source_page, 2);
        assert_eq!(sections[1].chapter.as_deref(), Some("1"));
        assert!(sections[1].body_text.contains("public servant"));
    }

    #[test]
    fn test_section_body_continues_on_next_page() {
        let input = pages(&[
            "5. Jurisdiction: This Act applies\nthroughout the country",
            "and to citizens abroad.",
        ]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body_text.ends_with("and to citizens abroad."));
        assert_eq!(sections[0].source_page, 1);
    }

    #[test]
    fn test_preamble_before_first_heading() {
        let input = pages(&["An Act made to consolidate the criminal law.\n1. Short title: text"]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, PREAMBLE_HEADING);
        assert!(sections[0].section.is_none());
    }

    #[test]
    fn test_chapter_title_on_following_line() {
        let input = pages(&["CHAPTER 3\nOFFENCES AGAINST THE STATE\n45. Sedition: Whoever attempts"]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].chapter.as_deref(), Some("3"));
        assert_eq!(
            sections[0].chapter_title.as_deref(),
            Some("OFFENCES AGAINST THE STATE")
        );
    }

    #[test]
    fn test_empty_sections_dropped() {
        let input = pages(&["GENERAL PROVISIONS\nSCHEDULE\nThe schedule body."]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "SCHEDULE");
    }

    #[test]
    fn test_titled_section_without_body_kept() {
        let input = pages(&["11. Theft: Whoever steals.\n12. Repealed:\n13. Robbery: Whoever robs."]);
        let sections = sections_from_pages(&input);
        let numbers: Vec<Option<&str>> = sections.iter().map(|s| s.section.as_deref()).collect();
        assert_eq!(numbers, vec![Some("11"), Some("12"), Some("13")]);
        assert_eq!(sections[1].section_title.as_deref(), Some("Repealed"));
        assert!(sections[1].body_text.is_empty());

        let opts = crate::chunker::ChunkOptions {
            chunk_size: 800,
            prefix: "npc2017".to_string(),
        };
        let chunks = crate::chunker::chunk_sections(&sections, &opts);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].source.section.as_deref(), Some("13"));
    }

    #[test]
    fn test_blank_line_splits_paragraphs() {
        let input = pages(&["7. Exceptions: first paragraph\n\nsecond paragraph"]);
        let sections = sections_from_pages(&input);
        assert_eq!(sections[0].body_text, "first paragraph\n\nsecond paragraph");
    }

    #[test]
    fn test_empty_input() {
        assert!(sections_from_pages(&[]).is_empty());
        assert!(sections_from_pages(&pages(&["", "  \n 4 \n"])).is_empty());
    }

    #[test]
    fn test_sections_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");
        let sections = sections_from_pages(&pages(&["1. Title: body text"]));
        save_sections(&path, &sections).unwrap();
        assert_eq!(load_sections(&path).unwrap(), sections);
    }
}
