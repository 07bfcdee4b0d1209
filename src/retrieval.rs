//! Exhaustive similarity search over a [`VectorStore`].
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::{MetadataEntry, StoreError, VectorStore};

/// Similarity measure; higher scores are always better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    InnerProduct,
    /// Negated Euclidean distance.
    L2,
}

impl Metric {
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::InnerProduct => dot(a, b),
            Metric::Cosine => {
                let denom = norm(a) * norm(b);
                if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
            }
            Metric::L2 => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    /// 1-based rank after de-duplication.
    pub rank: usize,
    pub score: f32,
    pub citation: String,
    #[serde(flatten)]
    pub entry: MetadataEntry,
}

/// Score every row and return `(row, score)` pairs, best first.
/// Ties keep store order.
pub fn rank_all(
    store: &VectorStore,
    query: &[f32],
    metric: Metric,
) -> Result<Vec<(usize, f32)>, StoreError> {
    if query.len() != store.dimensions() {
        return Err(StoreError::DimensionMismatch {
            row: 0,
            expected: store.dimensions(),
            actual: query.len(),
        });
    }

    let mut scored: Vec<(usize, f32)> = (0..store.len())
        .map(|i| {
            let score = metric.score(query, store.row(i));
            (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}

/// Top `k` hits, skipping rows whose `(section, subsection)` was already
/// returned. Rows without a section number are never collapsed.
pub fn search(
    store: &VectorStore,
    query: &[f32],
    k: usize,
    metric: Metric,
) -> Result<Vec<Hit>, StoreError> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut hits = Vec::with_capacity(k);

    for (row, score) in rank_all(store, query, metric)? {
        if hits.len() >= k {
            break;
        }
        let entry = store.entry(row);
        if let Some(section) = entry.section.as_deref() {
            let key = (section, entry.subsection.as_deref().unwrap_or(""));
            if !seen.insert(key) {
                continue;
            }
        }
        hits.push(Hit {
            rank: hits.len() + 1,
            score,
            citation: citation(entry),
            entry: entry.clone(),
        });
    }

    Ok(hits)
}

/// `Chapter 3, Section 41, Sub-section 2`, or a placeholder when the entry
/// carries no legal structure.
#[must_use]
pub fn citation(entry: &MetadataEntry) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(chapter) = entry.chapter.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("Chapter {chapter}"));
    }
    if let Some(section) = entry.section.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("Section {section}"));
    }
    if let Some(sub) = entry
        .subsection
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "null")
    {
        parts.push(format!("Sub-section {sub}"));
    }

    if parts.is_empty() {
        "Citation not available".to_string()
    } else {
        parts.join(", ")
    }
}

/// Context block handed to the generator: `[citation] text` per hit.
#[must_use]
pub fn build_context(hits: &[Hit]) -> String {
    hits.iter()
        .map(|h| format!("[{}] {}", h.citation, h.entry.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmbeddingFile, EmbeddingRecord};

    fn entry(id: &str, section: Option<&str>, subsection: Option<&str>) -> MetadataEntry {
        MetadataEntry {
            chunk_id: id.to_string(),
            text: format!("text {id}"),
            source_page: 1,
            heading: "h".to_string(),
            chapter: Some("2".to_string()),
            chapter_title: None,
            section: section.map(str::to_string),
            subsection: subsection.map(str::to_string),
            section_title: None,
        }
    }

    fn store(rows: Vec<(MetadataEntry, Vec<f32>)>) -> VectorStore {
        let dimensions = rows[0].1.len();
        let (metadata, records): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .map(|(e, v)| {
                let id = e.chunk_id.clone();
                (e, EmbeddingRecord { chunk_id: id, vector: v })
            })
            .unzip();
        VectorStore::from_parts(
            EmbeddingFile {
                model: "test".to_string(),
                dimensions,
                records,
            },
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn test_metric_scores() {
        let a = [1.0, 0.0];
        let b = [0.0, 2.0];
        assert_eq!(Metric::Cosine.score(&a, &b), 0.0);
        assert_eq!(Metric::Cosine.score(&a, &[3.0, 0.0]), 1.0);
        assert_eq!(Metric::InnerProduct.score(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(Metric::L2.score(&[0.0, 0.0], &[3.0, 4.0]), -5.0);
        assert_eq!(Metric::Cosine.score(&[0.0, 0.0], &a), 0.0);
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let s = store(vec![
            (entry("c_0001", Some("1"), None), vec![0.9, 0.1, 0.0]),
            (entry("c_0002", Some("2"), None), vec![0.1, 0.9, 0.0]),
            (entry("c_0003", Some("3"), None), vec![0.0, 0.2, 0.8]),
        ]);
        for metric in [Metric::Cosine, Metric::InnerProduct, Metric::L2] {
            let hits = search(&s, &[0.1, 0.9, 0.0], 3, metric).unwrap();
            assert_eq!(hits[0].entry.chunk_id, "c_0002", "metric {metric:?}");
            assert_eq!(hits[0].rank, 1);
        }
    }

    #[test]
    fn test_search_respects_k() {
        let s = store(vec![
            (entry("c_0001", Some("1"), None), vec![1.0, 0.0]),
            (entry("c_0002", Some("2"), None), vec![0.8, 0.2]),
            (entry("c_0003", Some("3"), None), vec![0.5, 0.5]),
        ]);
        let hits = search(&s, &[1.0, 0.0], 2, Metric::Cosine).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_duplicate_sections_collapsed() {
        let s = store(vec![
            (entry("c_0001", Some("41"), Some("1")), vec![1.0, 0.0]),
            (entry("c_0002", Some("41"), Some("1")), vec![0.99, 0.01]),
            (entry("c_0003", Some("41"), Some("2")), vec![0.9, 0.1]),
            (entry("c_0004", None, None), vec![0.8, 0.2]),
            (entry("c_0005", None, None), vec![0.7, 0.3]),
        ]);
        let hits = search(&s, &[1.0, 0.0], 10, Metric::Cosine).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c_0001", "c_0003", "c_0004", "c_0005"]);
        assert_eq!(hits[3].rank, 4);
    }

    #[test]
    fn test_nan_rows_rank_last() {
        let s = store(vec![
            (entry("c_0001", Some("1"), None), vec![0.2, 0.0]),
            (entry("c_0002", Some("2"), None), vec![f32::NAN, 0.0]),
            (entry("c_0003", Some("3"), None), vec![0.9, 0.0]),
            (entry("c_0004", Some("4"), None), vec![0.5, 0.0]),
        ]);
        let ranked = rank_all(&s, &[1.0, 0.0], Metric::InnerProduct).unwrap();
        let rows: Vec<usize> = ranked.iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![2, 3, 0, 1]);
        assert_eq!(ranked[3].1, f32::NEG_INFINITY);
    }

    #[test]
    fn test_dimension_mismatch() {
        let s = store(vec![(entry("c_0001", None, None), vec![1.0, 0.0])]);
        assert!(matches!(
            search(&s, &[1.0, 0.0, 0.0], 1, Metric::Cosine),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_citation() {
        assert_eq!(
            citation(&entry("x", Some("41"), Some("2"))),
            "Chapter 2, Section 41, Sub-section 2"
        );
        assert_eq!(citation(&entry("x", Some("41"), Some("null"))), "Chapter 2, Section 41");

        let mut bare = entry("x", None, None);
        bare.chapter = None;
        assert_eq!(citation(&bare), "Citation not available");
    }

    #[test]
    fn test_build_context() {
        let s = store(vec![
            (entry("c_0001", Some("1"), None), vec![1.0, 0.0]),
            (entry("c_0002", Some("2"), Some("3")), vec![0.0, 1.0]),
        ]);
        let hits = search(&s, &[1.0, 0.0], 2, Metric::Cosine).unwrap();
        assert_eq!(
            build_context(&hits),
            "[Chapter 2, Section 1] text c_0001\n\n[Chapter 2, Section 2, Sub-section 3] text c_0002"
        );
    }
}
