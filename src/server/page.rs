//! Server-rendered HTML front page.
use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde::Deserialize;

use super::api::run_blocking;
use super::{ServeContext, Stats};
use crate::engine::{Answer, QueryError, Retrieval};
use crate::retrieval::Hit;

pub const SAMPLE_QUESTIONS: &[&str] = &[
    "What is the definition of 'public servant'?",
    "What constitutes murder?",
    "What is the punishment for theft?",
    "Explain the right of private defense",
    "What are the types of punishment available?",
    "What is considered sedition?",
    "How is imprisonment for life computed?",
];

const K_CHOICES: std::ops::RangeInclusive<usize> = 3..=10;
const PREVIEW_CHARS: usize = 300;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

/// What the page shows below the form.
#[derive(Debug, Default)]
pub struct Outcome {
    pub query: String,
    pub retrieval: Option<Retrieval>,
    pub answer: Option<Answer>,
    pub errors: Vec<String>,
}

pub async fn index(
    State(ctx): State<Arc<ServeContext>>,
    Query(params): Query<PageQuery>,
) -> Html<String> {
    let k = page_top_k(params.k.unwrap_or(ctx.engine.default_top_k()));
    let query = params.q.unwrap_or_default();
    let outcome = if query.trim().is_empty() {
        None
    } else {
        Some(run_query(&ctx, query.trim().to_string(), k).await)
    };
    Html(render(&ctx.stats(), k, outcome.as_ref(), ctx.engine.has_generator()))
}

/// Snap a requested k onto the selector's choices.
fn page_top_k(k: usize) -> usize {
    k.clamp(*K_CHOICES.start(), *K_CHOICES.end())
}

async fn run_query(ctx: &ServeContext, query: String, k: usize) -> Outcome {
    let mut outcome = Outcome {
        query: query.clone(),
        ..Outcome::default()
    };

    let retrieval = match run_blocking(ctx.engine.clone(), move |e| e.retrieve(&query, Some(k))).await
    {
        Ok(r) => r,
        Err(e) => {
            outcome.errors.push(format!("Retrieval failed: {e}"));
            return outcome;
        }
    };

    if ctx.engine.has_generator() {
        let for_generator = retrieval.clone();
        match run_blocking(ctx.engine.clone(), move |e| e.synthesize(&for_generator)).await {
            Ok(a) => outcome.answer = Some(a),
            Err(QueryError::NoGenerator) => {}
            Err(e) => outcome.errors.push(format!("Answer generation failed: {e}")),
        }
    }
    outcome.retrieval = Some(retrieval);
    outcome
}

/// Render the full page.
#[must_use]
pub fn render(stats: &Stats, k: usize, outcome: Option<&Outcome>, has_generator: bool) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let query = outcome.map(|o| o.query.as_str()).unwrap_or("");

    html.push_str(HEAD);
    html.push_str("<body><aside>\n");
    render_sidebar(&mut html, stats);
    html.push_str("</aside>\n<main>\n");
    html.push_str(
        "<header><h1>Nepal Penal Code 2017 &mdash; Legal Assistant</h1>\
         <p>Ask legal questions. Answers come strictly from the National Penal Code, 2017.</p></header>\n",
    );

    let _ = write!(
        html,
        "<form method=\"get\" action=\"/\">\
         <input type=\"text\" name=\"q\" value=\"{}\" placeholder=\"e.g. What is the punishment for theft?\" autofocus>\
         <label>Sections <select name=\"k\">",
        attr(query)
    );
    for choice in K_CHOICES {
        let selected = if choice == k { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{choice}\"{selected}>{choice}</option>");
    }
    html.push_str("</select></label><button type=\"submit\">Ask</button></form>\n");

    if !has_generator {
        html.push_str(
            "<p class=\"notice\">Answer generation is not configured; showing retrieved sections only.</p>\n",
        );
    }

    if let Some(outcome) = outcome {
        render_outcome(&mut html, outcome);
    }

    html.push_str("</main></body></html>\n");
    html
}

fn render_sidebar(html: &mut String, stats: &Stats) {
    let _ = write!(
        html,
        "<h2>Dataset</h2><dl>\
         <dt>Total provisions</dt><dd>{}</dd>\
         <dt>Chapters</dt><dd>{}</dd>\
         <dt>Embedding model</dt><dd>{} ({} dims)</dd>",
        stats.provisions,
        stats.chapters,
        text(&stats.model),
        stats.dimensions
    );
    if let Some(generator) = &stats.generator {
        let _ = write!(html, "<dt>Answer model</dt><dd>{}</dd>", text(generator));
    }
    html.push_str("</dl>\n<h2>Sample questions</h2><ul class=\"samples\">\n");
    for q in SAMPLE_QUESTIONS {
        let _ = writeln!(
            html,
            "<li><form method=\"get\" action=\"/\"><input type=\"hidden\" name=\"q\" value=\"{}\">\
             <button type=\"submit\">{}</button></form></li>",
            attr(q),
            text(q)
        );
    }
    html.push_str(
        "</ul>\n<p class=\"about\">Answers are drawn only from retrieved sections, with citations, \
         and the assistant refuses when the text is silent. \
         Always verify with official sources.</p>\n",
    );
}

fn render_outcome(html: &mut String, outcome: &Outcome) {
    for error in &outcome.errors {
        let _ = writeln!(html, "<p class=\"error\">{}</p>", text(error));
    }

    if let Some(answer) = &outcome.answer {
        let _ = write!(
            html,
            "<section class=\"answer\"><h2>Legal answer</h2><p>{}</p>",
            text(&answer.parsed.answer)
        );
        if let Some(source) = answer.parsed.cited_source() {
            let _ = write!(html, "<p class=\"source\"><strong>Source:</strong> {}</p>", text(source));
        }
        html.push_str("</section>\n");
    }

    if let Some(retrieval) = &outcome.retrieval {
        if retrieval.hits.is_empty() {
            html.push_str("<p>No matching sections found.</p>\n");
            return;
        }
        let _ = writeln!(
            html,
            "<section class=\"hits\"><h2>Retrieved sections ({})</h2>",
            retrieval.hits.len()
        );
        for hit in &retrieval.hits {
            render_hit(html, hit);
        }
        html.push_str("</section>\n");
    }
}

fn render_hit(html: &mut String, hit: &Hit) {
    let title = hit.entry.section_title.as_deref().unwrap_or("");
    let _ = writeln!(
        html,
        "<article><h3>{}. {}</h3><p class=\"title\"><em>{}</em> <span class=\"score\">score {:.3}, page {}</span></p>\
         <blockquote>{}</blockquote></article>",
        hit.rank,
        text(&hit.citation),
        text(title),
        hit.score,
        hit.entry.source_page,
        text(&preview(&hit.entry.text, PREVIEW_CHARS))
    );
}

/// First `limit` characters, with `...` when anything was cut.
#[must_use]
pub fn preview(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

const HEAD: &str = "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Nepal Penal Code 2017 Legal Assistant</title><style>\
body{display:flex;margin:0;font-family:system-ui,sans-serif;color:#1f2933}\
aside{width:280px;padding:1rem;background:#f4f6f8;min-height:100vh}\
main{flex:1;padding:1rem 2rem;max-width:900px}\
form{display:flex;gap:.5rem;margin:.5rem 0}input[type=text]{flex:1;padding:.5rem}\
.samples{list-style:none;padding:0}.samples button{background:none;border:none;color:#1d4ed8;text-align:left;cursor:pointer}\
.answer{border-left:4px solid #15803d;padding:.5rem 1rem;background:#f0fdf4}\
.error{color:#b91c1c}.notice{color:#92400e}.score{color:#6b7280;font-size:.85em}\
blockquote{margin:.25rem 0 1rem;padding-left:1rem;border-left:3px solid #d1d5db}\
</style></head>\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{Generator, StaticGenerator};
    use crate::server::test_support::{TEXTS, context};

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 300), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("धारा १२३", 4), "धारा...");
    }

    #[tokio::test]
    async fn test_index_without_query() {
        let ctx = context(None);
        let Html(page) = index(State(ctx), Query(PageQuery::default())).await;
        assert!(page.contains("Total provisions</dt><dd>3"));
        assert!(page.contains("Chapters</dt><dd>2"));
        assert!(page.contains("<option value=\"3\" selected>"));
        assert!(page.contains("What constitutes murder?"));
        assert!(page.contains("not configured"));
        assert!(!page.contains("Retrieved sections"));
    }

    #[tokio::test]
    async fn test_index_renders_hits_escaped() {
        let ctx = context(None);
        let params = PageQuery {
            q: Some(TEXTS[2].2.to_string()),
            k: Some(3),
        };
        let Html(page) = index(State(ctx), Query(params)).await;
        assert!(page.contains("Retrieved sections (3)"));
        assert!(page.contains("1. Chapter 2, Section 3"));
        assert!(page.contains("bribe &lt;or gift&gt;"));
        assert!(!page.contains("<or gift>"));
        assert!(page.contains("<option value=\"3\" selected>"));
    }

    #[tokio::test]
    async fn test_index_with_answer() {
        let g: Arc<dyn Generator> = Arc::new(StaticGenerator::new(
            "Answer:\nMurder is punishable with life imprisonment.\nSource:\nChapter 1, Section 2",
        ));
        let ctx = context(Some(g));
        let params = PageQuery {
            q: Some("What constitutes murder?".to_string()),
            k: None,
        };
        let Html(page) = index(State(ctx), Query(params)).await;
        assert!(page.contains("Legal answer"));
        assert!(page.contains("Murder is punishable with life imprisonment."));
        assert!(page.contains("<strong>Source:</strong> Chapter 1, Section 2"));
        assert!(!page.contains("not configured"));
    }

    #[tokio::test]
    async fn test_index_k_snaps_to_choices() {
        let ctx = context(None);
        let low = PageQuery {
            q: None,
            k: Some(1),
        };
        let Html(page) = index(State(ctx.clone()), Query(low)).await;
        assert!(page.contains("<option value=\"3\" selected>"));

        let high = PageQuery {
            q: None,
            k: Some(50),
        };
        let Html(page) = index(State(ctx), Query(high)).await;
        assert!(page.contains("<option value=\"10\" selected>"));
        assert_eq!(page.matches(" selected>").count(), 1);
    }

    #[tokio::test]
    async fn test_index_hides_placeholder_source() {
        let g: Arc<dyn Generator> = Arc::new(StaticGenerator::new(
            "Answer:\nThe provided sections of the National Penal Code, 2017 do not mention this.\n\
             Source:\nNot specified in provided text",
        ));
        let params = PageQuery {
            q: Some("What is the tax rate?".to_string()),
            k: None,
        };
        let Html(page) = index(State(context(Some(g))), Query(params)).await;
        assert!(page.contains("Legal answer"));
        assert!(!page.contains("<strong>Source:</strong>"));
    }

    #[test]
    fn test_render_inline_error() {
        let ctx = context(None);
        let outcome = Outcome {
            query: "q".to_string(),
            errors: vec!["Retrieval failed: boom".to_string()],
            ..Outcome::default()
        };
        let page = render(&ctx.stats(), 6, Some(&outcome), false);
        assert!(page.contains("<p class=\"error\">Retrieval failed: boom</p>"));
    }
}
