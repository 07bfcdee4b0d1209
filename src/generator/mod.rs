//! Answer synthesis from retrieved law text.
pub mod chat;

use thiserror::Error;

/// The only permitted wording when the retrieved text does not answer the
/// question.
pub const REFUSAL: &str =
    "The provided sections of the National Penal Code, 2017 do not mention this.";

/// Placeholder the model writes under `Source:` when it cannot cite.
pub const NOT_SPECIFIED: &str = "Not specified in provided text";

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse model response: {0}")]
    InvalidResponse(String),

    #[error("model returned no answer")]
    EmptyResponse,
}

/// A text generation backend.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;

    fn model_name(&self) -> &str;
}

/// Returns the same reply for every prompt.
pub struct StaticGenerator {
    reply: String,
}

impl StaticGenerator {
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Generator for StaticGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

/// Build the grounded legal-assistant prompt.
#[must_use]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a legal assistant whose only authority is the National Penal Code of Nepal, 2017.\n\
         The law text below was retrieved for this question and is the sole source of truth.\n\
         \n\
         Rules:\n\
         1. Answer strictly and only from the law text. Do not use prior knowledge.\n\
         2. Do not infer, simplify, generalize or reinterpret the law.\n\
         3. Preserve every condition, exception and proviso that applies.\n\
         4. Cite the exact Chapter, Section and Sub-section where available.\n\
         5. Keep a formal, neutral tone.\n\
         6. If the law text does not explicitly answer the question, or only partly answers it, \
         reply with exactly:\n\
         \"{REFUSAL}\"\n\
         \n\
         LAW TEXT\n\
         ========\n\
         {context}\n\
         \n\
         QUESTION\n\
         ========\n\
         {question}\n\
         \n\
         Respond in this format:\n\
         \n\
         Answer:\n\
         <faithful answer grounded in the law text>\n\
         \n\
         Source:\n\
         <Chapter / Section / Sub-section, or \"{NOT_SPECIFIED}\">\n"
    )
}

/// A generated reply split into its `Answer:` and `Source:` parts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ParsedAnswer {
    pub answer: String,
    pub source: Option<String>,
}

impl ParsedAnswer {
    #[must_use]
    pub fn is_refusal(&self) -> bool {
        self.answer.contains(REFUSAL)
    }

    /// The source line, unless the model left the placeholder.
    #[must_use]
    pub fn cited_source(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| {
            !s.trim_matches(|c: char| c == '"' || c == '.' || c.is_whitespace())
                .eq_ignore_ascii_case(NOT_SPECIFIED)
        })
    }
}

/// Split a reply at its `Answer:` / `Source:` markers. Replies without both
/// markers are returned whole as the answer.
#[must_use]
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    let raw = raw.trim();
    if let (Some(a), Some(s)) = (raw.find("Answer:"), raw.rfind("Source:")) {
        if a < s {
            let answer = raw[a + "Answer:".len()..s].trim().to_string();
            let source = raw[s + "Source:".len()..].trim();
            return ParsedAnswer {
                answer,
                source: (!source.is_empty()).then(|| source.to_string()),
            };
        }
    }
    ParsedAnswer {
        answer: raw.to_string(),
        source: None,
    }
}
