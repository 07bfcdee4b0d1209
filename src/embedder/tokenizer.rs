/// Sentence-transformer tokenizer wrapper around HuggingFace `tokenizers`.
///
/// Produces padded `input_ids` / `attention_mask` rows for the ONNX embedder.
use std::path::Path;

use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::EmbedderError;

/// all-mpnet-base-v2 was trained with a 384-token window.
const MAX_SEQ_LENGTH: usize = 384;

pub struct SentenceTokenizer {
    inner: Tokenizer,
    pad_id: u32,
}

/// Output of a tokenization operation.
#[derive(Debug, Clone)]
pub struct TokenizerOutput {
    /// Token IDs (input_ids for the model).
    pub input_ids: Vec<i64>,
    /// Attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
}

impl SentenceTokenizer {
    /// Load `tokenizer.json` from the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, EmbedderError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(EmbedderError::TokenizerError(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to load tokenizer: {e}")))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::TokenizerError(format!("truncation config: {e}")))?;

        let pad_id = inner.token_to_id("<pad>").unwrap_or(0);
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token: "<pad>".to_string(),
            ..Default::default()
        }));

        Ok(Self { inner, pad_id })
    }

    /// Tokenize a batch; every row is padded to the batch's longest sequence.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<Vec<TokenizerOutput>, EmbedderError> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedderError::TokenizerError(format!("failed to encode batch: {e}")))?;

        Ok(encodings
            .iter()
            .map(|enc| TokenizerOutput {
                input_ids: enc.get_ids().iter().map(|&id| i64::from(id)).collect(),
                attention_mask: enc
                    .get_attention_mask()
                    .iter()
                    .map(|&m| i64::from(m))
                    .collect(),
            })
            .collect())
    }

    #[must_use]
    pub fn pad_id(&self) -> i64 {
        i64::from(self.pad_id)
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}
