//! Token budget gate.
//!
//! Documents above the limit never reach the extraction service. Counting uses
//! the `cl100k_base` encoder when the `tiktoken` feature is on and the encoder
//! loads; otherwise `chars / 4`, which is an approximation and not an error.

use tracing::debug;

use crate::error::{PipelineError, Result};

const CHARS_PER_TOKEN: usize = 4;

pub enum TokenCounter {
    #[cfg(feature = "tiktoken")]
    Bpe(tiktoken_rs::CoreBPE),
    Approximate,
}

impl TokenCounter {
    /// Best counter available in this build.
    pub fn detect() -> Self {
        #[cfg(feature = "tiktoken")]
        match tiktoken_rs::cl100k_base() {
            Ok(bpe) => return TokenCounter::Bpe(bpe),
            Err(e) => debug!("cl100k_base unavailable ({}), approximating tokens", e),
        }
        #[cfg(not(feature = "tiktoken"))]
        debug!("Built without tiktoken, approximating tokens");

        TokenCounter::Approximate
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            #[cfg(feature = "tiktoken")]
            TokenCounter::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
            TokenCounter::Approximate => text.chars().count() / CHARS_PER_TOKEN,
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, TokenCounter::Approximate)
    }
}

pub struct TokenBudget {
    limit: usize,
    counter: TokenCounter,
}

impl TokenBudget {
    pub fn new(limit: usize, counter: TokenCounter) -> Self {
        TokenBudget { limit, counter }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn estimate(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    pub fn admits(&self, tokens: usize) -> bool {
        tokens <= self.limit
    }

    pub fn is_approximate(&self) -> bool {
        self.counter.is_approximate()
    }

    /// Estimate and gate in one step. Over budget is `BudgetExceeded`.
    pub fn check(&self, document: &str, text: &str) -> Result<usize> {
        let tokens = self.estimate(text);
        if self.admits(tokens) {
            Ok(tokens)
        } else {
            Err(PipelineError::BudgetExceeded {
                document: document.to_string(),
                tokens,
                limit: self.limit,
            })
        }
    }
}
