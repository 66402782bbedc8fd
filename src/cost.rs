//! Rough LLM spend estimate for one conversation turn.

use serde::{Deserialize, Serialize};

/// USD per 1000 input tokens.
pub const INPUT_RATE_PER_1K: f64 = 0.003;
/// USD per 1000 output tokens.
pub const OUTPUT_RATE_PER_1K: f64 = 0.015;

const CHARS_PER_TOKEN: usize = 4;

/// About four characters per token; any non-empty text counts as at least one.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() / CHARS_PER_TOKEN).max(1) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LlmCost {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
}

impl LlmCost {
    /// Price every instruction/response pair exchanged in a turn.
    pub fn estimate<I, O>(instructions: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let input_tokens = instructions
            .into_iter()
            .map(|t| estimate_tokens(t.as_ref()))
            .sum();
        let output_tokens = outputs
            .into_iter()
            .map(|t| estimate_tokens(t.as_ref()))
            .sum();
        Self::from_tokens(input_tokens, output_tokens)
    }

    pub fn from_tokens(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            input_cost: round6(input_tokens as f64 / 1000.0 * INPUT_RATE_PER_1K),
            output_cost: round6(output_tokens as f64 / 1000.0 * OUTPUT_RATE_PER_1K),
        }
    }

    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }

    pub fn caption(&self) -> String {
        format!(
            "Estimated LLM cost: input {} tok (USD {:.4}), output {} tok (USD {:.4}), total USD {:.4}",
            self.input_tokens,
            self.input_cost,
            self.output_tokens,
            self.output_cost,
            self.total()
        )
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
