use std::time::Duration;

use vidtax_core::Usage;

use super::*;
use crate::response::TokenUsage;

/// Per-million token prices for one model role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            input_per_million: 0.075,
            output_per_million: 0.30,
        }
    }
}

impl CostRates {
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }

    /// Accounting for one call. Without provider usage the token counts are
    /// approximated from word counts of the prompt and the reply.
    pub fn usage_for(
        &self,
        reported: Option<TokenUsage>,
        prompt: &str,
        reply: &str,
        elapsed: Duration,
    ) -> Usage {
        let (input_tokens, output_tokens, total_tokens) = match reported {
            Some(u) => {
                let total = if u.total_tokens > 0 {
                    u.total_tokens
                } else {
                    u.prompt_tokens + u.completion_tokens
                };
                (u.prompt_tokens, u.completion_tokens, total)
            }
            None => {
                let i = approx_tokens(prompt);
                let o = approx_tokens(reply);
                (i, o, i + o)
            }
        };
        Usage {
            input_tokens,
            output_tokens,
            total_tokens,
            cost_usd: self.cost(input_tokens, output_tokens),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

/// Whitespace-separated word count, the fallback token estimate.
pub fn approx_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_per_million() {
        let rates = CostRates::default();
        let c = rates.cost(1_000_000, 1_000_000);
        assert!((c - 0.375).abs() < 1e-12);
    }

    #[test]
    fn falls_back_to_word_counts() {
        let rates = CostRates::default();
        let u = rates.usage_for(None, "one two three", "four five", Duration::from_millis(1500));
        assert_eq!((u.input_tokens, u.output_tokens, u.total_tokens), (3, 2, 5));
        assert!((u.elapsed_secs - 1.5).abs() < 1e-9);

        let reported = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 4,
            total_tokens: 0,
        };
        let u = rates.usage_for(Some(reported), "ignored", "ignored", Duration::ZERO);
        assert_eq!(u.total_tokens, 14);
    }
}
