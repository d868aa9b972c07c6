use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokenizers::Tokenizer;
use tracing::{info, warn};

pub const DEFAULT_MAX_TOKENS: usize = 128_000;
pub const DEFAULT_TOKENIZER_MODEL: &str = "Xenova/gpt-4o";

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Hugging Face tokenizer pulled from the hub.
pub struct HfTokenCounter {
    inner: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        let inner = Tokenizer::from_pretrained(model_id, None).map_err(|e| anyhow!("{}", e))?;
        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(enc) => enc.get_ids().len(),
            Err(_) => ApproxCounter.count(text),
        }
    }
}

/// Roughly four characters per token for English prose.
pub struct ApproxCounter;

impl TokenCounter for ApproxCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPolicy {
    /// Drop articles from the end of the batch until the prompt fits.
    Truncate,
    /// Refuse prompts over the limit.
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub tokens: usize,
    pub limit: usize,
}

impl std::fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prompt needs {} tokens, limit is {}", self.tokens, self.limit)
    }
}

impl std::error::Error for BudgetExceeded {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fitted {
    pub prompt: String,
    /// Number of leading articles the prompt covers.
    pub kept: usize,
    pub tokens: usize,
}

#[derive(Clone)]
pub struct TokenBudget {
    max_tokens: usize,
    policy: BudgetPolicy,
    counter: Arc<dyn TokenCounter>,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, policy: BudgetPolicy, counter: Arc<dyn TokenCounter>) -> Self {
        Self { max_tokens, policy, counter }
    }

    /// TOKEN_BUDGET_MAX, TOKEN_BUDGET_POLICY and TOKENIZER_MODEL; falls back to
    /// the approximate counter when the tokenizer cannot be fetched.
    pub fn from_env() -> Self {
        let max_tokens = std::env::var("TOKEN_BUDGET_MAX")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let policy = match std::env::var("TOKEN_BUDGET_POLICY").ok().as_deref() {
            Some("reject") => BudgetPolicy::Reject,
            _ => BudgetPolicy::Truncate,
        };
        let model = std::env::var("TOKENIZER_MODEL").unwrap_or_else(|_| DEFAULT_TOKENIZER_MODEL.to_string());
        let counter: Arc<dyn TokenCounter> = match HfTokenCounter::from_pretrained(&model) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!("tokenizer {model} unavailable ({e}); using approximate token counts");
                Arc::new(ApproxCounter)
            }
        };
        Self::new(max_tokens, policy, counter)
    }

    pub fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Render the prompt for the first `k` of `articles` articles and make sure
    /// role + prompt fit. `render(k)` must grow with `k`.
    pub fn fit<F>(&self, role: &str, articles: usize, render: F) -> Result<Fitted, BudgetExceeded>
    where
        F: Fn(usize) -> String,
    {
        let role_tokens = self.count(role);
        let measure = |k: usize| {
            let prompt = render(k);
            let tokens = role_tokens + self.count(&prompt);
            (prompt, tokens)
        };

        let (prompt, tokens) = measure(articles);
        if tokens <= self.max_tokens {
            return Ok(Fitted { prompt, kept: articles, tokens });
        }
        if self.policy == BudgetPolicy::Reject || articles <= 1 {
            return Err(BudgetExceeded { tokens, limit: self.max_tokens });
        }

        // largest k in [1, articles) that fits
        let (mut lo, mut hi) = (0usize, articles - 1);
        let mut best: Option<(String, usize, usize)> = None;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let (p, t) = measure(mid);
            if t <= self.max_tokens {
                best = Some((p, mid, t));
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        match best {
            Some((prompt, kept, tokens)) => {
                info!("Prompt truncated to {kept}/{articles} articles ({tokens} tokens)");
                Ok(Fitted { prompt, kept, tokens })
            }
            None => {
                let (_, t) = measure(1);
                Err(BudgetExceeded { tokens: t, limit: self.max_tokens })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordCounter;
    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize { text.split_whitespace().count() }
    }

    fn budget(max: usize, policy: BudgetPolicy) -> TokenBudget {
        TokenBudget::new(max, policy, Arc::new(WordCounter))
    }

    // "head" + one word per article
    fn render(k: usize) -> String {
        let mut s = String::from("head");
        for i in 0..k { s.push_str(&format!(" a{i}")); }
        s
    }

    #[test]
    fn fitting_prompt_is_untouched() {
        let out = budget(10, BudgetPolicy::Truncate).fit("role", 3, render).unwrap();
        assert_eq!(out.kept, 3);
        assert_eq!(out.tokens, 5);
        assert_eq!(out.prompt, "head a0 a1 a2");
    }

    #[test]
    fn truncate_drops_tail_articles() {
        // role(1) + head(1) + k <= 5  =>  k = 3
        let out = budget(5, BudgetPolicy::Truncate).fit("role", 6, render).unwrap();
        assert_eq!(out.kept, 3);
        assert_eq!(out.prompt, "head a0 a1 a2");
    }

    #[test]
    fn reject_refuses_oversized_prompt() {
        let err = budget(5, BudgetPolicy::Reject).fit("role", 6, render).unwrap_err();
        assert_eq!(err, BudgetExceeded { tokens: 8, limit: 5 });
    }

    #[test]
    fn truncate_fails_when_one_article_is_too_big() {
        let err = budget(2, BudgetPolicy::Truncate).fit("role", 4, render).unwrap_err();
        assert_eq!(err.tokens, 3);
    }

    #[test]
    fn approx_counter_rounds_up() {
        assert_eq!(ApproxCounter.count(""), 0);
        assert_eq!(ApproxCounter.count("abcde"), 2);
    }
}
