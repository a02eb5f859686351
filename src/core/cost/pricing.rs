/// Per-model token pricing in dollars per token.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub model: &'static str,
    pub input_per_token: f64,
    pub output_per_token: f64,
    pub cache_read_per_token: f64,
    pub cache_create_per_token: f64,
}

/// All known model pricing entries.
static PRICING_TABLE: &[ModelPricing] = &[
    ModelPricing {
        model: "claude-haiku-4-5",
        input_per_token: 1e-6,
        output_per_token: 5e-6,
        cache_read_per_token: 1e-7,
        cache_create_per_token: 1.25e-6,
    },
    ModelPricing {
        model: "claude-sonnet-4-5",
        input_per_token: 3e-6,
        output_per_token: 1.5e-5,
        cache_read_per_token: 3e-7,
        cache_create_per_token: 3.75e-6,
    },
    ModelPricing {
        model: "claude-sonnet-4",
        input_per_token: 3e-6,
        output_per_token: 1.5e-5,
        cache_read_per_token: 3e-7,
        cache_create_per_token: 3.75e-6,
    },
    ModelPricing {
        model: "claude-opus-4-5",
        input_per_token: 5e-6,
        output_per_token: 2.5e-5,
        cache_read_per_token: 5e-7,
        cache_create_per_token: 6.25e-6,
    },
    ModelPricing {
        model: "claude-opus-4-6",
        input_per_token: 5e-6,
        output_per_token: 2.5e-5,
        cache_read_per_token: 5e-7,
        cache_create_per_token: 6.25e-6,
    },
    ModelPricing {
        model: "claude-opus-4",
        input_per_token: 1.5e-5,
        output_per_token: 7.5e-5,
        cache_read_per_token: 1.5e-6,
        cache_create_per_token: 1.875e-5,
    },
    ModelPricing {
        model: "gpt-4.1",
        input_per_token: 2e-6,
        output_per_token: 8e-6,
        cache_read_per_token: 5e-7,
        cache_create_per_token: 2e-6,
    },
    ModelPricing {
        model: "gpt-5",
        input_per_token: 1.25e-6,
        output_per_token: 1e-5,
        cache_read_per_token: 1.25e-7,
        cache_create_per_token: 1.25e-6,
    },
    ModelPricing {
        model: "gpt-5-codex",
        input_per_token: 1.25e-6,
        output_per_token: 1e-5,
        cache_read_per_token: 1.25e-7,
        cache_create_per_token: 1.25e-6,
    },
    ModelPricing {
        model: "gpt-5-mini",
        input_per_token: 2.5e-7,
        output_per_token: 2e-6,
        cache_read_per_token: 2.5e-8,
        cache_create_per_token: 2.5e-7,
    },
    ModelPricing {
        model: "gpt-5-nano",
        input_per_token: 5e-8,
        output_per_token: 4e-7,
        cache_read_per_token: 5e-9,
        cache_create_per_token: 5e-8,
    },
    ModelPricing {
        model: "gpt-5.1",
        input_per_token: 1.25e-6,
        output_per_token: 1e-5,
        cache_read_per_token: 1.25e-7,
        cache_create_per_token: 1.25e-6,
    },
    ModelPricing {
        model: "gpt-5.1-codex",
        input_per_token: 1.25e-6,
        output_per_token: 1e-5,
        cache_read_per_token: 1.25e-7,
        cache_create_per_token: 1.25e-6,
    },
    ModelPricing {
        model: "gpt-5.2",
        input_per_token: 1.75e-6,
        output_per_token: 1.4e-5,
        cache_read_per_token: 1.75e-7,
        cache_create_per_token: 1.75e-6,
    },
    ModelPricing {
        model: "gpt-5.2-codex",
        input_per_token: 1.75e-6,
        output_per_token: 1.4e-5,
        cache_read_per_token: 1.75e-7,
        cache_create_per_token: 1.75e-6,
    },
    ModelPricing {
        model: "gpt-5.3-codex",
        input_per_token: 1.75e-6,
        output_per_token: 1.4e-5,
        cache_read_per_token: 1.75e-7,
        cache_create_per_token: 1.75e-6,
    },
];

/// Look up pricing for an already-normalized model name. Returns None if unknown.
pub fn lookup(model: &str) -> Option<&'static ModelPricing> {
    PRICING_TABLE.iter().find(|p| p.model == model)
}

/// USD cost of one day's usage of `model`. Cached input is billed at the
/// cache-read rate and never exceeds the input count.
pub fn codex_cost_usd(
    model: &str,
    input_tokens: u64,
    cached_input_tokens: u64,
    output_tokens: u64,
) -> Option<f64> {
    let model = model.trim();
    let pricing = lookup(model.strip_prefix("openai/").unwrap_or(model))?;
    let cached = cached_input_tokens.min(input_tokens);
    let non_cached = input_tokens - cached;
    Some(
        non_cached as f64 * pricing.input_per_token
            + cached as f64 * pricing.cache_read_per_token
            + output_tokens as f64 * pricing.output_per_token,
    )
}

/// Canonical Claude model id: drops the `anthropic.` prefix, Bedrock/Vertex
/// revision suffixes (`:0`, `@20250929`, `-v2`) and a trailing release date.
pub fn normalize_claude_model(model: &str) -> String {
    let mut name = model.trim();
    name = name.strip_prefix("anthropic.").unwrap_or(name);
    if let Some(idx) = name.find(':') {
        name = &name[..idx];
    }
    if let Some(idx) = name.find('@') {
        name = &name[..idx];
    }
    if let Some(idx) = name.rfind("-v") {
        let digits = &name[idx + 2..];
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            name = &name[..idx];
        }
    }
    if let Some((base, date)) = name.rsplit_once('-') {
        if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
            name = base;
        }
    }
    name.to_string()
}

/// USD cost of one day's Claude usage. `input_tokens` excludes both cache
/// counters, which are billed at their own rates.
pub fn claude_cost_usd(
    model: &str,
    input_tokens: u64,
    cache_read_tokens: u64,
    cache_creation_tokens: u64,
    output_tokens: u64,
) -> Option<f64> {
    let pricing = lookup(&normalize_claude_model(model))?;
    Some(
        input_tokens as f64 * pricing.input_per_token
            + cache_read_tokens as f64 * pricing.cache_read_per_token
            + cache_creation_tokens as f64 * pricing.cache_create_per_token
            + output_tokens as f64 * pricing.output_per_token,
    )
}
