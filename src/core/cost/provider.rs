use crate::core::cost::cache::TokenCounts;
use crate::core::cost::pricing;

/// Which local logs a report is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Provider {
    #[default]
    Codex,
    Claude,
    VertexAi,
}

impl Provider {
    pub fn all() -> &'static [Provider] {
        &[Provider::Codex, Provider::Claude, Provider::VertexAi]
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            "vertex_ai" | "vertex-ai" | "vertexai" => Some(Self::VertexAi),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::VertexAi => "vertexai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude",
            Self::VertexAi => "Vertex AI",
        }
    }

    /// USD cost of one model's day counters under this provider's pricing.
    pub fn cost_usd(&self, model: &str, counts: &TokenCounts) -> Option<f64> {
        match self {
            Self::Codex => {
                pricing::codex_cost_usd(model, counts.input, counts.cached_input, counts.output)
            }
            Self::Claude | Self::VertexAi => {
                let fresh = counts
                    .input
                    .saturating_sub(counts.cached_input)
                    .saturating_sub(counts.cache_creation);
                pricing::claude_cost_usd(
                    model,
                    fresh,
                    counts.cached_input,
                    counts.cache_creation,
                    counts.output,
                )
            }
        }
    }
}

/// Which Claude log entries count, by whether they were served through
/// Vertex AI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClaudeLogFilter {
    #[default]
    All,
    VertexAiOnly,
    ExcludeVertexAi,
}

impl ClaudeLogFilter {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "vertexai-only" | "vertex-ai-only" | "vertexaionly" => Some(Self::VertexAiOnly),
            "exclude-vertexai" | "exclude-vertex-ai" | "excludevertexai" => {
                Some(Self::ExcludeVertexAi)
            }
            _ => None,
        }
    }

    /// The filter a scan for `provider` runs with. Vertex AI reports narrow
    /// `All` down to Vertex entries.
    pub fn effective_for(self, provider: Provider) -> Self {
        match (provider, self) {
            (Provider::VertexAi, Self::All) => Self::VertexAiOnly,
            _ => self,
        }
    }

    pub fn accepts(self, is_vertex: bool) -> bool {
        match self {
            Self::All => true,
            Self::VertexAiOnly => is_vertex,
            Self::ExcludeVertexAi => !is_vertex,
        }
    }

    /// Cache document id for Claude logs read through this filter.
    pub fn cache_id(self) -> &'static str {
        match self {
            Self::All => "claude",
            Self::VertexAiOnly => "vertexai",
            Self::ExcludeVertexAi => "claude-direct",
        }
    }
}
