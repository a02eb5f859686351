use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::cost::pricing;

/// Longest label kept as a cache map key, in characters.
pub const MAX_LABEL_CHARS: usize = 64;

static SKILL_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,64}$").ok());

const FORBIDDEN_SKILL_KEYWORDS: &[&str] = &[
    "forbidden",
    "must not",
    "do not",
    "never use",
    "out of scope",
    "blocked",
];

const RISKY_SKILL_KEYWORDS: &[&str] = &[
    "approval",
    "private repo",
    "private repos",
    "service role",
    "token",
    "credential",
    "install",
    "notarize",
    "release",
    "destructive",
    "network",
];

/// A trimmed, non-empty, length-capped context label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.chars().take(MAX_LABEL_CHARS).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Label {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Label::new(&raw).ok_or_else(|| "empty label".to_string())
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized model identifier, used as the per-day aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ModelName(String);

impl ModelName {
    /// Strips the `openai/` vendor prefix and folds `-codex` variants onto
    /// their base model when only the base is priced. Claude ids lose their
    /// vendor prefix and revision suffixes.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("claude") || trimmed.starts_with("anthropic.") {
            return Self(pricing::normalize_claude_model(trimmed));
        }
        let name = trimmed.strip_prefix("openai/").unwrap_or(trimmed);
        if let Some(idx) = name.find("-codex") {
            let base = &name[..idx];
            if pricing::lookup(name).is_none() && pricing::lookup(base).is_some() {
                return Self(base.to_string());
            }
        }
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModelName {
    fn from(raw: String) -> Self {
        ModelName::normalize(&raw)
    }
}

impl From<ModelName> for String {
    fn from(model: ModelName) -> Self {
        model.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Skills named in a session's instructions, split by how they are described.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillClassification {
    pub risky: BTreeMap<Label, i64>,
    pub forbidden: BTreeMap<Label, i64>,
}

impl SkillClassification {
    pub fn is_empty(&self) -> bool {
        self.risky.is_empty() && self.forbidden.is_empty()
    }
}

/// Classify the `- name: description (file: ...)` skill bullets of an
/// instructions block.
pub fn classify_skills(text: &str) -> SkillClassification {
    let mut out = SkillClassification::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if !line.starts_with("- ") || !line.contains("(file:") {
            continue;
        }
        let Some(skill) = parse_skill_name(line) else {
            continue;
        };
        let lower = line.to_lowercase();

        if FORBIDDEN_SKILL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            out.forbidden.insert(skill.clone(), 1);
        }
        if RISKY_SKILL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            out.risky.insert(skill, 1);
        }
    }

    out
}

fn parse_skill_name(line: &str) -> Option<Label> {
    let rest = line.strip_prefix("- ")?;
    let (name, _) = rest.split_once(':')?;
    let name = name.trim();
    let regex = SKILL_NAME.as_ref()?;
    if !regex.is_match(name) {
        return None;
    }
    Label::new(name)
}
