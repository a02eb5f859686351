use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::cost::day::{DayKey, DayRange};
use crate::core::cost::labels::{Label, ModelName};

pub const CACHE_VERSION: u64 = 1;

/// Whether a contribution is being added to or retracted from an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Add,
    Retract,
}

impl Sign {
    fn apply(self, base: i64, value: i64) -> i64 {
        match self {
            Sign::Add => base.saturating_add(value.max(0)),
            Sign::Retract => base.saturating_sub(value.max(0)),
        }
    }
}

/// Token counters for one event or one aggregate. Packed as
/// `[input, cached_input, output, reasoning_output]` on disk, with a fifth
/// `cache_creation` slot only when it is non-zero.
///
/// `input` is the whole prompt: `cached_input` and `cache_creation` are
/// subsets of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct TokenCounts {
    pub input: u64,
    pub cached_input: u64,
    pub output: u64,
    pub reasoning_output: u64,
    pub cache_creation: u64,
}

impl TokenCounts {
    pub fn is_zero(&self) -> bool {
        self.input == 0
            && self.cached_input == 0
            && self.output == 0
            && self.reasoning_output == 0
            && self.cache_creation == 0
    }

    /// Elementwise add or retract, floored at zero.
    pub fn combine(self, other: TokenCounts, sign: Sign) -> TokenCounts {
        let op = |a: u64, b: u64| match sign {
            Sign::Add => a.saturating_add(b),
            Sign::Retract => a.saturating_sub(b),
        };
        TokenCounts {
            input: op(self.input, other.input),
            cached_input: op(self.cached_input, other.cached_input),
            output: op(self.output, other.output),
            reasoning_output: op(self.reasoning_output, other.reasoning_output),
            cache_creation: op(self.cache_creation, other.cache_creation),
        }
    }
}

impl From<Vec<u64>> for TokenCounts {
    fn from(packed: Vec<u64>) -> Self {
        let at = |i: usize| packed.get(i).copied().unwrap_or(0);
        Self {
            input: at(0),
            cached_input: at(1),
            output: at(2),
            reasoning_output: at(3),
            cache_creation: at(4),
        }
    }
}

impl From<TokenCounts> for Vec<u64> {
    fn from(c: TokenCounts) -> Self {
        let mut packed = vec![c.input, c.cached_input, c.output, c.reasoning_output];
        if c.cache_creation > 0 {
            packed.push(c.cache_creation);
        }
        packed
    }
}

/// day -> model -> counters
pub type DayUsage = BTreeMap<DayKey, BTreeMap<ModelName, TokenCounts>>;

/// day -> context counters
pub type ContextDays = BTreeMap<DayKey, ContextDay>;

pub type CountMap = BTreeMap<Label, i64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextDay {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub approval_policies: CountMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sandbox_modes: CountMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub effort_levels: CountMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub risky_skills: CountMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub forbidden_skills: CountMap,
}

impl ContextDay {
    pub fn is_empty(&self) -> bool {
        self.approval_policies.is_empty()
            && self.sandbox_modes.is_empty()
            && self.effort_levels.is_empty()
            && self.risky_skills.is_empty()
            && self.forbidden_skills.is_empty()
    }

    fn combine(&mut self, other: &ContextDay, sign: Sign) {
        merge_count_map(&mut self.approval_policies, &other.approval_policies, sign);
        merge_count_map(&mut self.sandbox_modes, &other.sandbox_modes, sign);
        merge_count_map(&mut self.effort_levels, &other.effort_levels, sign);
        merge_count_map(&mut self.risky_skills, &other.risky_skills, sign);
        merge_count_map(&mut self.forbidden_skills, &other.forbidden_skills, sign);
    }
}

/// Per-file resumption state and the slice of the aggregate this file owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileScanRecord {
    pub mtime_ms: i64,
    pub size: u64,
    #[serde(default)]
    pub days: DayUsage,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context_days: ContextDays,
    #[serde(default)]
    pub parsed_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_totals: Option<TokenCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_approval_policy: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sandbox_mode: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_effort: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<StreamedMessage>,
}

/// The last keyed message of a Claude log and what it contributed. More
/// chunks of it may still be appended, and they replace this usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamedMessage {
    pub key: String,
    #[serde(default)]
    pub usage: DayUsage,
}

/// The persisted aggregate for one provider. `days` and `context_days` are
/// always the sum of the matching fields over every record in `files`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCache {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_scan_ms: i64,
    #[serde(default)]
    pub files: BTreeMap<String, FileScanRecord>,
    #[serde(default)]
    pub days: DayUsage,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context_days: ContextDays,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            last_scan_ms: 0,
            files: BTreeMap::new(),
            days: BTreeMap::new(),
            context_days: BTreeMap::new(),
        }
    }
}

impl ScanCache {
    /// Add or retract a usage/context contribution on the aggregate.
    pub fn apply(&mut self, days: &DayUsage, context_days: &ContextDays, sign: Sign) {
        apply_usage(&mut self.days, days, sign);
        apply_context(&mut self.context_days, context_days, sign);
    }

    /// Remove a file's record together with its contribution.
    pub fn retract_file(&mut self, path: &str) -> Option<FileScanRecord> {
        let record = self.files.remove(path)?;
        self.apply(&record.days, &record.context_days, Sign::Retract);
        Some(record)
    }

    /// Drop aggregate days outside the padded scan window.
    pub fn prune(&mut self, range: &DayRange) {
        self.days.retain(|day, _| range.scan_contains(day));
        self.context_days.retain(|day, _| range.scan_contains(day));
    }

    /// Recompute the aggregate from the file records.
    pub fn recomputed(&self) -> (DayUsage, ContextDays) {
        let mut days = DayUsage::new();
        let mut context_days = ContextDays::new();
        for record in self.files.values() {
            apply_usage(&mut days, &record.days, Sign::Add);
            apply_context(&mut context_days, &record.context_days, Sign::Add);
        }
        (days, context_days)
    }
}

/// Merge `delta` into `target`, dropping all-zero models and empty days.
pub fn apply_usage(target: &mut DayUsage, delta: &DayUsage, sign: Sign) {
    for (day, models) in delta {
        let day_models = target.entry(day.clone()).or_default();
        for (model, counts) in models {
            let merged = day_models
                .get(model)
                .copied()
                .unwrap_or_default()
                .combine(*counts, sign);
            if merged.is_zero() {
                day_models.remove(model);
            } else {
                day_models.insert(model.clone(), merged);
            }
        }
        if day_models.is_empty() {
            target.remove(day);
        }
    }
}

/// Merge `delta` into `target`, dropping non-positive counts and empty days.
pub fn apply_context(target: &mut ContextDays, delta: &ContextDays, sign: Sign) {
    for (day, next) in delta {
        let merged = target.entry(day.clone()).or_default();
        merged.combine(next, sign);
        if merged.is_empty() {
            target.remove(day);
        }
    }
}

fn merge_count_map(base: &mut CountMap, delta: &CountMap, sign: Sign) {
    for (key, value) in delta {
        let next = sign.apply(base.get(key).copied().unwrap_or(0), *value);
        if next <= 0 {
            base.remove(key);
        } else {
            base.insert(key.clone(), next);
        }
    }
}

/// Default cache root, respecting XDG_CACHE_HOME.
pub fn default_cache_root() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".cache")
        })
        .join("aic")
}

/// Handle on one provider's persisted cache document.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(root: &Path, provider_id: &str) -> Self {
        Self {
            path: root
                .join("cost-usage")
                .join(format!("{}-v{}.json", provider_id, CACHE_VERSION)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, or an empty one if it is missing, corrupt or from
    /// another schema version.
    pub fn load(&self) -> ScanCache {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(_) => return ScanCache::default(),
        };
        match serde_json::from_slice::<ScanCache>(&content) {
            Ok(cache) if cache.version == CACHE_VERSION => cache,
            Ok(cache) => {
                tracing::debug!(
                    path = %self.path.display(),
                    version = cache.version,
                    "discarding cache with unknown schema version"
                );
                ScanCache::default()
            }
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "discarding unreadable cache");
                ScanCache::default()
            }
        }
    }

    /// Write the cache to a temp file beside the target, then rename it into
    /// place. The previous document survives any failure.
    pub fn save(&self, cache: &ScanCache) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Cache path has no parent directory")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

        let json = serde_json::to_vec(cache).context("Failed to serialize scan cache")?;
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp = dir.join(format!(".tmp-{}-{}.json", std::process::id(), nanos));

        let written = std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))
            .and_then(|_| {
                std::fs::rename(&tmp, &self.path)
                    .with_context(|| format!("Failed to replace {}", self.path.display()))
            });
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        written
    }

    /// Delete the cache document. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove {}", self.path.display()))
            }
        }
    }
}
