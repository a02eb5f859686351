use base64::Engine;
use chrono::{DateTime, Datelike, Local, NaiveDate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cost::cache::{self, CacheStore, FileScanRecord, ScanCache, Sign};
use crate::core::cost::claude::parse_claude_file;
use crate::core::cost::day::{day_key_from_filename, DayRange};
use crate::core::cost::jsonl::DEFAULT_MAX_LINE_BYTES;
use crate::core::cost::parser::{parse_codex_file, CarryState, ParseResult};
use crate::core::cost::provider::{ClaudeLogFilter, Provider};
use crate::core::cost::report::build_report;
use crate::core::models::cost::DailyReport;

pub const DEFAULT_REFRESH_MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub provider: Provider,
    /// Overrides `$CODEX_HOME/sessions` / `~/.codex/sessions`.
    pub sessions_root: Option<PathBuf>,
    /// Overrides the default Claude `projects` directories.
    pub claude_projects_roots: Option<Vec<PathBuf>>,
    pub claude_log_filter: ClaudeLogFilter,
    /// Overrides the default cache directory.
    pub cache_root: Option<PathBuf>,
    pub refresh_min_interval: Duration,
    /// Discard the cache and rebuild it from scratch.
    pub force_rescan: bool,
    pub max_line_bytes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            provider: Provider::Codex,
            sessions_root: None,
            claude_projects_roots: None,
            claude_log_filter: ClaudeLogFilter::All,
            cache_root: None,
            refresh_min_interval: DEFAULT_REFRESH_MIN_INTERVAL,
            force_rescan: false,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ScanOptions {
    /// Claude filter after the provider's own narrowing.
    pub fn claude_filter(&self) -> ClaudeLogFilter {
        self.claude_log_filter.effective_for(self.provider)
    }

    /// One cache document per provider, and per Claude filter.
    pub fn cache_store(&self) -> CacheStore {
        let root = self
            .cache_root
            .clone()
            .unwrap_or_else(cache::default_cache_root);
        let id = match self.provider {
            Provider::Codex => Provider::Codex.id(),
            Provider::Claude | Provider::VertexAi => self.claude_filter().cache_id(),
        };
        CacheStore::new(&root, id)
    }
}

/// Identities already counted during one pass.
#[derive(Debug, Default)]
struct ScanState {
    seen_session_ids: HashSet<String>,
    seen_file_ids: HashSet<String>,
}

impl ScanState {
    fn mark(&mut self, session_id: Option<&String>, file_id: Option<&String>) {
        if let Some(id) = session_id {
            self.seen_session_ids.insert(id.clone());
        }
        if let Some(id) = file_id {
            self.seen_file_ids.insert(id.clone());
        }
    }

    fn session_seen(&self, session_id: Option<&String>) -> bool {
        session_id.is_some_and(|id| self.seen_session_ids.contains(id))
    }
}

/// Counts of what one pass did, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub unchanged: usize,
    pub incremental: usize,
    pub full: usize,
    pub duplicates: usize,
    pub unreadable: usize,
    pub removed: usize,
}

// ── Session file discovery ────────────────────────────────────────────

fn default_sessions_root() -> PathBuf {
    if let Ok(codex_home) = std::env::var("CODEX_HOME") {
        let trimmed = codex_home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join("sessions");
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".codex")
        .join("sessions")
}

/// The active sessions root followed by its archived sibling, if any.
pub fn sessions_roots(options: &ScanOptions) -> Vec<PathBuf> {
    let root = options
        .sessions_root
        .clone()
        .unwrap_or_else(default_sessions_root);
    let mut roots = vec![root.clone()];
    if root.file_name().and_then(|n| n.to_str()) == Some("sessions") {
        if let Some(parent) = root.parent() {
            roots.push(parent.join("archived_sessions"));
        }
    }
    roots
}

fn is_jsonl(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    !hidden
        && path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"))
}

fn read_jsonl_dir(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_jsonl(path))
        .collect()
}

/// `root/YYYY/MM/DD/*.jsonl` for every day of the padded window.
fn list_partitioned_files(root: &Path, range: &DayRange) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for date in range.scan_days() {
        let day_dir = root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()));
        files.extend(read_jsonl_dir(&day_dir));
    }
    files
}

/// `root/*.jsonl` whose name carries no date or a date inside the window.
fn list_flat_files(root: &Path, range: &DayRange) -> Vec<PathBuf> {
    read_jsonl_dir(root)
        .into_iter()
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            day_key_from_filename(name).map_or(true, |day| range.scan_contains(&day))
        })
        .collect()
}

/// Candidate files across all roots, deduplicated by path, each root in
/// path order.
pub fn list_session_files(roots: &[PathBuf], range: &DayRange) -> Vec<PathBuf> {
    collect_roots(roots, |root| {
        let mut files = list_partitioned_files(root, range);
        files.extend(list_flat_files(root, range));
        files
    })
}

fn collect_roots<F>(roots: &[PathBuf], list: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> Vec<PathBuf>,
{
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let mut root_files = list(root.as_path());
        root_files.sort();
        for path in root_files {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }
    files
}

/// `projects` directories under `~/.claude`, every `$CLAUDE_CONFIG_DIR`
/// entry (comma separated) and the platform config dir, unless overridden.
pub fn claude_projects_roots(options: &ScanOptions) -> Vec<PathBuf> {
    if let Some(roots) = &options.claude_projects_roots {
        return roots.clone();
    }
    let mut bases: Vec<PathBuf> = Vec::new();
    if let Some(home) = dirs::home_dir() {
        bases.push(home.join(".claude"));
    }
    if let Ok(config_dirs) = std::env::var("CLAUDE_CONFIG_DIR") {
        bases.extend(
            config_dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
        );
    }
    if let Some(config_home) = dirs::config_dir() {
        bases.push(config_home.join("claude"));
    }

    let mut roots: Vec<PathBuf> = Vec::new();
    for base in bases {
        let projects = base.join("projects");
        if !roots.contains(&projects) {
            roots.push(projects);
        }
    }
    roots
}

fn modified_on_or_after(path: &Path, day: NaiveDate) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).date_naive() >= day)
        .unwrap_or(true)
}

/// `root/{project}/*.jsonl` and `root/{project}/{session}/subagents/*.jsonl`
/// modified on or after the first day of the padded window.
pub fn list_claude_files(roots: &[PathBuf], range: &DayRange) -> Vec<PathBuf> {
    let Some(since) = range.scan_since.to_date() else {
        return Vec::new();
    };
    collect_roots(roots, |root| {
        let mut files = Vec::new();
        let Ok(projects) = std::fs::read_dir(root) else {
            return files;
        };
        for project in projects.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
            files.extend(read_jsonl_dir(&project));
            if let Ok(sessions) = std::fs::read_dir(&project) {
                for session in sessions.flatten() {
                    files.extend(read_jsonl_dir(&session.path().join("subagents")));
                }
            }
        }
        files.retain(|f| modified_on_or_after(f, since));
        files
    })
}

// ── File metadata ─────────────────────────────────────────────────────

fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| {
            t.duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64
        })
        .unwrap_or(0)
}

/// Stable OS identity of a file, surviving renames.
#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    let mut raw = Vec::with_capacity(16);
    raw.extend_from_slice(&meta.dev().to_le_bytes());
    raw.extend_from_slice(&meta.ino().to_le_bytes());
    Some(base64::engine::general_purpose::STANDARD.encode(raw))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<String> {
    None
}

fn record_from_parse(mtime_ms: i64, size: u64, parsed: ParseResult, session_id: Option<String>) -> FileScanRecord {
    FileScanRecord {
        mtime_ms,
        size,
        days: parsed.days,
        context_days: parsed.context_days,
        parsed_bytes: parsed.parsed_bytes,
        last_model: parsed.state.model,
        last_totals: parsed.state.totals,
        last_approval_policy: parsed.state.approval_policy,
        last_sandbox_mode: parsed.state.sandbox_mode,
        last_effort: parsed.state.effort,
        session_id,
        last_message: None,
    }
}

fn carry_state(record: &FileScanRecord) -> CarryState {
    CarryState {
        model: record.last_model.clone(),
        totals: record.last_totals,
        approval_policy: record.last_approval_policy.clone(),
        sandbox_mode: record.last_sandbox_mode.clone(),
        effort: record.last_effort.clone(),
    }
}

// ── Per-file record manager ───────────────────────────────────────────

/// An unreadable file keeps its previous record, so that record still claims
/// its session and file identity for the rest of the pass.
fn keep_unreadable(
    record: Option<&FileScanRecord>,
    file_id: Option<&String>,
    state: &mut ScanState,
    stats: &mut PassStats,
) {
    if let Some(record) = record {
        state.mark(record.session_id.as_ref(), file_id);
    }
    stats.unreadable += 1;
}

fn scan_file(
    path: &Path,
    range: &DayRange,
    cache: &mut ScanCache,
    state: &mut ScanState,
    stats: &mut PassStats,
    max_line_bytes: usize,
) {
    let key = path.to_string_lossy().to_string();
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(path = %key, error = %e, "skipping unreadable session file");
            keep_unreadable(cache.files.get(&key), None, state, stats);
            return;
        }
    };
    let mtime = mtime_ms(&meta);
    let size = meta.len();
    let file_id = file_identity(&meta);

    if file_id.as_ref().is_some_and(|id| state.seen_file_ids.contains(id)) {
        tracing::debug!(path = %key, "dropping file already counted under another path");
        cache.retract_file(&key);
        stats.duplicates += 1;
        return;
    }

    let cached = cache.files.get(&key).cloned();
    if let Some(record) = &cached {
        if state.session_seen(record.session_id.as_ref()) {
            tracing::debug!(path = %key, "dropping file for an already counted session");
            cache.retract_file(&key);
            stats.duplicates += 1;
            return;
        }
        if record.mtime_ms == mtime && record.size == size && record.session_id.is_some() {
            state.mark(record.session_id.as_ref(), file_id.as_ref());
            stats.unchanged += 1;
            return;
        }
    }

    if let Some(record) = cached.as_ref().filter(|r| r.session_id.is_some()) {
        let start = record.parsed_bytes;
        let can_resume = size > record.size
            && start > 0
            && start <= size
            && record.last_totals.is_some();
        if can_resume {
            let delta = match parse_codex_file(path, range, start, carry_state(record), max_line_bytes) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(path = %key, error = %e, "skipping unreadable session file");
                    keep_unreadable(Some(record), file_id.as_ref(), state, stats);
                    return;
                }
            };
            let session_id = delta.session_id.clone().or_else(|| record.session_id.clone());
            if state.session_seen(session_id.as_ref()) {
                tracing::debug!(path = %key, "dropping file for an already counted session");
                cache.retract_file(&key);
                stats.duplicates += 1;
                return;
            }

            cache.apply(&delta.days, &delta.context_days, Sign::Add);
            let mut days = record.days.clone();
            cache::apply_usage(&mut days, &delta.days, Sign::Add);
            let mut context_days = record.context_days.clone();
            cache::apply_context(&mut context_days, &delta.context_days, Sign::Add);

            let mut updated = record_from_parse(mtime, size, delta, session_id);
            updated.days = days;
            updated.context_days = context_days;
            state.mark(updated.session_id.as_ref(), file_id.as_ref());
            tracing::debug!(path = %key, from = start, to = updated.parsed_bytes, "resumed session file");
            cache.files.insert(key, updated);
            stats.incremental += 1;
            return;
        }
    }

    let parsed = match parse_codex_file(path, range, 0, CarryState::default(), max_line_bytes) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(path = %key, error = %e, "skipping unreadable session file");
            keep_unreadable(cached.as_ref(), file_id.as_ref(), state, stats);
            return;
        }
    };
    cache.retract_file(&key);

    let session_id = parsed
        .session_id
        .clone()
        .or_else(|| cached.and_then(|r| r.session_id));
    if state.session_seen(session_id.as_ref()) {
        tracing::debug!(path = %key, "discarding reparse of an already counted session");
        stats.duplicates += 1;
        return;
    }

    let record = record_from_parse(mtime, size, parsed, session_id);
    cache.apply(&record.days, &record.context_days, Sign::Add);
    state.mark(record.session_id.as_ref(), file_id.as_ref());
    tracing::debug!(path = %key, bytes = record.parsed_bytes, "parsed session file");
    cache.files.insert(key, record);
    stats.full += 1;
}

/// Bring `cache` up to date with `files`: skip, resume or reparse each file in
/// order, then retract every record whose path is no longer a candidate and
/// prune the aggregate to the padded window.
pub fn scan_pass(
    cache: &mut ScanCache,
    files: &[PathBuf],
    range: &DayRange,
    max_line_bytes: usize,
) -> PassStats {
    let mut state = ScanState::default();
    let mut stats = PassStats::default();

    for path in files {
        scan_file(path, range, cache, &mut state, &mut stats, max_line_bytes);
    }

    finish_pass(cache, files, range, &mut stats);
    stats
}

fn scan_claude_file(
    path: &Path,
    range: &DayRange,
    filter: ClaudeLogFilter,
    cache: &mut ScanCache,
    state: &mut ScanState,
    stats: &mut PassStats,
    max_line_bytes: usize,
) {
    let key = path.to_string_lossy().to_string();
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(path = %key, error = %e, "skipping unreadable claude log");
            keep_unreadable(None, None, state, stats);
            return;
        }
    };
    let mtime = mtime_ms(&meta);
    let size = meta.len();
    let file_id = file_identity(&meta);

    if file_id.as_ref().is_some_and(|id| state.seen_file_ids.contains(id)) {
        tracing::debug!(path = %key, "dropping file already counted under another path");
        cache.retract_file(&key);
        stats.duplicates += 1;
        return;
    }

    let cached = cache.files.get(&key).cloned();
    if let Some(record) = &cached {
        if record.mtime_ms == mtime && record.size == size {
            state.mark(None, file_id.as_ref());
            stats.unchanged += 1;
            return;
        }

        let start = record.parsed_bytes;
        if size > record.size && start > 0 && start <= size {
            let tail = match parse_claude_file(
                path,
                range,
                start,
                record.last_message.as_ref(),
                filter,
                max_line_bytes,
            ) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(path = %key, error = %e, "skipping unreadable claude log");
                    keep_unreadable(Some(record), file_id.as_ref(), state, stats);
                    return;
                }
            };

            let mut days = record.days.clone();
            if let Some(previous) = record.last_message.as_ref().filter(|_| tail.replaces_carried) {
                cache::apply_usage(&mut cache.days, &previous.usage, Sign::Retract);
                cache::apply_usage(&mut days, &previous.usage, Sign::Retract);
            }
            cache::apply_usage(&mut cache.days, &tail.days, Sign::Add);
            cache::apply_usage(&mut days, &tail.days, Sign::Add);

            state.mark(None, file_id.as_ref());
            tracing::debug!(path = %key, from = start, to = tail.parsed_bytes, "resumed claude log");
            cache.files.insert(
                key,
                FileScanRecord {
                    mtime_ms: mtime,
                    size,
                    days,
                    parsed_bytes: tail.parsed_bytes,
                    last_message: tail.last_message,
                    ..Default::default()
                },
            );
            stats.incremental += 1;
            return;
        }
    }

    let parsed = match parse_claude_file(path, range, 0, None, filter, max_line_bytes) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(path = %key, error = %e, "skipping unreadable claude log");
            keep_unreadable(cached.as_ref(), file_id.as_ref(), state, stats);
            return;
        }
    };
    cache.retract_file(&key);

    let record = FileScanRecord {
        mtime_ms: mtime,
        size,
        days: parsed.days,
        parsed_bytes: parsed.parsed_bytes,
        last_message: parsed.last_message,
        ..Default::default()
    };
    cache::apply_usage(&mut cache.days, &record.days, Sign::Add);
    state.mark(None, file_id.as_ref());
    tracing::debug!(path = %key, bytes = record.parsed_bytes, "parsed claude log");
    cache.files.insert(key, record);
    stats.full += 1;
}

/// Claude counterpart of [`scan_pass`]. Claude logs carry no session id, so
/// only file identity deduplicates.
pub fn scan_claude_pass(
    cache: &mut ScanCache,
    files: &[PathBuf],
    range: &DayRange,
    filter: ClaudeLogFilter,
    max_line_bytes: usize,
) -> PassStats {
    let mut state = ScanState::default();
    let mut stats = PassStats::default();

    for path in files {
        scan_claude_file(path, range, filter, cache, &mut state, &mut stats, max_line_bytes);
    }

    finish_pass(cache, files, range, &mut stats);
    stats
}

/// Retract every record whose path is no longer a candidate and prune the
/// aggregate to the padded window.
fn finish_pass(cache: &mut ScanCache, files: &[PathBuf], range: &DayRange, stats: &mut PassStats) {
    let in_scan: HashSet<String> = files
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    let stale: Vec<String> = cache
        .files
        .keys()
        .filter(|k| !in_scan.contains(*k))
        .cloned()
        .collect();
    for key in stale {
        cache.retract_file(&key);
        stats.removed += 1;
    }

    cache.prune(range);
}

fn should_refresh(cache: &ScanCache, now_ms: i64, options: &ScanOptions) -> bool {
    let refresh_ms = options.refresh_min_interval.as_millis() as i64;
    options.force_rescan
        || refresh_ms == 0
        || cache.last_scan_ms == 0
        || now_ms - cache.last_scan_ms > refresh_ms
}

// ── Main scan entry point ─────────────────────────────────────────────

/// Refresh the provider's cache (if due) and build the daily report for
/// `[since, until]`. Never fails: unreadable inputs degrade to fewer entries.
pub fn load_daily_report(
    since: NaiveDate,
    until: NaiveDate,
    now: DateTime<Local>,
    options: &ScanOptions,
) -> DailyReport {
    let range = DayRange::new(since, until);
    let store = options.cache_store();
    let mut cache = store.load();
    let now_ms = now.timestamp_millis();

    if should_refresh(&cache, now_ms, options) {
        if options.force_rescan {
            cache = ScanCache::default();
        }
        let (files, stats) = match options.provider {
            Provider::Codex => {
                let files = list_session_files(&sessions_roots(options), &range);
                let stats = scan_pass(&mut cache, &files, &range, options.max_line_bytes);
                (files, stats)
            }
            Provider::Claude | Provider::VertexAi => {
                let files = list_claude_files(&claude_projects_roots(options), &range);
                let stats = scan_claude_pass(
                    &mut cache,
                    &files,
                    &range,
                    options.claude_filter(),
                    options.max_line_bytes,
                );
                (files, stats)
            }
        };
        cache.last_scan_ms = now_ms;
        tracing::info!(
            provider = options.provider.id(),
            files = files.len(),
            unchanged = stats.unchanged,
            incremental = stats.incremental,
            full = stats.full,
            duplicates = stats.duplicates,
            unreadable = stats.unreadable,
            removed = stats.removed,
            "scanned session logs"
        );
        if let Err(e) = store.save(&cache) {
            tracing::warn!(error = %format!("{:#}", e), "failed to persist cost cache");
        }
    } else {
        tracing::debug!(last_scan_ms = cache.last_scan_ms, "cost cache is fresh, skipping scan");
    }

    let provider = options.provider;
    build_report(&cache, &range, |model, counts| provider.cost_usd(model, counts))
}
