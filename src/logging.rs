//! Structured JSON-lines logging for the mechanism core.
//!
//! Every record carries a run id, a sequence number and a domain so that a
//! rewards ledger or alerting host can replay which inputs produced which
//! tier, slash or routing decision. Records go to stdout; when `LOG_DIR` is
//! set they are also appended under `$LOG_DIR/<run_id>/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::boundary::TierBoundaries;
use crate::oracle::CrisisDetectionResult;
use crate::router::RoutingDecision;
use crate::slashing::SlashOutcome;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Tier,     // Boundary solving, tier assignment
    Reward,   // IC reward integration
    Slash,    // Overclaim penalties, credibility
    Spread,   // Crisis spread decomposition
    Oracle,   // Crisis detection, stabilization
    Route,    // Order-flow allocation
    Snapshot, // Distribution/boundary publication
    System,   // Startup, shutdown
    Profile,  // Timing
    Audit,    // Input/output hashes for recomputation
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Tier => "tier",
            Domain::Reward => "reward",
            Domain::Slash => "slash",
            Domain::Spread => "spread",
            Domain::Oracle => "oracle",
            Domain::Route => "route",
            Domain::Snapshot => "snapshot",
            Domain::System => "system",
            Domain::Profile => "profile",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunSinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    sinks: Option<RunSinks>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let sinks = std::env::var("LOG_DIR").ok().and_then(|base| open_sinks(&base, &run_id));
        RunContext { run_id, sinks }
    })
}

fn open_sinks(base: &str, run_id: &str) -> Option<RunSinks> {
    let mut run_dir = PathBuf::from(base);
    run_dir.push(run_id);
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return None;
    }
    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );
    let events = File::create(run_dir.join("events.jsonl"))
        .map_err(|err| eprintln!("[log] failed to create events log: {}", err))
        .ok()?;
    let trace = File::create(run_dir.join("trace.jsonl"))
        .map_err(|err| eprintln!("[log] failed to create trace log: {}", err))
        .ok()?;
    Some(RunSinks {
        events: Mutex::new(BufWriter::new(events)),
        trace: Mutex::new(BufWriter::new(trace)),
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["market_maker_id", "epoch", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if let Some(sinks) = &ctx.sinks {
        match level {
            Level::Trace | Level::Debug => write_line(&sinks.trace, &line),
            _ => write_line(&sinks.events, &line),
        }
    }
    println!("{}", line);
}

// =============================================================================
// Audit Trail
// =============================================================================

/// SHA-256 hex digest of a serializable value (canonical serde_json form).
pub fn hash_json<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Log an audit entry so a verifier can recompute `output` from `input`.
pub fn log_audit(event_type: &str, params_hash: &str, input_hash: &str, output_hash: &str) {
    log(
        Level::Info,
        Domain::Audit,
        event_type,
        obj(&[
            ("params_hash", v_str(params_hash)),
            ("input_hash", v_str(input_hash)),
            ("output_hash", v_str(output_hash)),
        ]),
    );
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_boundaries(boundaries: &TierBoundaries, iterations: (u32, u32)) {
    log(
        Level::Info,
        Domain::Tier,
        "boundaries_solved",
        obj(&[
            ("epoch", json!(boundaries.epoch)),
            ("upper_root", v_num(boundaries.upper_root)),
            ("lower_root", v_num(boundaries.lower_root)),
            ("gap_width", v_num(boundaries.gap_width)),
            ("upper_iterations", json!(iterations.0)),
            ("lower_iterations", json!(iterations.1)),
        ]),
    );
}

pub fn log_tier_decision(market_maker_id: &str, score: f64, decision: &str) {
    log(
        Level::Debug,
        Domain::Tier,
        "tier_decision",
        obj(&[
            ("market_maker_id", v_str(market_maker_id)),
            ("score", v_num(score)),
            ("decision", v_str(decision)),
        ]),
    );
}

pub fn log_crisis(result: &CrisisDetectionResult) {
    let level = if result.is_crisis { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Oracle,
        "crisis_check",
        obj(&[
            ("is_crisis", json!(result.is_crisis)),
            ("trigger", v_str(result.trigger_type.as_str())),
            ("volatility_bps", json!(result.volatility_bps)),
            ("liquidity_remaining_bps", json!(result.liquidity_remaining_bps)),
            ("avg_spread_bps", json!(result.avg_spread_bps)),
            ("observed_ts", json!(result.timestamp)),
        ]),
    );
}

pub fn log_slash(market_maker_id: &str, outcome: &SlashOutcome) {
    let level = if outcome.slash_amount > 0.0 { Level::Info } else { Level::Debug };
    log(
        level,
        Domain::Slash,
        "slash",
        obj(&[
            ("market_maker_id", v_str(market_maker_id)),
            ("slash_amount", v_num(outcome.slash_amount)),
            ("overclaim", v_num(outcome.overclaim)),
            ("msg", v_str(&outcome.justification())),
        ]),
    );
}

pub fn log_routing(order_quantity: u64, is_crisis: bool, decisions: &[RoutingDecision]) {
    let allocated: u64 = decisions.iter().map(|d| d.allocated_quantity).sum();
    log(
        Level::Debug,
        Domain::Route,
        "routed",
        obj(&[
            ("order_quantity", json!(order_quantity)),
            ("is_crisis", json!(is_crisis)),
            ("decisions", json!(decisions.len())),
            ("allocated", json!(allocated)),
            ("undistributed", json!(order_quantity.saturating_sub(allocated))),
        ]),
    );
}

pub fn log_session_summary(duration_ms: u64, evaluations: u64, crises: u64, slashes: u64) {
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("duration_ms", json!(duration_ms)),
            ("evaluations", json!(evaluations)),
            ("crises", json!(crises)),
            ("slashes", json!(slashes)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Short stable hash of a parameter string.
pub fn params_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed time on drop, sampled by `PROFILE_SAMPLE` (0.0..=1.0).
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(false)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_params_hash_deterministic() {
        assert_eq!(params_hash("lambda=0.5"), params_hash("lambda=0.5"));
        assert_ne!(params_hash("lambda=0.5"), params_hash("lambda=0.6"));
        assert_eq!(params_hash("x").len(), 16);
    }

    #[test]
    fn test_hash_json_is_content_addressed() {
        let a = hash_json(&json!({"score": 90.0}));
        let b = hash_json(&json!({"score": 90.0}));
        let c = hash_json(&json!({"score": 91.0}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_split_fields_lifts_identity_keys() {
        let (top, data) = split_fields(obj(&[
            ("market_maker_id", v_str("mm-1")),
            ("slash_amount", v_num(0.1)),
        ]));
        assert!(top.contains_key("market_maker_id"));
        assert!(data.contains_key("slash_amount"));
        assert!(!data.contains_key("market_maker_id"));
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
