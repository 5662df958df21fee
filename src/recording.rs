//! Deterministic JSON export of one ignition.
//!
//! A [`Recording`] is a versioned snapshot of an [`IgnitionResult`]:
//! configuration, per-signal timing, and summary counters, plus whatever
//! `metadata` the caller wants attached. `to_json`/`from_json` are the
//! stable wire codec described in the external interface contract;
//! `from_json` discards unknown fields and returns `None` on malformed
//! input rather than erroring, mirroring the teacher's tolerant-read
//! posture for versioned exports.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorState;
use crate::executor::{ExecutionMode, StagePolicy};
use crate::options::CoordinatorOptions;
use crate::policy::{BuiltinPolicy, ResolvedPolicy};
use crate::result::IgnitionResult;
use crate::signal::{SignalResult, SignalStatus};

/// Stable schema version for the recording wire format.
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfiguration {
    pub execution_mode: String,
    pub policy: String,
    pub stage_policy: String,
    pub global_timeout_ms: Option<u64>,
    pub cancel_on_global_timeout: bool,
    pub cancel_individual_on_timeout: bool,
}

impl RecordingConfiguration {
    fn from_options(options: &CoordinatorOptions) -> Self {
        let policy = match &options.policy {
            ResolvedPolicy::Builtin(BuiltinPolicy::FailFast) => "FailFast",
            ResolvedPolicy::Builtin(BuiltinPolicy::BestEffort) => "BestEffort",
            ResolvedPolicy::Builtin(BuiltinPolicy::ContinueOnTimeout) => "ContinueOnTimeout",
            ResolvedPolicy::Custom(_) => "Custom",
        };
        Self {
            execution_mode: mode_name(options.execution_mode).to_string(),
            policy: policy.to_string(),
            stage_policy: stage_policy_name(options.stage_policy).to_string(),
            global_timeout_ms: options.global_timeout.map(|d| d.as_millis() as u64),
            cancel_on_global_timeout: options.cancel_on_global_timeout,
            cancel_individual_on_timeout: options.cancel_individual_on_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSignal {
    pub signal_name: String,
    pub status: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed_dependencies: Vec<String>,
}

impl RecordedSignal {
    fn from_result(result: &SignalResult, dependencies: &HashMap<String, Vec<String>>) -> Self {
        let start_ms = result.started_at.unwrap_or(Duration::ZERO).as_millis() as u64;
        let end_ms = result.completed_at.unwrap_or(Duration::ZERO).as_millis() as u64;
        Self {
            signal_name: result.name.clone(),
            status: result.status.to_string(),
            start_ms,
            end_ms,
            duration_ms: result.duration.as_millis() as u64,
            exception_type: result.exception.as_ref().map(|_| "SignalError".to_string()),
            exception_message: result.exception.clone(),
            dependencies: dependencies.get(&result.name).cloned().unwrap_or_default(),
            failed_dependencies: result.failed_dependencies.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub total_signals: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub timed_out_count: usize,
    pub skipped_count: usize,
    pub cancelled_count: usize,
    pub slowest_signal: Option<String>,
    pub fastest_signal: Option<String>,
    pub max_concurrency: usize,
    pub average_duration_ms: u64,
}

impl RecordingSummary {
    fn from_results(results: &[SignalResult]) -> Self {
        let count = |status: SignalStatus| results.iter().filter(|r| r.status == status).count();
        let timed: Vec<&SignalResult> = results.iter().filter(|r| r.duration > Duration::ZERO).collect();
        let slowest = timed.iter().max_by_key(|r| r.duration).map(|r| r.name.clone());
        let fastest = timed.iter().min_by_key(|r| r.duration).map(|r| r.name.clone());
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let average_duration_ms =
            if results.is_empty() { 0 } else { (total_duration.as_millis() / results.len() as u128) as u64 };

        Self {
            total_signals: results.len(),
            succeeded_count: count(SignalStatus::Succeeded),
            failed_count: count(SignalStatus::Failed),
            timed_out_count: count(SignalStatus::TimedOut),
            skipped_count: count(SignalStatus::Skipped),
            cancelled_count: count(SignalStatus::Cancelled),
            slowest_signal: slowest,
            fastest_signal: fastest,
            max_concurrency: max_concurrency(results),
            average_duration_ms,
        }
    }
}

/// Counts the widest point of pairwise-overlapping `[startedAt, completedAt)`
/// intervals, the same scanline approach `Timeline::from_recording` uses to
/// assign `concurrentGroup`.
fn max_concurrency(results: &[SignalResult]) -> usize {
    let mut edges: Vec<(Duration, i32)> = Vec::with_capacity(results.len() * 2);
    for r in results {
        let start = r.started_at.unwrap_or(Duration::ZERO);
        let end = r.completed_at.unwrap_or(start);
        edges.push((start, 1));
        edges.push((end, -1));
    }
    edges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut current = 0i32;
    let mut peak = 0i32;
    for (_, delta) in edges {
        current += delta;
        peak = peak.max(current);
    }
    peak.max(0) as usize
}

/// Versioned, deterministic export of one ignition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub schema_version: String,
    pub recording_id: String,
    pub recorded_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub timed_out: bool,
    pub final_state: String,
    pub configuration: RecordingConfiguration,
    pub signals: Vec<RecordedSignal>,
    pub summary: RecordingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Recording {
    /// Builds a recording from one ignition's result and the options it
    /// ran under. `dependencies` maps a signal name to the names of its
    /// direct dependencies (empty outside `DependencyAware`).
    pub fn from_ignition(
        result: &IgnitionResult,
        options: &CoordinatorOptions,
        final_state: CoordinatorState,
        recording_id: impl Into<String>,
        recorded_at: DateTime<Utc>,
        dependencies: &HashMap<String, Vec<String>>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let signals: Vec<RecordedSignal> =
            result.results.iter().map(|r| RecordedSignal::from_result(r, dependencies)).collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            recording_id: recording_id.into(),
            recorded_at,
            total_duration_ms: result.total_duration.as_millis() as u64,
            timed_out: result.timed_out,
            final_state: state_name(final_state).to_string(),
            configuration: RecordingConfiguration::from_options(options),
            summary: RecordingSummary::from_results(&result.results),
            signals,
            metadata,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Recording always serializes")
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).expect("Recording always serializes")
    }

    /// Parses a recording, tolerating and discarding unknown fields.
    /// Returns `None` on malformed input rather than erroring.
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

fn mode_name(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Parallel => "Parallel",
        ExecutionMode::Sequential => "Sequential",
        ExecutionMode::DependencyAware => "DependencyAware",
        ExecutionMode::Staged => "Staged",
    }
}

fn stage_policy_name(policy: StagePolicy) -> &'static str {
    match policy {
        StagePolicy::AllMustSucceed => "AllMustSucceed",
        StagePolicy::BestEffort => "BestEffort",
        StagePolicy::FailFast => "FailFast",
        StagePolicy::EarlyPromotion => "EarlyPromotion",
    }
}

fn state_name(state: CoordinatorState) -> &'static str {
    match state {
        CoordinatorState::NotStarted => "NotStarted",
        CoordinatorState::Running => "Running",
        CoordinatorState::Completed => "Completed",
        CoordinatorState::Failed => "Failed",
        CoordinatorState::TimedOut => "TimedOut",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionMode as Mode;

    fn sample_result() -> IgnitionResult {
        IgnitionResult {
            total_duration: Duration::from_millis(120),
            results: vec![
                SignalResult::succeeded("db", Duration::from_millis(50), Duration::ZERO, Duration::from_millis(50)),
                SignalResult::failed(
                    "cache",
                    Duration::from_millis(30),
                    "boom".into(),
                    Duration::from_millis(10),
                    Duration::from_millis(40),
                ),
            ],
            timed_out: false,
            stage_results: None,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let options = CoordinatorOptions::builder(Mode::Parallel).build().unwrap();
        let result = sample_result();
        let recording = Recording::from_ignition(
            &result,
            &options,
            CoordinatorState::Failed,
            "rec-1",
            Utc::now(),
            &HashMap::new(),
            None,
        );

        let json = recording.to_json();
        let parsed = Recording::from_json(&json).expect("valid json round-trips");
        assert_eq!(parsed.signals.len(), 2);
        assert_eq!(parsed.summary.succeeded_count, 1);
        assert_eq!(parsed.summary.failed_count, 1);
        assert_eq!(parsed.final_state, "Failed");
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(Recording::from_json("not json").is_none());
    }

    #[test]
    fn from_json_tolerates_unknown_fields() {
        let options = CoordinatorOptions::builder(Mode::Parallel).build().unwrap();
        let recording = Recording::from_ignition(
            &sample_result(),
            &options,
            CoordinatorState::Failed,
            "rec-2",
            Utc::now(),
            &HashMap::new(),
            None,
        );
        let mut value: serde_json::Value = serde_json::from_str(&recording.to_json()).unwrap();
        value.as_object_mut().unwrap().insert("fromTheFuture".to_string(), serde_json::json!(true));
        let parsed = Recording::from_json(&value.to_string());
        assert!(parsed.is_some());
    }

    #[test]
    fn max_concurrency_counts_overlap() {
        let results = vec![
            SignalResult::succeeded("a", Duration::from_millis(10), Duration::ZERO, Duration::from_millis(10)),
            SignalResult::succeeded("b", Duration::from_millis(10), Duration::ZERO, Duration::from_millis(10)),
            SignalResult::succeeded(
                "c",
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ),
        ];
        assert_eq!(max_concurrency(&results), 2);
    }
}
