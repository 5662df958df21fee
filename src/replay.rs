//! Recording analysis: structural validation plus what-if re-simulation.
//!
//! A [`Replayer`] never touches a live coordinator — it only reasons over
//! an already-exported [`Recording`], the same way the teacher's
//! validation layer reasons over a `ServiceCollection` snapshot rather
//! than a live container.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::recording::{Recording, RecordedSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub message: String,
    pub signal_name: Option<String>,
}

impl ValidationIssue {
    fn new(level: ValidationLevel, message: impl Into<String>, signal_name: Option<&str>) -> Self {
        Self { level, message: message.into(), signal_name: signal_name.map(str::to_string) }
    }
}

/// Acceptable drift, in milliseconds, between a signal's recorded
/// `durationMs` and `endMs - startMs` before it's flagged.
const DURATION_DRIFT_TOLERANCE_MS: i64 = 1;

/// Read-only analyzer over a [`Recording`].
pub struct Replayer<'a> {
    recording: &'a Recording,
}

impl<'a> Replayer<'a> {
    pub fn new(recording: &'a Recording) -> Self {
        Self { recording }
    }

    /// Runs every structural check and returns the issues found, most
    /// severe first within no particular per-signal ordering otherwise.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        self.check_configuration(&mut issues);
        self.check_count_mismatch(&mut issues);
        for signal in &self.recording.signals {
            self.check_signal_timing(signal, &mut issues);
        }
        self.check_dependency_order(&mut issues);

        issues.sort_by(|a, b| b.level.cmp(&a.level));
        issues
    }

    fn check_configuration(&self, issues: &mut Vec<ValidationIssue>) {
        let config = &self.recording.configuration;
        if config.execution_mode.is_empty() {
            issues.push(ValidationIssue::new(
                ValidationLevel::Error,
                "missing configuration: executionMode is empty",
                None,
            ));
        }
        if config.policy.is_empty() {
            issues.push(ValidationIssue::new(
                ValidationLevel::Error,
                "missing configuration: policy is empty",
                None,
            ));
        }
    }

    fn check_count_mismatch(&self, issues: &mut Vec<ValidationIssue>) {
        if self.recording.summary.total_signals != self.recording.signals.len() {
            issues.push(ValidationIssue::new(
                ValidationLevel::Error,
                format!(
                    "summary.totalSignals ({}) does not match signals.len() ({})",
                    self.recording.summary.total_signals,
                    self.recording.signals.len()
                ),
                None,
            ));
        }
    }

    fn check_signal_timing(&self, signal: &RecordedSignal, issues: &mut Vec<ValidationIssue>) {
        let start = signal.start_ms as i64;
        let end = signal.end_ms as i64;
        let duration = signal.duration_ms as i64;

        if end < start {
            issues.push(ValidationIssue::new(
                ValidationLevel::Error,
                format!("endMs ({end}) precedes startMs ({start}), implying negative duration"),
                Some(&signal.signal_name),
            ));
            return;
        }

        let observed = end - start;
        if (observed - duration).abs() > DURATION_DRIFT_TOLERANCE_MS {
            issues.push(ValidationIssue::new(
                ValidationLevel::Warning,
                format!("durationMs ({duration}) drifts from endMs-startMs ({observed})"),
                Some(&signal.signal_name),
            ));
        }
    }

    fn check_dependency_order(&self, issues: &mut Vec<ValidationIssue>) {
        let by_name: HashMap<&str, &RecordedSignal> =
            self.recording.signals.iter().map(|s| (s.signal_name.as_str(), s)).collect();

        for signal in &self.recording.signals {
            for dep in &signal.dependencies {
                let Some(parent) = by_name.get(dep.as_str()) else {
                    issues.push(ValidationIssue::new(
                        ValidationLevel::Warning,
                        format!("dependency '{dep}' not present among recorded signals"),
                        Some(&signal.signal_name),
                    ));
                    continue;
                };
                if signal.start_ms < parent.end_ms {
                    issues.push(ValidationIssue::new(
                        ValidationLevel::Error,
                        format!(
                            "'{}' started at {}ms before its dependency '{}' completed at {}ms",
                            signal.signal_name, signal.start_ms, dep, parent.end_ms
                        ),
                        Some(&signal.signal_name),
                    ));
                }
            }
        }
    }

    /// Projects what would have happened had `name` been bound to a timeout
    /// of `threshold_ms`: if its recorded duration exceeded the threshold,
    /// it is reclassified `TimedOut` and every transitive dependent is
    /// reclassified `Skipped` with `failedDependencies` populated.
    pub fn simulate_earlier_timeout(&self, name: &str, threshold_ms: u64) -> Vec<RecordedSignal> {
        let mut projected = self.recording.signals.clone();
        let Some(target) = projected.iter().position(|s| s.signal_name == name) else {
            return projected;
        };

        if projected[target].duration_ms <= threshold_ms {
            return projected;
        }

        projected[target].status = "TimedOut".to_string();
        projected[target].duration_ms = threshold_ms;
        projected[target].end_ms = projected[target].start_ms + threshold_ms;
        cascade_skip(&mut projected, name);
        projected
    }

    /// Projects what would have happened had `name` failed: reclassifies
    /// it `Failed` and cascades `Skipped` to every transitive dependent.
    pub fn simulate_failure(&self, name: &str) -> Vec<RecordedSignal> {
        let mut projected = self.recording.signals.clone();
        let Some(target) = projected.iter().position(|s| s.signal_name == name) else {
            return projected;
        };

        projected[target].status = "Failed".to_string();
        projected[target].exception_type = Some("SimulatedFailure".to_string());
        projected[target].exception_message = Some(format!("simulated failure of '{name}'"));
        cascade_skip(&mut projected, name);
        projected
    }
}

/// Marks every transitive dependent of `name` (by declared `dependencies`
/// edges) `Skipped`, recording the chain of ancestors that caused it in
/// `failedDependencies`.
fn cascade_skip(signals: &mut [RecordedSignal], name: &str) {
    let dependents: HashMap<String, Vec<String>> = {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for signal in signals.iter() {
            for dep in &signal.dependencies {
                map.entry(dep.clone()).or_default().push(signal.signal_name.clone());
            }
        }
        map
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, String)> =
        dependents.get(name).into_iter().flatten().map(|child| (child.clone(), name.to_string())).collect();

    while let Some((child, ancestor)) = queue.pop_front() {
        if let Some(signal) = signals.iter_mut().find(|s| s.signal_name == child) {
            if signal.status != "Skipped" {
                signal.status = "Skipped".to_string();
            }
            if !signal.failed_dependencies.contains(&ancestor) {
                signal.failed_dependencies.push(ancestor.clone());
            }
        }
        if seen.insert(child.clone()) {
            for grandchild in dependents.get(&child).into_iter().flatten() {
                queue.push_back((grandchild.clone(), child.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorState;
    use crate::executor::ExecutionMode;
    use crate::options::CoordinatorOptions;
    use crate::result::IgnitionResult;
    use crate::signal::SignalResult;
    use chrono::Utc;
    use std::time::Duration;

    fn recording_with_chain() -> Recording {
        let mut graph_builder = crate::graph::GraphBuilder::new();
        graph_builder.add_signal(crate::signal::Signal::new("db", |_| async { Ok(()) })).unwrap();
        graph_builder.add_signal(crate::signal::Signal::new("cache", |_| async { Ok(()) })).unwrap();
        graph_builder.depends_on("cache", &["db"]).unwrap();
        let options = CoordinatorOptions::builder(ExecutionMode::DependencyAware)
            .graph(graph_builder.build().unwrap())
            .build()
            .unwrap();

        let results = vec![
            SignalResult::succeeded("db", Duration::from_millis(20), Duration::ZERO, Duration::from_millis(20)),
            SignalResult::succeeded(
                "cache",
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ),
        ];
        let ignition = IgnitionResult { total_duration: Duration::from_millis(30), results, timed_out: false, stage_results: None };

        let mut deps = HashMap::new();
        deps.insert("cache".to_string(), vec!["db".to_string()]);

        Recording::from_ignition(&ignition, &options, CoordinatorState::Completed, "rec", Utc::now(), &deps, None)
    }

    #[test]
    fn detects_end_before_start() {
        let mut recording = recording_with_chain();
        recording.signals[0].end_ms = 0;
        recording.signals[0].start_ms = 20;

        let issues = Replayer::new(&recording).validate();
        assert!(issues.iter().any(|i| i.level == ValidationLevel::Error && i.message.contains("negative duration")));
    }

    #[test]
    fn detects_dependency_order_violation() {
        let mut recording = recording_with_chain();
        recording.signals[1].start_ms = 5;

        let issues = Replayer::new(&recording).validate();
        assert!(issues.iter().any(|i| i.level == ValidationLevel::Error && i.message.contains("before its dependency")));
    }

    #[test]
    fn detects_count_mismatch() {
        let mut recording = recording_with_chain();
        recording.summary.total_signals = 99;

        let issues = Replayer::new(&recording).validate();
        assert!(issues.iter().any(|i| i.message.contains("totalSignals")));
    }

    #[test]
    fn simulate_failure_cascades_to_dependents() {
        let recording = recording_with_chain();
        let projected = Replayer::new(&recording).simulate_failure("db");

        let cache = projected.iter().find(|s| s.signal_name == "cache").unwrap();
        assert_eq!(cache.status, "Skipped");
        assert_eq!(cache.failed_dependencies, vec!["db".to_string()]);
    }

    #[test]
    fn simulate_earlier_timeout_only_triggers_past_threshold() {
        let recording = recording_with_chain();
        let unaffected = Replayer::new(&recording).simulate_earlier_timeout("db", 1000);
        assert_eq!(unaffected.iter().find(|s| s.signal_name == "db").unwrap().status, "Succeeded");

        let affected = Replayer::new(&recording).simulate_earlier_timeout("db", 5);
        let db = affected.iter().find(|s| s.signal_name == "db").unwrap();
        assert_eq!(db.status, "TimedOut");
        let cache = affected.iter().find(|s| s.signal_name == "cache").unwrap();
        assert_eq!(cache.status, "Skipped");
    }
}
