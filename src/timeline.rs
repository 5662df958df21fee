//! Visualization-oriented reduction of a [`Recording`].
//!
//! `Timeline::from_recording` never re-derives timing from raw signal
//! state — it only reshapes what the `Recording` already captured, so the
//! two stay in lockstep by construction.

use serde::{Deserialize, Serialize};

use crate::recording::Recording;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub signal_name: String,
    pub status: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub concurrent_group: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBoundary {
    #[serde(rename = "type")]
    pub kind: String,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub boundaries: Vec<TimelineBoundary>,
    pub total_duration_ms: u64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<String>,
}

impl Timeline {
    pub fn from_recording(recording: &Recording) -> Self {
        let mut events: Vec<TimelineEvent> = recording
            .signals
            .iter()
            .map(|s| TimelineEvent {
                signal_name: s.signal_name.clone(),
                status: s.status.clone(),
                start_ms: s.start_ms,
                end_ms: s.end_ms,
                duration_ms: s.duration_ms,
                concurrent_group: 0,
                failed_dependencies: s.failed_dependencies.clone(),
            })
            .collect();

        assign_concurrent_groups(&mut events);

        let mut boundaries = vec![TimelineBoundary { kind: "IgnitionStart".to_string(), time_ms: 0 }];
        boundaries.push(TimelineBoundary {
            kind: "IgnitionEnd".to_string(),
            time_ms: recording.total_duration_ms,
        });
        boundaries.sort_by_key(|b| b.time_ms);

        Self {
            events,
            boundaries,
            total_duration_ms: recording.total_duration_ms,
            timed_out: recording.timed_out,
            execution_mode: Some(recording.configuration.execution_mode.clone()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Timeline always serializes")
    }

    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

/// Scans events in `startMs` order, assigning a new group each time a gap
/// opens up; a running `maxEnd` keeps the group connected even when a
/// later event doesn't overlap the very first one in the group, as long
/// as it overlaps something already inside it.
fn assign_concurrent_groups(events: &mut [TimelineEvent]) {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&i| events[i].start_ms);

    let mut group = 0usize;
    let mut max_end: Option<u64> = None;

    for idx in order {
        let event = &events[idx];
        match max_end {
            Some(end) if event.start_ms < end => {
                max_end = Some(end.max(event.end_ms));
            }
            _ => {
                if max_end.is_some() {
                    group += 1;
                }
                max_end = Some(event.end_ms);
            }
        }
        events[idx].concurrent_group = group;
    }
}
