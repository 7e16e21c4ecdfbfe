//! Slider state tracker - change detection across device reports
//!
//! Keeps the last-known percentage of every slider and turns each new line into
//! the minimal set of move events.
//!
//! ## Rules
//! - A line whose slider count differs from the recorded count reports every
//!   slider (this is also how a reload forces a full resend: it clears the count).
//! - Otherwise a slider is reported when it moved by more than the tolerance.
//! - The latest reading is always stored, reported or not.
//! - A malformed line leaves the state untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SliderLine, SliderMoveEvent, DEFAULT_SEPARATOR};
use crate::error::MalformedLineError;
use crate::reload::ReloadEpoch;

const EDGE_EPSILON: f32 = 1e-6;

/// Jitter suppression presets, in percent points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseReduction {
    Low,
    #[default]
    Default,
    High,
}

impl NoiseReduction {
    pub fn tolerance(self) -> f32 {
        match self {
            NoiseReduction::Low => 1.5,
            NoiseReduction::Default => 2.5,
            NoiseReduction::High => 3.5,
        }
    }
}

/// How raw readings become percentages and what counts as a move
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Field delimiter
    pub separator: String,
    /// Raw reading that maps to 100%
    pub full_scale: f32,
    /// Report `100 - percent`
    pub invert: bool,
    /// Minimum delta (percent points) to report a move
    pub tolerance: f32,
    /// Always report a slider landing exactly on 0% or 100%
    pub snap_to_edges: bool,
}

impl TrackerSettings {
    /// Convert a raw reading to a percentage rounded to hundredths
    pub fn to_percent(&self, raw: f32) -> f32 {
        let percent = (raw * 100.0 / self.full_scale).clamp(0.0, 100.0);
        let percent = (percent * 100.0).round() / 100.0;
        if self.invert {
            100.0 - percent
        } else {
            percent
        }
    }

    fn significantly_different(&self, old: f32, new: f32) -> bool {
        if self.snap_to_edges {
            let at_edge = |v: f32, edge: f32| (v - edge).abs() < EDGE_EPSILON;
            if (at_edge(new, 0.0) && !at_edge(old, 0.0))
                || (at_edge(new, 100.0) && !at_edge(old, 100.0))
            {
                return true;
            }
        }
        (new - old).abs() > self.tolerance
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            full_scale: 100.0,
            invert: false,
            tolerance: NoiseReduction::default().tolerance(),
            snap_to_edges: true,
        }
    }
}

/// Last-known slider percentages.
///
/// Owned by the controller loop; nothing else mutates it. Resets requested by
/// the reload coordinator are picked up at the start of the next `diff`.
pub struct SliderStateTracker {
    settings: TrackerSettings,
    /// One entry per slider; empty means the count is unknown
    values: Vec<f32>,
    reload: Arc<ReloadEpoch>,
}

impl SliderStateTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self::with_reload_epoch(settings, Arc::new(ReloadEpoch::new()))
    }

    pub fn with_reload_epoch(settings: TrackerSettings, reload: Arc<ReloadEpoch>) -> Self {
        Self {
            settings,
            values: Vec::new(),
            reload,
        }
    }

    /// Number of sliders in the last accepted line (0 if unknown)
    pub fn slider_count(&self) -> usize {
        self.values.len()
    }

    /// Last stored percentages, by slider index
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Forget the recorded slider count so the next line resends every slider
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Decode `raw` and return the sliders that moved, in ascending index order
    pub fn diff(&mut self, raw: &str) -> Result<Vec<SliderMoveEvent>, MalformedLineError> {
        if self.reload.take_reset() {
            debug!("Applying reload reset ({} sliders forgotten)", self.values.len());
            self.reset();
        }

        let line = SliderLine::parse(raw, &self.settings.separator)?;
        let percents: Vec<f32> = line
            .readings()
            .iter()
            .map(|&raw| self.settings.to_percent(raw))
            .collect();

        if percents.len() != self.values.len() {
            debug!(
                "Slider count changed {} -> {}, reporting all",
                self.values.len(),
                percents.len()
            );
            self.values = percents;
            return Ok(self
                .values
                .iter()
                .enumerate()
                .map(|(slider_index, &percent_value)| SliderMoveEvent {
                    slider_index,
                    percent_value,
                })
                .collect());
        }

        let mut events = Vec::new();
        for (slider_index, (stored, new)) in self.values.iter_mut().zip(percents).enumerate() {
            if self.settings.significantly_different(*stored, new) {
                events.push(SliderMoveEvent {
                    slider_index,
                    percent_value: new,
                });
            }
            *stored = new;
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tracker_with_tolerance(tolerance: f32) -> SliderStateTracker {
        SliderStateTracker::new(TrackerSettings {
            tolerance,
            ..TrackerSettings::default()
        })
    }

    fn event(slider_index: usize, percent_value: f32) -> SliderMoveEvent {
        SliderMoveEvent {
            slider_index,
            percent_value,
        }
    }

    #[test]
    fn test_first_report_emits_every_slider() {
        let mut tracker = tracker_with_tolerance(3.0);
        let events = tracker.diff("100|50|0").unwrap();
        assert_eq!(events, vec![event(0, 100.0), event(1, 50.0), event(2, 0.0)]);
        assert_eq!(tracker.slider_count(), 3);
    }

    #[test]
    fn test_small_move_within_tolerance() {
        let mut tracker = tracker_with_tolerance(3.0);
        tracker.diff("100|50|0").unwrap();
        assert!(tracker.diff("100|52|0").unwrap().is_empty());
    }

    #[test]
    fn test_small_move_beyond_tolerance() {
        let mut tracker = tracker_with_tolerance(1.0);
        tracker.diff("100|50|0").unwrap();
        assert_eq!(tracker.diff("100|52|0").unwrap(), vec![event(1, 52.0)]);
    }

    #[test]
    fn test_identical_lines_emit_nothing() {
        let mut tracker = tracker_with_tolerance(0.0);
        tracker.diff("10|20|30|40").unwrap();
        assert!(tracker.diff("10|20|30|40").unwrap().is_empty());
        assert!(tracker.diff("10|20|30|40\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_stored_value_updates_without_event() {
        let mut tracker = tracker_with_tolerance(3.0);
        tracker.diff("50").unwrap();

        // 52 is within tolerance but still becomes the new baseline
        assert!(tracker.diff("52").unwrap().is_empty());
        assert_eq!(tracker.values(), &[52.0]);

        // 54 is only 2 away from the stored 52
        assert!(tracker.diff("54").unwrap().is_empty());
        assert_eq!(tracker.diff("58").unwrap(), vec![event(0, 58.0)]);
    }

    #[test]
    fn test_slider_count_change_resends_all() {
        let mut tracker = tracker_with_tolerance(3.0);
        tracker.diff("10|20").unwrap();
        let events = tracker.diff("10|20|30").unwrap();
        assert_eq!(events, vec![event(0, 10.0), event(1, 20.0), event(2, 30.0)]);
    }

    #[test]
    fn test_malformed_line_keeps_state() {
        let mut tracker = tracker_with_tolerance(1.0);
        tracker.diff("10|20|30").unwrap();

        let err = tracker.diff("10|x|30").unwrap_err();
        assert!(matches!(err, MalformedLineError::InvalidField { index: 1, .. }));
        assert_eq!(tracker.values(), &[10.0, 20.0, 30.0]);

        assert_eq!(tracker.diff(""), Err(MalformedLineError::Empty));
        assert!(tracker.diff("10|20|30").unwrap().is_empty());
    }

    #[test]
    fn test_reset_forces_full_resend() {
        let mut tracker = tracker_with_tolerance(3.0);
        tracker.diff("100|50|0").unwrap();
        tracker.reset();
        assert_eq!(tracker.slider_count(), 0);
        assert_eq!(tracker.diff("100|50|0").unwrap().len(), 3);
    }

    #[test]
    fn test_reload_epoch_reset_applied_on_next_line() {
        let epoch = Arc::new(ReloadEpoch::new());
        let mut tracker =
            SliderStateTracker::with_reload_epoch(TrackerSettings::default(), Arc::clone(&epoch));
        tracker.diff("100|50|0").unwrap();

        let gen = epoch.begin_reload();
        assert!(epoch.fire(gen));

        assert_eq!(tracker.diff("100|50|0").unwrap().len(), 3);
        // Reset consumed; back to normal diffing
        assert!(tracker.diff("100|50|0").unwrap().is_empty());
    }

    #[test]
    fn test_full_scale_and_invert() {
        let mut tracker = SliderStateTracker::new(TrackerSettings {
            full_scale: 1023.0,
            invert: true,
            ..TrackerSettings::default()
        });
        let events = tracker.diff("1023|0").unwrap();
        assert_eq!(events, vec![event(0, 0.0), event(1, 100.0)]);
    }

    #[test]
    fn test_readings_above_full_scale_are_clamped() {
        let mut tracker = tracker_with_tolerance(1.0);
        assert_eq!(tracker.diff("150").unwrap(), vec![event(0, 100.0)]);
    }

    #[test]
    fn test_snap_to_edges() {
        let mut tracker = tracker_with_tolerance(3.0);
        tracker.diff("99|1").unwrap();
        assert_eq!(
            tracker.diff("100|0").unwrap(),
            vec![event(0, 100.0), event(1, 0.0)]
        );

        let mut tracker = SliderStateTracker::new(TrackerSettings {
            tolerance: 3.0,
            snap_to_edges: false,
            ..TrackerSettings::default()
        });
        tracker.diff("99|1").unwrap();
        assert!(tracker.diff("100|0").unwrap().is_empty());
    }

    #[test]
    fn test_noise_reduction_presets() {
        assert_eq!(NoiseReduction::Low.tolerance(), 1.5);
        assert_eq!(NoiseReduction::Default.tolerance(), 2.5);
        assert_eq!(NoiseReduction::High.tolerance(), 3.5);
    }

    proptest! {
        #[test]
        fn prop_first_line_reports_each_field_in_order(
            readings in proptest::collection::vec(0u32..=100, 1..16)
        ) {
            let mut tracker = tracker_with_tolerance(2.5);
            let line = readings.iter().map(u32::to_string).collect::<Vec<_>>().join("|");
            let events = tracker.diff(&line).unwrap();

            prop_assert_eq!(events.len(), readings.len());
            for (i, ev) in events.iter().enumerate() {
                prop_assert_eq!(ev.slider_index, i);
                prop_assert_eq!(ev.percent_value, readings[i] as f32);
            }
        }

        #[test]
        fn prop_repeated_line_reports_nothing(
            readings in proptest::collection::vec(0u32..=1023, 1..16)
        ) {
            let mut tracker = SliderStateTracker::new(TrackerSettings {
                full_scale: 1023.0,
                tolerance: 0.0,
                ..TrackerSettings::default()
            });
            let line = readings.iter().map(u32::to_string).collect::<Vec<_>>().join("|");
            tracker.diff(&line).unwrap();
            prop_assert!(tracker.diff(&line).unwrap().is_empty());
        }
    }
}
