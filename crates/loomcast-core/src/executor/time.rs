// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `TimeDerive` resolution and scrub detection (spec.md §4.9, §4.11).

use crate::graph::TimeModel;

/// One frame's resolved canonical time values, ready to write into the
/// slots pass 3 allocated.
#[derive(Clone, Copy, Debug)]
pub struct TimeDeriveOutput {
    /// The frame's raw input, unchanged.
    pub t_abs_ms: f64,
    /// Time after `TimeModel` resolution.
    pub t_model_ms: f64,
    /// Present only for `Finite`.
    pub progress01: Option<f64>,
    /// Present only for `Finite`.
    pub end_event: Option<bool>,
}

/// Tracks the previous frame's time, both to derive `endEvent` and to detect
/// a scrub (an out-of-order `tAbsMs`) for `StateStore::scrub` (spec.md §4.11,
/// §4.13).
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeState {
    prev_t_abs_ms: Option<f64>,
    prev_progress01: f64,
}

impl TimeState {
    /// A fresh, uninitialized time state (no prior frame).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `t_abs_ms` moves backward relative to the last frame. The
    /// first frame is never a scrub.
    #[must_use]
    pub fn is_scrub(&self, t_abs_ms: f64) -> bool {
        self.prev_t_abs_ms.is_some_and(|prev| t_abs_ms < prev)
    }

    /// Resolves this frame's canonical time values against `time_model`,
    /// then advances `self` for the next frame's scrub/`endEvent` checks
    /// (spec.md §4.11).
    pub fn resolve(&mut self, time_model: TimeModel, t_abs_ms: f64) -> TimeDeriveOutput {
        let out = match time_model {
            TimeModel::Finite { duration_ms } => {
                let t_model_ms = t_abs_ms.clamp(0.0, duration_ms);
                let progress01 = if duration_ms > 0.0 { t_model_ms / duration_ms } else { 1.0 };
                let end_event = (progress01 - 1.0).abs() < f64::EPSILON && self.prev_progress01 < 1.0;
                self.prev_progress01 = progress01;
                TimeDeriveOutput {
                    t_abs_ms,
                    t_model_ms,
                    progress01: Some(progress01),
                    end_event: Some(end_event),
                }
            }
            TimeModel::Infinite { .. } => TimeDeriveOutput {
                t_abs_ms,
                t_model_ms: t_abs_ms,
                progress01: None,
                end_event: None,
            },
        };
        self.prev_t_abs_ms = Some(t_abs_ms);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_clamps_and_reports_progress() {
        let mut state = TimeState::new();
        let out = state.resolve(TimeModel::Finite { duration_ms: 1000.0 }, 250.0);
        assert!((out.t_model_ms - 250.0).abs() < 1e-9);
        assert!((out.progress01.unwrap() - 0.25).abs() < 1e-9);
        assert_eq!(out.end_event, Some(false));
    }

    #[test]
    fn finite_fires_end_event_once_on_crossing_completion() {
        let mut state = TimeState::new();
        state.resolve(TimeModel::Finite { duration_ms: 1000.0 }, 999.0);
        let out = state.resolve(TimeModel::Finite { duration_ms: 1000.0 }, 1000.0);
        assert_eq!(out.end_event, Some(true));
        let out = state.resolve(TimeModel::Finite { duration_ms: 1000.0 }, 1500.0);
        assert_eq!(out.end_event, Some(false), "clamped progress stays at 1.0, no repeat firing");
    }

    #[test]
    fn infinite_passes_t_abs_through_with_no_phase() {
        let mut state = TimeState::new();
        let out = state.resolve(TimeModel::Infinite { window_ms: 5000.0 }, 12_345.0);
        assert!((out.t_model_ms - 12_345.0).abs() < 1e-9);
        assert_eq!(out.progress01, None);
        assert_eq!(out.end_event, None);
    }

    #[test]
    fn detects_backward_jump_as_scrub() {
        let mut state = TimeState::new();
        assert!(!state.is_scrub(100.0), "first frame is never a scrub");
        state.resolve(TimeModel::Infinite { window_ms: 1.0 }, 100.0);
        assert!(state.is_scrub(50.0));
        assert!(!state.is_scrub(150.0));
    }
}
