//! # Transport Clock
//!
//! The shared musical clock. It owns the tempo and the loop epoch and derives
//! every musical length from them:
//!
//! - `beat_length = 60 / bpm`
//! - `bar_length = beat_length * beats_per_bar`
//! - `step_length = beat_length / steps_per_beat`
//!
//! While running, the loop phase at time `now` is
//! `((now - epoch_start) mod bar_length) / bar_length`, always in `[0, 1)`.
//!
//! ## Tempo changes
//! Changing the tempo while running re-anchors the epoch so that the current
//! position (bars elapsed plus phase) is identical under the new bar length.
//! A ball that is half-way through its bar stays half-way through its bar, so
//! nothing audibly jumps. While stopped the tempo is simply replaced.
//!
//! ## Example
//! ```rust
//! use bouncer::TransportClock;
//!
//! let mut clock = TransportClock::new(120.0, 4, 4);
//! assert_eq!(clock.beat_length(), 0.5);
//! assert_eq!(clock.bar_length(), 2.0);
//!
//! clock.start(10.0);
//! let before = clock.loop_info(10.5).phase01; // a quarter of the way in
//! clock.set_bpm(90.0, 10.5);
//! let after = clock.loop_info(10.5).phase01;
//! assert!((before - after).abs() < 1e-9);
//! ```

use crate::config::ToyConfig;
use serde::Serialize;

pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Snapshot of the transport grid at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopInfo {
    /// The time this info was computed for
    pub now: f64,
    pub epoch_start: f64,
    pub bar_length: f64,
    pub beat_length: f64,
    pub step_length: f64,
    /// Position inside the current bar, in `[0, 1)`
    pub phase01: f64,
    pub bar_index: u64,
    /// Start time of the bar containing `now`
    pub bar_start: f64,
}

impl LoopInfo {
    /// Number of steps in one bar
    pub fn steps_per_bar(&self) -> usize {
        ((self.bar_length / self.step_length).round() as usize).max(1)
    }

    /// Start of the first bar boundary at or after `t`.
    pub fn next_bar_start(&self, t: f64) -> f64 {
        let elapsed = t - self.epoch_start;
        let k = (elapsed / self.bar_length - 1e-9).ceil();
        self.epoch_start + k * self.bar_length
    }
}

/// The shared musical clock
#[derive(Debug, Clone)]
pub struct TransportClock {
    bpm: f64,
    beats_per_bar: u32,
    steps_per_beat: u32,
    epoch_start: f64,
    running: bool,
    bar_index: u64,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(DEFAULT_BPM, 4, 4)
    }
}

impl TransportClock {
    pub fn new(bpm: f64, beats_per_bar: u32, steps_per_beat: u32) -> Self {
        Self {
            bpm: sanitize_bpm(bpm).unwrap_or(DEFAULT_BPM),
            beats_per_bar: beats_per_bar.max(1),
            steps_per_beat: steps_per_beat.max(1),
            epoch_start: 0.0,
            running: false,
            bar_index: 0,
        }
    }

    pub fn from_config(config: &ToyConfig) -> Self {
        Self::new(config.bpm, config.beats_per_bar, config.steps_per_beat)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn epoch_start(&self) -> f64 {
        self.epoch_start
    }

    /// Bar index as of the last `tick`
    pub fn bar_index(&self) -> u64 {
        self.bar_index
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn beat_length(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn bar_length(&self) -> f64 {
        self.beat_length() * self.beats_per_bar as f64
    }

    pub fn step_length(&self) -> f64 {
        self.beat_length() / self.steps_per_beat as f64
    }

    /// Change the tempo, keeping the loop position if running.
    ///
    /// Values are clamped to `[MIN_BPM, MAX_BPM]`; non-finite values are ignored.
    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        let Some(bpm) = sanitize_bpm(bpm) else {
            tracing::debug!("Ignoring non-finite bpm");
            return;
        };

        if self.running && now.is_finite() {
            let elapsed_bars = self.elapsed_bars(now);
            self.bpm = bpm;
            self.epoch_start = now - elapsed_bars * self.bar_length();
        } else {
            self.bpm = bpm;
        }
        tracing::info!("Transport tempo set to {} bpm", self.bpm);
    }

    pub fn start(&mut self, now: f64) {
        self.epoch_start = if now.is_finite() { now } else { 0.0 };
        self.bar_index = 0;
        self.running = true;
        tracing::info!("Transport started at {:.3}s ({} bpm)", self.epoch_start, self.bpm);
    }

    /// Stop the clock; the next `start` resynchronizes from scratch.
    pub fn stop(&mut self) {
        self.running = false;
        self.epoch_start = 0.0;
        tracing::info!("Transport stopped");
    }

    /// Phase in `[0, 1)` at `now`; 0 while stopped.
    pub fn phase_at(&self, now: f64) -> f64 {
        self.loop_info(now).phase01
    }

    /// Compute the grid at `now` without mutating the clock.
    pub fn loop_info(&self, now: f64) -> LoopInfo {
        let now = if now.is_finite() { now } else { self.epoch_start };
        let bar_length = finite_positive(self.bar_length(), 60.0 / DEFAULT_BPM * 4.0);
        let beat_length = finite_positive(self.beat_length(), bar_length / self.beats_per_bar as f64);
        let step_length = finite_positive(self.step_length(), beat_length / self.steps_per_beat as f64);

        if !self.running {
            return LoopInfo {
                now,
                epoch_start: now,
                bar_length,
                beat_length,
                step_length,
                phase01: 0.0,
                bar_index: 0,
                bar_start: now,
            };
        }

        let elapsed = now - self.epoch_start;
        let bars = (elapsed / bar_length).floor();
        let mut phase01 = elapsed.rem_euclid(bar_length) / bar_length;
        if !phase01.is_finite() || !(0.0..1.0).contains(&phase01) {
            phase01 = 0.0;
        }

        LoopInfo {
            now,
            epoch_start: self.epoch_start,
            bar_length,
            beat_length,
            step_length,
            phase01,
            bar_index: if bars.is_finite() && bars > 0.0 { bars as u64 } else { 0 },
            bar_start: self.epoch_start + bars * bar_length,
        }
    }

    /// Advance the stored bar index to `now` and return the grid.
    pub fn tick(&mut self, now: f64) -> LoopInfo {
        let info = self.loop_info(now);
        if self.running && info.bar_index != self.bar_index {
            tracing::trace!("Bar {}", info.bar_index);
            self.bar_index = info.bar_index;
        }
        info
    }

    fn elapsed_bars(&self, now: f64) -> f64 {
        let bars = (now - self.epoch_start) / self.bar_length();
        if bars.is_finite() {
            bars.max(0.0)
        } else {
            0.0
        }
    }
}

fn sanitize_bpm(bpm: f64) -> Option<f64> {
    if bpm.is_finite() {
        Some(bpm.clamp(MIN_BPM, MAX_BPM))
    } else {
        None
    }
}

fn finite_positive(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_derived_lengths_at_120() {
        let clock = TransportClock::new(120.0, 4, 4);
        assert_eq!(clock.beat_length(), 0.5);
        assert_eq!(clock.bar_length(), 2.0);
        assert_eq!(clock.step_length(), 0.125);
    }

    #[test]
    fn test_bpm_is_clamped() {
        let mut clock = TransportClock::default();
        clock.set_bpm(1000.0, 0.0);
        assert_eq!(clock.bpm(), MAX_BPM);
        clock.set_bpm(1.0, 0.0);
        assert_eq!(clock.bpm(), MIN_BPM);
    }

    #[test]
    fn test_nan_bpm_is_ignored() {
        let mut clock = TransportClock::default();
        clock.set_bpm(f64::NAN, 0.0);
        assert_eq!(clock.bpm(), DEFAULT_BPM);
        assert_eq!(TransportClock::new(f64::INFINITY, 4, 4).bpm(), DEFAULT_BPM);
    }

    #[test]
    fn test_phase_while_running() {
        let mut clock = TransportClock::new(120.0, 4, 4);
        clock.start(5.0);
        let info = clock.loop_info(5.5);
        assert!((info.phase01 - 0.25).abs() < EPS);
        assert_eq!(info.bar_index, 0);

        let info = clock.loop_info(9.0);
        assert!(info.phase01.abs() < EPS);
        assert_eq!(info.bar_index, 2);
        assert!((info.bar_start - 9.0).abs() < EPS);
    }

    #[test]
    fn test_phase_preserved_across_tempo_changes() {
        let mut clock = TransportClock::new(120.0, 4, 4);
        clock.start(0.0);
        let mut now = 0.37;
        for bpm in [60.0, 133.0, 299.0, 31.0, 120.0, 87.5] {
            let before = clock.loop_info(now);
            clock.set_bpm(bpm, now);
            let after = clock.loop_info(now);
            assert!((before.phase01 - after.phase01).abs() < 1e-9, "bpm {}", bpm);
            assert_eq!(before.bar_index, after.bar_index, "bpm {}", bpm);
            now += 1.913;
        }
    }

    #[test]
    fn test_set_bpm_while_stopped_only_replaces() {
        let mut clock = TransportClock::new(120.0, 4, 4);
        clock.set_bpm(60.0, 42.0);
        assert_eq!(clock.bpm(), 60.0);
        assert_eq!(clock.epoch_start(), 0.0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_stop_resets_epoch() {
        let mut clock = TransportClock::default();
        clock.start(3.0);
        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(clock.epoch_start(), 0.0);
        let info = clock.loop_info(7.0);
        assert_eq!(info.phase01, 0.0);
        assert_eq!(info.bar_start, 7.0);
    }

    #[test]
    fn test_start_resets_bar_index() {
        let mut clock = TransportClock::default();
        clock.start(0.0);
        assert_eq!(clock.tick(4.1).bar_index, 2);
        assert_eq!(clock.bar_index(), 2);
        clock.start(10.0);
        assert_eq!(clock.bar_index(), 0);
    }

    #[test]
    fn test_non_finite_now_is_safe() {
        let mut clock = TransportClock::default();
        clock.start(1.0);
        let info = clock.loop_info(f64::NAN);
        assert!(info.phase01.is_finite());
        assert!(info.bar_start.is_finite());
    }

    #[test]
    fn test_next_bar_start() {
        let mut clock = TransportClock::new(120.0, 4, 4);
        clock.start(1.0);
        let info = clock.loop_info(2.0);
        assert!((info.next_bar_start(2.0) - 3.0).abs() < EPS);
        assert!((info.next_bar_start(3.0) - 3.0).abs() < EPS);
        assert_eq!(info.steps_per_bar(), 16);
    }
}
