//! # Scheduler
//!
//! Turns "fire at or after time T" into a point on the transport grid and
//! hands it to the note sink.
//!
//! ## Quantization
//! With a divisor `d > 0` the grid is `beat_length / d`, anchored at the loop
//! epoch; a request is moved to the first grid point at or after it. With
//! `d == 0` the note fires as soon as possible. Either way a small lead
//! ([`LEAD_TIME`]) is added so the audio collaborator always receives a
//! timestamp that is still in the future.
//!
//! ## Look-ahead slots
//! Frame rates drop. Instead of firing step-track slots when a frame happens
//! to land on them, every frame schedules all slots whose time falls inside
//! `[now + lead, now + lookahead]`. A slot is identified by the bar it belongs
//! to and its index, so overlapping windows never fire it twice.
//!
//! A chain member about to receive the turn on the next downbeat, or one that
//! has just received it near the end of a bar (phase above
//! [`PRE_SCHEDULE_PHASE`]), gets slot 0 of the next bar scheduled before the
//! boundary. The hand-off itself is only seen in the first frame past the
//! downbeat, when that slot is already behind the window.

use crate::config::ToyConfig;
use crate::sink::NoteSink;
use crate::transport::LoopInfo;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const LEAD_TIME: f64 = 0.00045;
pub const DEFAULT_LOOKAHEAD: f64 = 0.1;
pub const PRE_SCHEDULE_PHASE: f64 = 0.9;

/// A note handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub time: f64,
    pub node_id: String,
    pub instrument_id: String,
    pub note_name: String,
}

/// One physics hit waiting to be quantized
#[derive(Debug, Clone, Copy)]
pub struct FireRequest<'a> {
    pub node_id: &'a str,
    pub instrument_id: &'a str,
    pub note_name: &'a str,
    pub requested_time: f64,
    pub divisor: u32,
}

/// Step-track view of one node for the look-ahead batch
#[derive(Debug, Clone)]
pub struct SlotTrack<'a> {
    pub node_id: &'a str,
    pub instrument_id: &'a str,
    /// `(slot index, note name)` for every filled slot
    pub slots: Vec<(usize, String)>,
    /// The node holds the turn; otherwise only the pre-scheduled downbeat is considered
    pub plays: bool,
    /// Also consider the bar after the current one
    pub include_next_bar: bool,
    /// The node takes, or just took, the chain's turn at the next downbeat
    pub pre_schedule_downbeat: bool,
}

/// Smallest `epoch_start + k * (beat_length / divisor)` that is `>= requested`.
///
/// A divisor of 0 disables quantization and returns `max(requested, now)`.
///
/// # Example
/// ```
/// use bouncer::{TransportClock, scheduler::quantize_to_grid};
///
/// let mut clock = TransportClock::new(120.0, 4, 4);
/// clock.start(0.0);
/// let info = clock.loop_info(0.3);
/// // quarter-beat grid at 120 bpm is 0.125s
/// assert!((quantize_to_grid(0.3, 4, &info) - 0.375).abs() < 1e-9);
/// ```
pub fn quantize_to_grid(requested: f64, divisor: u32, info: &LoopInfo) -> f64 {
    let requested = if requested.is_finite() { requested } else { info.now };
    if divisor == 0 {
        return requested.max(info.now);
    }

    let grid = info.beat_length / divisor as f64;
    if !grid.is_finite() || grid <= 0.0 {
        return requested.max(info.now);
    }

    let mut k = ((requested - info.epoch_start) / grid).ceil();
    // Correct for rounding on either side of the boundary
    if info.epoch_start + k * grid < requested {
        k += 1.0;
    } else if info.epoch_start + (k - 1.0) * grid >= requested {
        k -= 1.0;
    }
    info.epoch_start + k * grid
}

/// Quantizes fire requests and batches step slots
#[derive(Debug, Clone)]
pub struct Scheduler {
    lead_time: f64,
    lookahead: f64,
    /// Per node: `(rounded bar start in ms, slot)` already scheduled
    fired: HashMap<String, HashSet<(i64, usize)>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(LEAD_TIME, DEFAULT_LOOKAHEAD)
    }
}

impl Scheduler {
    pub fn new(lead_time: f64, lookahead: f64) -> Self {
        let lead_time = if lead_time.is_finite() { lead_time.max(0.0) } else { LEAD_TIME };
        let lookahead = if lookahead.is_finite() && lookahead > lead_time {
            lookahead
        } else {
            lead_time + DEFAULT_LOOKAHEAD
        };
        Self {
            lead_time,
            lookahead,
            fired: HashMap::new(),
        }
    }

    pub fn from_config(config: &ToyConfig) -> Self {
        Self::new(config.lead_time, config.lookahead)
    }

    pub fn lead_time(&self) -> f64 {
        self.lead_time
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Grid-aligned fire time plus lead.
    pub fn quantize(&self, requested: f64, divisor: u32, info: &LoopInfo) -> f64 {
        if divisor == 0 {
            let requested = if requested.is_finite() { requested } else { info.now };
            return requested.max(info.now + self.lead_time);
        }
        quantize_to_grid(requested, divisor, info) + self.lead_time
    }

    /// Quantize a physics hit and forward it to the sink.
    ///
    /// Sink failures are logged and swallowed; `None` means nothing was delivered.
    pub fn dispatch(&self, request: FireRequest<'_>, info: &LoopInfo, sink: &mut dyn NoteSink) -> Option<ScheduledEvent> {
        let time = self.quantize(request.requested_time, request.divisor, info);
        deliver(
            sink,
            ScheduledEvent {
                time,
                node_id: request.node_id.to_string(),
                instrument_id: request.instrument_id.to_string(),
                note_name: request.note_name.to_string(),
            },
        )
    }

    /// Schedule every step slot that falls inside the look-ahead window.
    ///
    /// Returns the events that reached the sink, in track then time order.
    pub fn schedule_slots(&mut self, info: &LoopInfo, tracks: &[SlotTrack<'_>], sink: &mut dyn NoteSink) -> Vec<ScheduledEvent> {
        let window_start = info.now + self.lead_time;
        let window_end = info.now + self.lookahead;
        let bar_ms = (info.bar_length * 1000.0).round() as i64;
        let current_bar_ms = (info.bar_start * 1000.0).round() as i64;
        let mut delivered = Vec::new();

        for track in tracks {
            let fired = self.fired.entry(track.node_id.to_string()).or_default();
            fired.retain(|(bar, _)| *bar >= current_bar_ms - bar_ms);

            let next_bar = info.bar_start + info.bar_length;
            let mut bars = Vec::with_capacity(2);
            if track.plays {
                bars.push(info.bar_start);
            }
            if (track.plays && track.include_next_bar) || track.pre_schedule_downbeat {
                bars.push(next_bar);
            }

            for bar_start in bars {
                let bar_key = (bar_start * 1000.0).round() as i64;
                for (slot, note_name) in &track.slots {
                    let when = bar_start + *slot as f64 * info.step_length;
                    let in_window = track.plays && when >= window_start && when <= window_end;
                    let pre_scheduled = track.pre_schedule_downbeat
                        && bar_start == next_bar
                        && *slot == 0
                        && info.phase01 > PRE_SCHEDULE_PHASE
                        && when >= window_start;
                    if !(in_window || pre_scheduled) {
                        continue;
                    }
                    if !fired.insert((bar_key, *slot)) {
                        continue;
                    }
                    let event = ScheduledEvent {
                        time: when,
                        node_id: track.node_id.to_string(),
                        instrument_id: track.instrument_id.to_string(),
                        note_name: note_name.clone(),
                    };
                    if let Some(event) = deliver(sink, event) {
                        delivered.push(event);
                    }
                }
            }
        }
        delivered
    }

    /// Drop dedupe state for a node (removed, reset or deactivated).
    pub fn forget(&mut self, node_id: &str) {
        self.fired.remove(node_id);
    }
}

fn deliver(sink: &mut dyn NoteSink, event: ScheduledEvent) -> Option<ScheduledEvent> {
    match sink.fire(&event.instrument_id, &event.note_name, event.time, &event.node_id) {
        Ok(()) => Some(event),
        Err(e) => {
            tracing::warn!("Dropping {} for {}: {}", event.note_name, event.node_id, e);
            None
        }
    }
}
