//! Note-fire sinks
//!
//! The audio collaborator sits behind [`NoteSink`]. Calls are fire-and-forget:
//! the engine hands over a future timestamp and never waits for the sound. A
//! sink may fail (device gone, voice pool exhausted); the engine logs the error
//! and carries on with the frame.

use crate::scheduler::ScheduledEvent;
use thiserror::Error;

/// Failure reported by an audio collaborator
#[derive(Error, Debug, Clone, PartialEq)]
#[error("note sink failed: {0}")]
pub struct SinkError(pub String);

/// Receiver of scheduled notes
pub trait NoteSink {
    fn fire(&mut self, instrument_id: &str, note_name: &str, at_time: f64, target_id: &str) -> Result<(), SinkError>;
}

/// Collects every fired note; used by the CLI, the wasm bindings and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<ScheduledEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the recorded events, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<ScheduledEvent> {
        std::mem::take(&mut self.events)
    }
}

impl NoteSink for RecordingSink {
    fn fire(&mut self, instrument_id: &str, note_name: &str, at_time: f64, target_id: &str) -> Result<(), SinkError> {
        self.events.push(ScheduledEvent {
            time: at_time,
            node_id: target_id.to_string(),
            instrument_id: instrument_id.to_string(),
            note_name: note_name.to_string(),
        });
        Ok(())
    }
}

/// Logs every note at `info` level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NoteSink for TracingSink {
    fn fire(&mut self, instrument_id: &str, note_name: &str, at_time: f64, target_id: &str) -> Result<(), SinkError> {
        tracing::info!("{} plays {} on {} at {:.4}s", target_id, note_name, instrument_id, at_time);
        Ok(())
    }
}

/// Discards every note
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NoteSink for NullSink {
    fn fire(&mut self, _: &str, _: &str, _: f64, _: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
