use bouncer::physics::{Bounds, Edge};
use bouncer::{BouncerError, NodeState, RecordingSink, Stage, StageSnapshot};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct ToyError {
    kind: &'static str,
    message: String,
}

fn to_js_error(e: BouncerError) -> JsValue {
    let kind = match e {
        BouncerError::ConfigError(_) => "config",
        BouncerError::SnapshotError(_) => "snapshot",
        BouncerError::UnknownNode(_) => "unknown-node",
        BouncerError::DuplicateNode(_) => "duplicate-node",
        BouncerError::ChainError(_) => "chain",
        BouncerError::Io(_) => "io",
    };
    let error = ToyError {
        kind,
        message: e.to_string(),
    };
    match serde_json::to_string(&error) {
        Ok(json) => JsValue::from_str(&json),
        Err(_) => JsValue::from_str(&error.message),
    }
}

fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn parse_edge(edge: &str) -> Result<Edge, JsValue> {
    Edge::from_str(edge).ok_or_else(|| JsValue::from_str(&format!("Unknown edge: {}", edge)))
}

/// A stage of toys driven by the browser's animation frame
#[wasm_bindgen]
pub struct Toybox {
    stage: Stage,
    sink: RecordingSink,
}

#[wasm_bindgen]
impl Toybox {
    /// Build from a YAML config; an empty string uses the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_yaml: &str) -> Result<Toybox, JsValue> {
        let stage = bouncer::stage_from_yaml(config_yaml).map_err(to_js_error)?;
        Ok(Toybox {
            stage,
            sink: RecordingSink::new(),
        })
    }

    /// Advance to `now` (audio clock seconds) and return the scheduled notes.
    pub fn frame(&mut self, now: f64) -> Result<JsValue, JsValue> {
        self.stage.frame(now, &mut self.sink);
        to_js_value(&self.sink.drain())
    }

    pub fn loop_info(&self, now: f64) -> Result<JsValue, JsValue> {
        to_js_value(&self.stage.transport().loop_info(now))
    }

    pub fn start(&mut self, now: f64) {
        self.stage.start(now);
    }

    pub fn stop(&mut self) {
        self.stage.stop();
    }

    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        self.stage.set_bpm(bpm, now);
    }

    pub fn add_node(&mut self, id: &str, x: f64, y: f64, w: f64, h: f64) -> Result<(), JsValue> {
        self.stage.add_node(id, Bounds::new(x, y, w, h)).map_err(to_js_error)?;
        Ok(())
    }

    pub fn remove_node(&mut self, id: &str) -> Result<(), JsValue> {
        self.stage.remove_node(id).map_err(to_js_error)?;
        Ok(())
    }

    pub fn resize_node(&mut self, id: &str, x: f64, y: f64, w: f64, h: f64) -> Result<(), JsValue> {
        self.stage
            .resize_node(id, Bounds::new(x, y, w, h))
            .map_err(to_js_error)
    }

    pub fn link(&mut self, parent: &str, child: &str) -> Result<(), JsValue> {
        self.stage.link(parent, child).map_err(to_js_error)
    }

    pub fn unlink(&mut self, child: &str) -> Result<(), JsValue> {
        self.stage.unlink(child).map_err(to_js_error)
    }

    /// Role of a node: "standalone", "chain-active", ...
    pub fn role(&self, id: &str) -> Result<JsValue, JsValue> {
        to_js_value(&self.stage.role_of(id))
    }

    // Command API

    pub fn launch(&mut self, id: &str, dx: f64, dy: f64, now: f64) -> Result<(), JsValue> {
        self.stage.launch(id, dx, dy, now).map_err(to_js_error)
    }

    pub fn place_anchor(&mut self, id: &str, x: f64, y: f64) -> Result<(), JsValue> {
        self.node(id)?.place_anchor(x, y);
        Ok(())
    }

    pub fn set_anchor_velocity(&mut self, id: &str, vx: f64, vy: f64) -> Result<(), JsValue> {
        self.node(id)?.set_anchor_velocity(vx, vy);
        Ok(())
    }

    pub fn toggle_block_active(&mut self, id: &str, index: usize) -> Result<(), JsValue> {
        self.node(id)?.toggle_block_active(index);
        Ok(())
    }

    pub fn set_block_note(&mut self, id: &str, index: usize, note_index: usize) -> Result<(), JsValue> {
        self.node(id)?.set_block_note(index, note_index);
        Ok(())
    }

    pub fn move_block(&mut self, id: &str, index: usize, x: f64, y: f64) -> Result<(), JsValue> {
        self.node(id)?.move_block(index, x, y);
        Ok(())
    }

    pub fn set_edge_active(&mut self, id: &str, edge: &str, active: bool) -> Result<(), JsValue> {
        let edge = parse_edge(edge)?;
        self.node(id)?.set_edge_active(edge, active);
        Ok(())
    }

    pub fn set_edge_note(&mut self, id: &str, edge: &str, note_index: usize) -> Result<(), JsValue> {
        let edge = parse_edge(edge)?;
        self.node(id)?.set_edge_note(edge, note_index);
        Ok(())
    }

    pub fn set_quant_divisor(&mut self, id: &str, divisor: u32) -> Result<(), JsValue> {
        self.node(id)?.set_quant_divisor(divisor);
        Ok(())
    }

    pub fn set_speed_factor(&mut self, id: &str, factor: f64) -> Result<(), JsValue> {
        self.node(id)?.set_speed_factor(factor);
        Ok(())
    }

    /// Fill or clear (`undefined`) one step slot.
    pub fn set_step(&mut self, id: &str, slot: usize, note_index: Option<u32>) -> Result<(), JsValue> {
        self.node(id)?.set_step(slot, note_index.map(|n| n as usize));
        Ok(())
    }

    pub fn set_instrument(&mut self, id: &str, instrument_id: &str) -> Result<(), JsValue> {
        self.node(id)?.set_instrument(instrument_id);
        Ok(())
    }

    pub fn reset(&mut self, id: &str) -> Result<(), JsValue> {
        self.stage.reset_node(id).map_err(to_js_error)
    }

    // Snapshots

    pub fn get_state(&self, id: &str) -> Result<String, JsValue> {
        let node = self.stage.node(id).map_err(to_js_error)?;
        node.get_state().to_json().map_err(to_js_error)
    }

    pub fn set_state(&mut self, id: &str, json: &str) -> Result<(), JsValue> {
        let state = NodeState::from_json(json).map_err(to_js_error)?;
        self.stage.set_node_state(id, state).map_err(to_js_error)
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        self.stage.snapshot().to_json().map_err(to_js_error)
    }

    pub fn restore(&mut self, json: &str, now: f64) -> Result<(), JsValue> {
        let snapshot = StageSnapshot::from_json(json).map_err(to_js_error)?;
        self.stage.restore(snapshot, now).map_err(to_js_error)
    }
}

impl Toybox {
    fn node(&mut self, id: &str) -> Result<&mut bouncer::PhysicsNode, JsValue> {
        self.stage.node_mut(id).map_err(to_js_error)
    }
}
