use super::*;
use crate::config::ToyConfig;
use crate::transport::TransportClock;

const FRAME: f64 = 1.0 / 60.0;

fn setup() -> (PhysicsNode, TransportClock) {
    let mut clock = TransportClock::new(120.0, 4, 4);
    clock.start(0.0);
    let mut node = PhysicsNode::new("a", &ToyConfig::default());
    node.layout(Bounds::new(0.0, 0.0, 800.0, 600.0), clock.bar_length());
    (node, clock)
}

fn real_ball(x: f64, y: f64, vx: f64, vy: f64) -> BallState {
    BallState::Real(Ball {
        x,
        y,
        vx,
        vy,
        radius: 10.0,
        spawn_time: 0.0,
        flight_end: 100.0,
    })
}

fn current_ball(node: &PhysicsNode) -> Ball {
    *node.ball().and_then(BallState::as_real).expect("real ball")
}

#[test]
fn test_concrete_launch_speed() {
    let (mut node, clock) = setup();
    assert_eq!(clock.beat_length(), 0.5);
    assert_eq!(clock.bar_length(), 2.0);

    // Drag from (100, 100) toward (100, -1)
    node.launch(0.0, -101.0, 0.0, &clock);

    let expected = 1000.0 / (60.0 * 2.0) * 3.2;
    let speed = node.last_launch().unwrap().speed();
    assert!((speed - expected).abs() / expected < 0.05, "speed {}", speed);
    let ball = current_ball(&node);
    assert!(ball.vx.abs() < 1e-9);
    assert!(ball.vy < 0.0);
    assert_eq!(ball.flight_end, 2.0);
}

#[test]
fn test_layout_seeds_blocks_and_edges() {
    let (node, _) = setup();
    assert_eq!(node.blocks().len(), 5);
    assert!(node.blocks().iter().all(|b| b.active));
    assert_eq!(node.blocks()[2].note_index, 2);

    let right = node.edge(Edge::Right);
    assert_eq!((right.x, right.w, right.h), (792.0, 8.0, 600.0));
    let bottom = node.edge(Edge::Bottom);
    assert_eq!((bottom.y, bottom.w), (592.0, 800.0));

    let handle = node.handle();
    assert_eq!((handle.x, handle.y), (400.0, 480.0));
    assert!(!handle.user_placed);
}

#[test]
fn test_resize_keeps_base_speed() {
    let (mut node, clock) = setup();
    let base = node.base_speed().unwrap();
    node.layout(Bounds::new(0.0, 0.0, 400.0, 300.0), clock.bar_length());
    assert_eq!(node.base_speed(), Some(base));
    assert_eq!(node.blocks().len(), 5);
    assert_eq!(node.edge(Edge::Right).x, 392.0);
    assert_eq!(node.handle().y, 240.0);
}

#[test]
fn test_degenerate_world_falls_back() {
    let mut clock = TransportClock::default();
    clock.start(0.0);
    let mut node = PhysicsNode::new("a", &ToyConfig::default());
    node.layout(Bounds::new(0.0, 0.0, f64::NAN, 0.0), 2.0);
    assert_eq!(node.bounds(), Bounds::new(0.0, 0.0, 1.0, 1.0));

    node.launch(3.0, 4.0, 0.0, &clock);
    for i in 1..30 {
        node.step(i as f64 * FRAME, &clock);
    }
    assert!(current_ball(&node).is_finite());
}

#[test]
fn test_substeps_never_exceed_fraction_of_radius() {
    let radius = 10.0;
    let max_speed = ToyConfig::default().max_speed;
    for i in 0..360 {
        let angle = (i as f64).to_radians();
        for speed in [0.5, 37.0, max_speed / 2.0, max_speed] {
            let (dx, dy) = (angle.cos() * speed, angle.sin() * speed);
            let steps = substep_count(dx, dy, radius) as f64;
            assert!(steps >= 1.0);
            assert!(dx.abs() / steps <= SUBSTEP_FRACTION * radius + 1e-9);
            assert!(dy.abs() / steps <= SUBSTEP_FRACTION * radius + 1e-9);
        }
    }
    assert_eq!(substep_count(f64::NAN, 0.0, 10.0), 1);
}

#[test]
fn test_substeps_are_capped_for_degenerate_radius() {
    assert_eq!(substep_count(720.0, 0.0, 1e-9), MAX_SUBSTEPS);
    assert_eq!(substep_count(5.0, 0.0, 0.0), MAX_SUBSTEPS);
    assert_eq!(substep_count(0.0, 0.0, 0.0), 1);
}

#[test]
fn test_no_tunneling_through_thin_block_horizontal() {
    let (mut node, clock) = setup();
    node.blocks = vec![Block::new(400.0, 0.0, 1.0, 600.0, 0)];
    node.ball = Some(real_ball(200.0, 300.0, 400.0, 0.0));
    node.last_step_time = Some(0.0);

    let report = node.step(FRAME, &clock);
    let ball = current_ball(&node);
    assert!(ball.x < 400.0, "ball tunneled to x = {}", ball.x);
    assert!(ball.vx < 0.0);
    assert!(report.substeps >= 100);
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].source, HitSource::Block(0));
}

#[test]
fn test_no_tunneling_through_thin_block_vertical() {
    let (mut node, clock) = setup();
    node.blocks = vec![Block::new(0.0, 300.0, 800.0, 1.0, 4)];
    node.ball = Some(real_ball(400.0, 100.0, 0.0, 400.0));
    node.last_step_time = Some(0.0);

    let report = node.step(FRAME, &clock);
    let ball = current_ball(&node);
    assert!(ball.y < 300.0, "ball tunneled to y = {}", ball.y);
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].note_index, 4);
}

#[test]
fn test_speed_is_capped() {
    let (mut node, clock) = setup();
    node.blocks.clear();
    node.ball = Some(real_ball(400.0, 300.0, 3000.0, 4000.0));
    node.last_step_time = Some(0.0);
    node.step(FRAME, &clock);
    let ball = current_ball(&node);
    assert!(ball.speed() <= node.config().max_speed + 1e-9);
}

#[test]
fn test_debounce_over_forced_overlap() {
    let (mut node, _) = setup();
    node.blocks = vec![Block::new(300.0, 300.0, 40.0, 40.0, 3)];
    let mut hits = Vec::new();

    for _ in 0..5 {
        let mut ball = Ball {
            x: 320.0,
            y: 295.0,
            vx: 0.0,
            vy: 5.0,
            radius: 10.0,
            spawn_time: 0.0,
            flight_end: 100.0,
        };
        node.resolve_contacts(&mut ball, 1.0, &mut hits);
        assert_eq!(ball.vy, -5.0);
    }
    assert_eq!(hits.len(), 1);
    assert_eq!(node.blocks()[0].last_hit_time, Some(1.0));

    // Still inside the refractory window
    let mut ball = Ball { x: 320.0, y: 295.0, vx: 0.0, vy: 5.0, radius: 10.0, spawn_time: 0.0, flight_end: 100.0 };
    node.resolve_contacts(&mut ball, 1.05, &mut hits);
    assert_eq!(hits.len(), 1);

    let mut ball = Ball { x: 320.0, y: 295.0, vx: 0.0, vy: 5.0, radius: 10.0, spawn_time: 0.0, flight_end: 100.0 };
    node.resolve_contacts(&mut ball, 1.09, &mut hits);
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_inactive_block_collides_silently() {
    let (mut node, _) = setup();
    node.blocks = vec![Block::new(300.0, 300.0, 40.0, 40.0, 3)];
    node.toggle_block_active(0);
    assert!(!node.blocks()[0].active);

    let mut ball = Ball { x: 320.0, y: 295.0, vx: 0.0, vy: 5.0, radius: 10.0, spawn_time: 0.0, flight_end: 100.0 };
    let mut hits = Vec::new();
    node.resolve_contacts(&mut ball, 1.0, &mut hits);
    assert!(hits.is_empty());
    assert_eq!(ball.vy, -5.0);
    assert!(distance_to_rect(&node.blocks()[0].rect(), ball.x, ball.y) >= ball.radius);
    assert_eq!(node.blocks()[0].flash, 1.0);
}

#[test]
fn test_muted_edge_still_collides() {
    let (mut node, _) = setup();
    node.blocks.clear();
    node.set_edge_active(Edge::Top, false);

    let mut ball = Ball { x: 400.0, y: 12.0, vx: 0.0, vy: -5.0, radius: 10.0, spawn_time: 0.0, flight_end: 100.0 };
    let mut hits = Vec::new();
    node.resolve_contacts(&mut ball, 1.0, &mut hits);
    assert!(hits.is_empty());
    assert_eq!(ball.vy, 5.0);
    assert!((ball.y - (8.0 + 10.0 + EPSILON)).abs() < 1e-9);

    node.set_edge_active(Edge::Top, true);
    node.set_edge_note(Edge::Top, 9);
    let mut ball = Ball { x: 400.0, y: 12.0, vx: 0.0, vy: -5.0, radius: 10.0, spawn_time: 0.0, flight_end: 100.0 };
    node.resolve_contacts(&mut ball, 2.0, &mut hits);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, HitSource::Edge(Edge::Top));
    assert_eq!(hits[0].note_index, 9);
}

#[test]
fn test_ball_never_rests_inside_geometry() {
    let (mut node, clock) = setup();
    node.launch(37.0, -91.0, 0.0, &clock);

    let mut t = 0.0;
    while t < 6.0 {
        t += FRAME;
        node.step(t, &clock);
        let Some(ball) = node.ball().and_then(BallState::as_real) else {
            continue;
        };
        for block in node.blocks() {
            assert!(distance_to_rect(&block.rect(), ball.x, ball.y) >= ball.radius - 1e-6);
        }
        for edge in node.edges() {
            assert!(distance_to_rect(&edge.rect(), ball.x, ball.y) >= ball.radius - 1e-6);
        }
    }
}

#[test]
fn test_standalone_relaunches_on_bar_boundary() {
    let (mut node, clock) = setup();
    node.launch(20.0, -90.0, 0.0, &clock);
    let shot = node.last_launch().unwrap();

    let mut launches = Vec::new();
    let mut expiries = 0;
    let mut t = 0.0;
    while t < 4.5 {
        t += FRAME;
        let report = node.step(t, &clock);
        if report.expired.is_some() {
            expiries += 1;
        }
        if report.launched {
            launches.push(node.ball().unwrap().spawn_time());
        }
    }

    assert_eq!(expiries, 2);
    assert_eq!(launches.len(), 2);
    assert!((launches[0] - 2.0).abs() < 1e-9);
    assert!((launches[1] - 4.0).abs() < 1e-9);
    assert_eq!(node.last_launch(), Some(shot));
}

#[test]
fn test_dt_is_clamped() {
    let (mut node, clock) = setup();
    node.blocks.clear();
    node.ball = Some(real_ball(400.0, 400.0, 5.0, 0.0));
    node.last_step_time = Some(0.0);

    node.step(10.0, &clock);
    let ball = current_ball(&node);
    // 0.04s at 60fps is 2.4 frames
    assert!((ball.x - 412.0).abs() < 1e-9);
    assert!((ball.vx - 5.0 * 0.999).abs() < 1e-12);
}

#[test]
fn test_flash_decays() {
    let (mut node, clock) = setup();
    node.blocks[0].flash = 1.0;
    node.step(0.0, &clock);
    assert!((node.blocks()[0].flash - 0.88).abs() < 1e-12);
    for i in 1..60 {
        node.step(i as f64 * FRAME, &clock);
    }
    assert_eq!(node.blocks()[0].flash, 0.0);
}

#[test]
fn test_ghost_ball_is_silent_and_still() {
    let (mut node, clock) = setup();
    assert_eq!(node.activate(1.0, &clock), Activation::Ghost);
    let ghost = *node.ball().unwrap();
    assert!(ghost.is_ghost());
    assert_eq!(ghost.flight_end(), 3.0);

    let report = node.step(1.5, &clock);
    assert!(report.hits.is_empty());
    assert_eq!(report.substeps, 0);
    let report = node.step(3.0, &clock);
    assert_eq!(report.expired, Some(ghost));
    assert!(!report.launched);
}

#[test]
fn test_activation_with_user_anchor_launches() {
    let (mut node, clock) = setup();
    node.place_anchor(100.0, 500.0);
    assert_eq!(node.activate(0.5, &clock), Activation::Launched);
    let ball = current_ball(&node);
    assert_eq!((ball.x, ball.y), (100.0, 500.0));
    assert!(ball.vy < 0.0);
    assert_eq!(ball.spawn_time, 0.5);
}

#[test]
fn test_activation_with_history_relaunches_through_step() {
    let (mut node, clock) = setup();
    node.launch(0.0, -50.0, 0.0, &clock);
    node.deactivate();
    assert!(node.ball().is_none());

    assert_eq!(node.activate(2.0, &clock), Activation::RelaunchPending);
    assert_eq!(node.next_launch_at(), Some(2.0));
    let report = node.step(2.01, &clock);
    assert!(report.launched);
    assert_eq!(node.ball().unwrap().spawn_time(), 2.0);
}

#[test]
fn test_speed_factor_rescales_last_launch() {
    let (mut node, clock) = setup();
    node.launch(0.0, -50.0, 0.0, &clock);
    let before = node.last_launch().unwrap().speed();
    node.set_speed_factor(0.5);
    let after = node.last_launch().unwrap().speed();
    assert!((after - before * 0.5).abs() < 1e-9);

    node.set_speed_factor(9.0);
    assert_eq!(node.speed_factor(), 1.6);
    node.set_speed_factor(f64::NAN);
    assert_eq!(node.speed_factor(), 1.6);
}

#[test]
fn test_commands_clamp_and_ignore_bad_input() {
    let (mut node, _) = setup();
    node.set_block_note(0, 500);
    assert_eq!(node.blocks()[0].note_index, 35);
    node.set_block_note(99, 1);
    node.toggle_block_active(99);

    node.set_quant_divisor(64);
    assert_eq!(node.quant_divisor(), 16);

    node.place_anchor(f64::NAN, 3.0);
    assert!(!node.handle().user_placed);
    node.place_anchor(-50.0, 900.0);
    assert_eq!((node.handle().x, node.handle().y), (0.0, 600.0));

    node.move_block(0, 790.0, -20.0);
    let block = &node.blocks()[0];
    assert_eq!((block.x, block.y), (800.0 - block.w, 0.0));

    node.set_step(3, Some(7));
    node.set_step(99, Some(7));
    assert_eq!(node.steps().slots[3], Some(7));
    assert_eq!(node.slot_notes(), vec![(3, node.note_name(7))]);
}

#[test]
fn test_reset_clears_history() {
    let (mut node, clock) = setup();
    node.place_anchor(100.0, 100.0);
    node.launch(10.0, -10.0, 0.0, &clock);
    node.reset();
    assert!(node.ball().is_none());
    assert!(node.last_launch().is_none());
    assert!(!node.handle().user_placed);
    assert_eq!(node.blocks().len(), 5);
}
