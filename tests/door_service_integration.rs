//! Integration tests for the door service against mock ports.
//!
//! Drives the full command → persist → pulse → settle pipeline with a
//! manual clock, covering restore, crash-recovery resume, the override
//! policy, external reconciliation, and the idle re-pulse behavior.

#![cfg(not(target_os = "espidf"))]

use std::collections::HashMap;

use doorpilot::adapters::exposure::{ExposureAdapter, HostPort};
use doorpilot::app::events::AppEvent;
use doorpilot::app::ports::{
    ActuatorPort, DurableStore, EventSink, KEY_CURRENT_DOOR_STATE, KEY_TARGET_DOOR_STATE,
};
use doorpilot::app::service::DoorService;
use doorpilot::config::SystemConfig;
use doorpilot::error::{CommandRejected, PortError, StoreError};
use doorpilot::fsm::{ControlLine, DoorState, TargetState};

// ── Mock adapters ─────────────────────────────────────────────

#[derive(Default)]
struct MockHw {
    /// Every (line, asserted) write in call order.
    writes: Vec<(ControlLine, bool)>,
    fail_writes: bool,
}

impl MockHw {
    fn line_asserted(&self, line: ControlLine) -> bool {
        self.writes
            .iter()
            .rev()
            .find(|(l, _)| *l == line)
            .is_some_and(|(_, asserted)| *asserted)
    }
}

impl ActuatorPort for MockHw {
    fn write_line(&mut self, line: ControlLine, asserted: bool) -> Result<(), PortError> {
        if self.fail_writes {
            return Err(PortError::LineWriteFailed);
        }
        self.writes.push((line, asserted));
        Ok(())
    }

    fn read_sensor(&mut self) -> Result<bool, PortError> {
        Ok(false)
    }
}

#[derive(Default)]
struct MockStore {
    map: HashMap<String, u8>,
    fail_sets: bool,
}

impl DurableStore for MockStore {
    fn get(&self, key: &str) -> Result<Option<u8>, StoreError> {
        Ok(self.map.get(key).copied())
    }

    fn set(&mut self, key: &str, value: u8) -> Result<(), StoreError> {
        if self.fail_sets {
            return Err(StoreError::IoError);
        }
        self.map.insert(key.to_owned(), value);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

// ── Helpers ───────────────────────────────────────────────────

struct Rig {
    service: DoorService,
    hw: MockHw,
    store: MockStore,
    sink: RecordingSink,
    config: SystemConfig,
}

impl Rig {
    fn new(config: SystemConfig) -> Self {
        Self::with_store(config, MockStore::default())
    }

    fn with_store(config: SystemConfig, store: MockStore) -> Self {
        let (current, target) = DoorService::restore(&store);
        let mut rig = Self {
            service: DoorService::new(&config, current, target),
            hw: MockHw::default(),
            store,
            sink: RecordingSink::default(),
            config,
        };
        rig.service
            .start(0, &mut rig.hw, &mut rig.store, &mut rig.sink);
        rig
    }

    fn request(&mut self, target: TargetState, now_ms: u64) -> Result<(), CommandRejected> {
        self.service
            .request_target(target, now_ms, &mut self.hw, &mut self.store, &mut self.sink)
    }

    fn report(&mut self, observed: DoorState, now_ms: u64) {
        self.service
            .on_external_report(observed, now_ms, &mut self.hw, &mut self.store, &mut self.sink);
    }

    fn sensor_edge(&mut self, level: bool, now_ms: u64) {
        self.service
            .on_sensor_edge(level, now_ms, &mut self.hw, &mut self.store, &mut self.sink);
    }

    fn poll(&mut self, now_ms: u64) {
        self.service
            .poll(now_ms, &mut self.hw, &mut self.store, &mut self.sink);
    }

    fn travel_ms(&self) -> u64 {
        self.config.travel_duration_ms()
    }

    fn pulse_ms(&self) -> u64 {
        u64::from(self.config.pulse_duration_ms)
    }

    fn stored_pair(&self) -> (Option<u8>, Option<u8>) {
        (
            self.store.map.get(KEY_CURRENT_DOOR_STATE).copied(),
            self.store.map.get(KEY_TARGET_DOOR_STATE).copied(),
        )
    }
}

// ── Restore ───────────────────────────────────────────────────

#[test]
fn fresh_store_restores_closed_at_rest() {
    let rig = Rig::new(SystemConfig::default());
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert_eq!(rig.service.target_state(), TargetState::Closed);
    assert!(!rig.service.is_moving());
    assert!(!rig.service.obstruction_detected());
}

#[test]
fn persisted_pair_restores_exactly() {
    let mut store = MockStore::default();
    store.map.insert(KEY_CURRENT_DOOR_STATE.into(), DoorState::Open.tag());
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), TargetState::Open.tag());

    let rig = Rig::with_store(SystemConfig::default(), store);
    assert_eq!(rig.service.current_state(), DoorState::Open);
    assert_eq!(rig.service.target_state(), TargetState::Open);
    assert!(rig.hw.writes.is_empty(), "at-rest restore must not pulse");
}

#[test]
fn corrupt_tags_fall_back_to_defaults() {
    let mut store = MockStore::default();
    store.map.insert(KEY_CURRENT_DOOR_STATE.into(), 9);
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), 7);

    let rig = Rig::with_store(SystemConfig::default(), store);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert_eq!(rig.service.target_state(), TargetState::Closed);
}

#[test]
fn missing_current_defaults_to_targets_stable_form() {
    let mut store = MockStore::default();
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), TargetState::Open.tag());

    let rig = Rig::with_store(SystemConfig::default(), store);
    assert_eq!(rig.service.current_state(), DoorState::Open);
    assert_eq!(rig.service.target_state(), TargetState::Open);
}

// ── Crash-recovery resume ─────────────────────────────────────

#[test]
fn restart_mid_travel_resumes_toward_target() {
    // Power was lost after the Opening pulse was persisted.
    let mut store = MockStore::default();
    store
        .map
        .insert(KEY_CURRENT_DOOR_STATE.into(), DoorState::Opening.tag());
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), TargetState::Open.tag());

    let mut rig = Rig::with_store(SystemConfig::default(), store);
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(
        rig.hw.line_asserted(ControlLine::Open),
        "resume must re-issue the trigger pulse"
    );

    let settle = rig.travel_ms();
    rig.poll(settle);
    assert_eq!(rig.service.current_state(), DoorState::Open);
    assert_eq!(rig.stored_pair(), (Some(0), Some(0)));
}

#[test]
fn restart_with_stale_stable_state_reissues_command() {
    // Persisted intent says Open but the door was believed Closed.
    let mut store = MockStore::default();
    store
        .map
        .insert(KEY_CURRENT_DOOR_STATE.into(), DoorState::Closed.tag());
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), TargetState::Open.tag());

    let mut rig = Rig::with_store(SystemConfig::default(), store);
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(rig.hw.line_asserted(ControlLine::Open));
    assert!(rig.sink.events.contains(&AppEvent::StateChanged {
        from: DoorState::Closed,
        to: DoorState::Opening,
    }));

    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Open);
}

#[test]
fn restart_resume_keeps_published_target_in_sync() {
    // Persisted (Closed, Open): from boot onward the host must see the
    // restored intent, never a target inferred from the door position.
    struct NullHost;
    impl HostPort for NullHost {
        fn publish_current(&mut self, _state: DoorState) {}
        fn publish_target(&mut self, _target: TargetState) {}
        fn publish_obstruction(&mut self, _obstructed: bool) {}
    }

    let config = SystemConfig::default();
    let mut store = MockStore::default();
    store
        .map
        .insert(KEY_CURRENT_DOOR_STATE.into(), DoorState::Closed.tag());
    store.map.insert(KEY_TARGET_DOOR_STATE.into(), TargetState::Open.tag());

    let mut hw = MockHw::default();
    let mut exposure = ExposureAdapter::new(NullHost);
    let (current, target) = DoorService::restore(&store);
    let mut service = DoorService::new(&config, current, target);
    service.start(0, &mut hw, &mut store, &mut exposure);

    assert_eq!(exposure.last_target(), Some(TargetState::Open));
    assert_eq!(exposure.last_current(), Some(DoorState::Opening));

    service.poll(config.travel_duration_ms(), &mut hw, &mut store, &mut exposure);
    assert_eq!(exposure.last_current(), Some(DoorState::Open));
    assert_eq!(exposure.last_target(), Some(TargetState::Open));
}

// ── Command → pulse → settle timeline ─────────────────────────

#[test]
fn full_open_cycle_timeline() {
    let mut rig = Rig::new(SystemConfig::default());

    rig.request(TargetState::Open, 0).unwrap();
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(rig.hw.line_asserted(ControlLine::Open));
    // Persisted transient pair before any settling.
    assert_eq!(rig.stored_pair(), (Some(DoorState::Opening.tag()), Some(0)));

    // Just before the pulse deadline the line is still asserted.
    rig.poll(rig.pulse_ms() - 1);
    assert!(rig.hw.line_asserted(ControlLine::Open));

    // At the pulse deadline the line releases; still travelling.
    rig.poll(rig.pulse_ms());
    assert!(!rig.hw.line_asserted(ControlLine::Open));
    assert_eq!(rig.service.current_state(), DoorState::Opening);

    // Just before settle: unchanged.
    rig.poll(rig.travel_ms() - 1);
    assert_eq!(rig.service.current_state(), DoorState::Opening);

    // Settle completes the move and persists the stable pair.
    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Open);
    assert_eq!(rig.service.target_state(), TargetState::Open);
    assert_eq!(rig.stored_pair(), (Some(0), Some(0)));

    assert!(rig.sink.events.contains(&AppEvent::StateChanged {
        from: DoorState::Opening,
        to: DoorState::Open,
    }));
}

#[test]
fn target_requested_emitted_before_state_change() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.request(TargetState::Open, 0).unwrap();

    let requested = rig
        .sink
        .events
        .iter()
        .position(|e| *e == AppEvent::TargetRequested(TargetState::Open))
        .unwrap();
    let changed = rig
        .sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::StateChanged { .. }))
        .unwrap();
    assert!(requested < changed);
}

// ── Override policy ───────────────────────────────────────────

#[test]
fn busy_rejection_holds_target_and_republishes() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.request(TargetState::Open, 0).unwrap();

    let result = rig.request(TargetState::Closed, 1_000);
    assert_eq!(result, Err(CommandRejected::Busy));
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert_eq!(rig.service.target_state(), TargetState::Open);
    assert!(rig
        .sink
        .events
        .contains(&AppEvent::CommandRejected(TargetState::Open)));

    // The in-flight move still completes on schedule.
    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Open);
}

#[test]
fn override_enabled_redirects_in_flight_move() {
    let config = SystemConfig {
        allow_command_override: true,
        ..Default::default()
    };
    let mut rig = Rig::new(config);

    rig.request(TargetState::Open, 0).unwrap();
    rig.request(TargetState::Closed, 2_000).unwrap();

    assert_eq!(rig.service.current_state(), DoorState::Closing);
    assert_eq!(rig.service.target_state(), TargetState::Closed);
    assert!(rig.hw.line_asserted(ControlLine::Close));
    assert!(!rig.hw.line_asserted(ControlLine::Open));

    // Settle is re-armed from the override time, not the original command.
    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Closing);
    rig.poll(2_000 + rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Closed);
}

#[test]
fn override_same_direction_reissues_pulse() {
    let config = SystemConfig {
        allow_command_override: true,
        ..Default::default()
    };
    let mut rig = Rig::new(config);

    rig.request(TargetState::Open, 0).unwrap();
    rig.poll(rig.pulse_ms()); // first pulse released
    let writes_before = rig.hw.writes.len();

    rig.request(TargetState::Open, 3_000).unwrap();
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(rig.hw.writes.len() > writes_before);
    assert!(rig.hw.line_asserted(ControlLine::Open));
}

// ── External reconciliation ───────────────────────────────────

#[test]
fn external_report_collapses_in_flight_move() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.request(TargetState::Open, 0).unwrap();

    rig.report(DoorState::Closed, 3_000);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert_eq!(rig.service.target_state(), TargetState::Closed);
    assert!(!rig.hw.line_asserted(ControlLine::Open));
    assert_eq!(rig.stored_pair(), (Some(1), Some(1)));

    // The original settle deadline is cancelled: polling past it is a no-op.
    rig.poll(rig.travel_ms());
    rig.poll(rig.travel_ms() + 60_000);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
}

#[test]
fn external_report_at_rest_redefines_both_states() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.report(DoorState::Open, 500);

    assert_eq!(rig.service.current_state(), DoorState::Open);
    assert_eq!(rig.service.target_state(), TargetState::Open);
    // Observation only — the controller must not drive the door.
    assert!(!rig.hw.line_asserted(ControlLine::Open));
    assert!(!rig.hw.line_asserted(ControlLine::Close));
}

#[test]
fn transient_external_report_is_ignored() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.report(DoorState::Opening, 500);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert!(rig.sink.events.iter().all(|e| !matches!(e, AppEvent::ExternalReport(_))));
}

// ── Sensor input ──────────────────────────────────────────────

#[test]
fn sensor_edge_maps_high_to_closed() {
    let config = SystemConfig {
        sensor_input_enabled: true,
        ..Default::default()
    };
    let mut rig = Rig::new(config);
    rig.report(DoorState::Open, 0); // start from Open

    rig.sensor_edge(true, 1_000);
    assert_eq!(rig.service.current_state(), DoorState::Closed);

    rig.sensor_edge(false, 2_000);
    assert_eq!(rig.service.current_state(), DoorState::Open);
}

#[test]
fn sensor_reverse_flips_mapping() {
    let config = SystemConfig {
        sensor_input_enabled: true,
        sensor_input_reverse: true,
        ..Default::default()
    };
    let mut rig = Rig::new(config);

    rig.sensor_edge(false, 1_000);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    rig.sensor_edge(true, 2_000);
    assert_eq!(rig.service.current_state(), DoorState::Open);
}

#[test]
fn sensor_edges_ignored_when_disabled() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.sensor_edge(false, 1_000);
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert!(rig.sink.events.iter().all(|e| !matches!(e, AppEvent::ExternalReport(_))));
}

// ── Idle re-pulse ─────────────────────────────────────────────

#[test]
fn command_at_current_position_still_pulses() {
    let mut rig = Rig::new(SystemConfig::default());

    rig.request(TargetState::Closed, 0).unwrap();
    assert_eq!(rig.service.current_state(), DoorState::Closing);
    assert!(rig.hw.line_asserted(ControlLine::Close));

    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Closed);
    assert_eq!(rig.service.target_state(), TargetState::Closed);
}

// ── Failure tolerance ─────────────────────────────────────────

#[test]
fn store_failure_does_not_block_commands() {
    let config = SystemConfig::default();
    let mut rig = Rig::new(config);
    rig.store.fail_sets = true;

    rig.request(TargetState::Open, 0).unwrap();
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(rig.hw.line_asserted(ControlLine::Open));

    rig.poll(rig.travel_ms());
    assert_eq!(rig.service.current_state(), DoorState::Open);
}

#[test]
fn line_write_failure_retries_on_next_poll() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.hw.fail_writes = true;

    rig.request(TargetState::Open, 0).unwrap();
    // State reflects the attempt even though the relay never moved.
    assert_eq!(rig.service.current_state(), DoorState::Opening);
    assert!(rig.hw.writes.is_empty());

    rig.hw.fail_writes = false;
    rig.poll(50);
    assert!(rig.hw.line_asserted(ControlLine::Open));
}
