//! Event queue feeding the main control loop.
//!
//! Events carry control ticks, target commands, external state reports,
//! and debounced sensor edges.  The main loop consumes them one at a
//! time in FIFO order.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Producer     │────▶│  Event Queue │────▶│  Main Loop   │
//! │ (one task)   │     │  (lock-free) │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! The ring is strictly single-producer, single-consumer.  As wired, the
//! main loop task is the sole producer (ticks and sensor edges); host or
//! transport glue calling [`push_event`] from another task must funnel
//! through that one producer context, since concurrent producers would
//! race on the head index.
//!
//! Each event packs into a single byte: the high nibble is the kind, the
//! low nibble carries the payload tag (target, observed state, or sensor
//! level).  This keeps the ring buffer a flat `[u8; N]` that ISR callbacks
//! can write without allocation.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::fsm::{DoorState, TargetState};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

/// Inbound events for the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Control loop tick; the handler samples the clock and polls deadlines.
    ControlTick,
    /// A target-state command arrived from the exposure layer.
    TargetCommand(TargetState),
    /// An external truth source reported the door state.
    ExternalReport(DoorState),
    /// Debounced position-sensor edge with its raw level.
    SensorEdge(bool),
}

// Nibble layout of the packed byte.
const KIND_CONTROL_TICK: u8 = 0x00;
const KIND_TARGET_COMMAND: u8 = 0x10;
const KIND_EXTERNAL_REPORT: u8 = 0x20;
const KIND_SENSOR_EDGE: u8 = 0x30;

impl Event {
    fn pack(self) -> u8 {
        match self {
            Self::ControlTick => KIND_CONTROL_TICK,
            Self::TargetCommand(t) => KIND_TARGET_COMMAND | t.tag(),
            Self::ExternalReport(s) => KIND_EXTERNAL_REPORT | s.tag(),
            Self::SensorEdge(level) => KIND_SENSOR_EDGE | u8::from(level),
        }
    }

    fn unpack(raw: u8) -> Option<Self> {
        let payload = raw & 0x0F;
        match raw & 0xF0 {
            KIND_CONTROL_TICK => Some(Self::ControlTick),
            KIND_TARGET_COMMAND => TargetState::from_tag(payload).map(Self::TargetCommand),
            KIND_EXTERNAL_REPORT => DoorState::from_tag(payload).map(Self::ExternalReport),
            KIND_SENSOR_EDGE => Some(Self::SensorEdge(payload != 0)),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Producers write, main loop reads (consume).
// Uses atomic head/tail indices.  The buffer is intentionally
// kept in a static so ISR callbacks can access it.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: each slot is written by the producer strictly before the head
// index advances past it (Release store), and read by the consumer only
// after observing the advanced head (Acquire load).  One producer, one
// consumer; no slot is ever accessed concurrently.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free), but only from the single
/// producer context; see the module docs.
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full — drop event.
    }

    // SAFETY: single producer; the slot at `head` is not visible to the
    // consumer until the Release store below.
    unsafe {
        EVENT_BUFFER[head as usize] = event.pack();
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    // SAFETY: single consumer; the Acquire load of head above guarantees
    // the producer's write to this slot is visible.
    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    Event::unpack(raw)
}

/// Drain all pending events into a callback.
/// Processes events in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Check if the event queue is empty.
pub fn queue_is_empty() -> bool {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);
    tail == head
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_all_variants() {
        let all = [
            Event::ControlTick,
            Event::TargetCommand(TargetState::Open),
            Event::TargetCommand(TargetState::Closed),
            Event::ExternalReport(DoorState::Open),
            Event::ExternalReport(DoorState::Closed),
            Event::ExternalReport(DoorState::Opening),
            Event::ExternalReport(DoorState::Closing),
            Event::SensorEdge(false),
            Event::SensorEdge(true),
        ];
        for e in all {
            assert_eq!(Event::unpack(e.pack()), Some(e));
        }
    }

    #[test]
    fn unknown_kind_unpacks_to_none() {
        assert_eq!(Event::unpack(0xF0), None);
        assert_eq!(Event::unpack(0x1F), None, "invalid target tag");
    }
}
