//! Webhook report parsing — the external truth source boundary.
//!
//! A home-automation system (or the operator's own bridge) POSTs a JSON
//! body whenever it observes the real door move.  The body shape is not
//! ours to define, so the field holding the boolean door state is located
//! by a dotted path expression from config, e.g. `"garage.door_open"`.
//!
//! Parsing is pure and total: a malformed report is rejected here with a
//! typed [`ReportError`] and never reaches the controller.

use crate::config::SystemConfig;
use crate::error::ReportError;
use crate::events::{push_event, Event};
use crate::fsm::DoorState;

/// Extract the observed door state from a webhook JSON body.
///
/// The boolean at `json_path` reads as "door is open"; `invert` flips
/// that for systems that report "door is closed" instead.
pub fn parse_report(body: &str, json_path: &str, invert: bool) -> Result<DoorState, ReportError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| ReportError::NotJson)?;

    let mut node = &value;
    for segment in json_path.split('.') {
        node = node.get(segment).ok_or(ReportError::PathMissing)?;
    }

    let open = node.as_bool().ok_or(ReportError::NotBoolean)?;
    let open = open != invert;

    Ok(if open {
        DoorState::Open
    } else {
        DoorState::Closed
    })
}

/// Transport entry point: parse a webhook body and enqueue the observation.
///
/// Listener registration lives in the integrator's network stack; its glue
/// calls this with the raw body, from the queue's single producer context,
/// and the parse error is returned so the transport can answer with an
/// appropriate status code.
pub fn accept_report(body: &str, config: &SystemConfig) -> Result<(), ReportError> {
    let observed = parse_report(
        body,
        config.webhook_json_path.as_str(),
        config.webhook_reverse,
    )?;
    if !push_event(Event::ExternalReport(observed)) {
        log::warn!("event queue full, external report dropped");
    }
    Ok(())
}
