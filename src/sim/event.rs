//! Timed events that drive a simulation: load profiles, grid operator
//! signals and vehicle arrivals/departures.

use std::collections::VecDeque;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Payload of a vehicle arrival.
///
/// Fields left `None` leave nothing to carry over: an arrival without a
/// station or departure estimate clears them on the vehicle.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleUpdate {
    pub connected_charging_station: Option<String>,
    pub estimated_time_of_departure: Option<NaiveDateTime>,
    /// New desired SOC, if the arrival changes it.
    pub desired_soc: Option<f64>,
    /// SOC change since the vehicle was last seen (usually negative).
    pub soc_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleAction {
    Arrival(VehicleUpdate),
    Departure,
}

/// What happens when an event starts.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Named generation component on a grid connector; `value` is the
    /// (positive) generated power in kW.
    LocalEnergyGeneration {
        grid_connector_id: String,
        name: String,
        value: f64,
    },
    /// Named fixed load component on a grid connector (kW).
    FixedLoad {
        grid_connector_id: String,
        name: String,
        value: f64,
    },
    /// New connector ceiling; `None` leaves the ceiling unchanged.
    GridOperatorSignal {
        grid_connector_id: String,
        max_power: Option<f64>,
    },
    Vehicle {
        vehicle_id: String,
        action: VehicleAction,
    },
}

/// An event becomes known at `signal_time` and takes effect at `start_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub signal_time: NaiveDateTime,
    pub start_time: NaiveDateTime,
    pub kind: EventKind,
}

impl Event {
    /// Creates an event signalled at the moment it starts.
    pub fn at(start_time: NaiveDateTime, kind: EventKind) -> Self {
        Self {
            signal_time: start_time,
            start_time,
            kind,
        }
    }

    /// Sets an earlier signal time.
    pub fn signalled_at(mut self, signal_time: NaiveDateTime) -> Self {
        self.signal_time = signal_time;
        self
    }

    /// Grid connector this event targets directly, if any.
    pub fn grid_connector_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::LocalEnergyGeneration {
                grid_connector_id, ..
            }
            | EventKind::FixedLoad {
                grid_connector_id, ..
            }
            | EventKind::GridOperatorSignal {
                grid_connector_id, ..
            } => Some(grid_connector_id),
            EventKind::Vehicle { .. } => None,
        }
    }
}

/// Moves every signal time forward so that each event is known at least
/// `horizon` before it starts, never before `sim_start`, and stably sorts
/// the events by start time.
///
/// # Returns
///
/// The number of events whose signal time moved earlier.
pub fn signal_in_advance(
    events: &mut [Event],
    horizon: TimeDelta,
    sim_start: NaiveDateTime,
) -> usize {
    let mut changed = 0;
    for event in events.iter_mut() {
        let earliest = event
            .start_time
            .checked_sub_signed(horizon)
            .unwrap_or(sim_start);
        let signal = event.signal_time.min(earliest).max(sim_start);
        if signal < event.signal_time {
            changed += 1;
        }
        event.signal_time = signal;
    }
    events.sort_by_key(|e| e.start_time);
    changed
}

/// Events not yet signalled, ordered by signal time.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: VecDeque<Event>,
}

impl EventQueue {
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.signal_time);
        Self {
            pending: events.into(),
        }
    }

    /// Removes and returns every event with `signal_time <= now`.
    pub fn release_until(&mut self, now: NaiveDateTime) -> Vec<Event> {
        let due = self
            .pending
            .iter()
            .take_while(|e| e.signal_time <= now)
            .count();
        self.pending.drain(..due).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
