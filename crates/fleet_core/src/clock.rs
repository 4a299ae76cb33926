//! Virtual simulation clock and event queue.
//!
//! Events are ordered by `(timestamp, sequence)`: the sequence is a monotonically
//! increasing insertion counter, so events scheduled for the same millisecond pop
//! in the order they were scheduled. Popping an event advances `now`; the clock
//! never moves backwards.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Kicks off the trip generator and every vehicle process.
    SimulationStarted,
    /// Trip generator wakes up and produces one request.
    TripRequest,
    /// Idle-loop wake-up for one vehicle.
    VehicleWake,
    /// Vehicle reached the rider and finished the pickup delay.
    PickupReached,
    /// Vehicle reached the dropoff and finished the dropoff delay.
    DropoffReached,
    /// Vehicle arrived at the depot and joins the charger queue.
    DepotArrival,
    /// A charger finished charging a vehicle.
    ChargeComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Vehicle(Entity),
    /// Idle-loop wake carrying the vehicle's pending-wake token at scheduling time.
    /// A wake whose token no longer matches the vehicle's is stale and ignored.
    Wake(Entity, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
    sequence: u64,
}

impl Event {
    pub fn vehicle(&self) -> Option<Entity> {
        match self.subject {
            Some(EventSubject::Vehicle(entity)) | Some(EventSubject::Wake(entity, _)) => Some(entity),
            None => None,
        }
    }

    pub fn wake_token(&self) -> Option<u64> {
        match self.subject {
            Some(EventSubject::Wake(_, token)) => Some(token),
            _ => None,
        }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (timestamp, sequence).
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed by the schedule.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    next_sequence: u64,
    events: BinaryHeap<Event>,
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule an event at an absolute simulation time. Times in the past are
    /// clamped to `now` so the clock stays monotonic.
    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        debug_assert!(
            timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(Event {
            timestamp: timestamp.max(self.now),
            kind,
            subject,
            sequence,
        });
    }

    pub fn schedule_in(&mut self, delay_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now.saturating_add(delay_ms), kind, subject);
    }

    pub fn schedule_in_secs(&mut self, secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in(secs.saturating_mul(ONE_SEC_MS), kind, subject);
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Drop every queued event at or after `end_ms`. Returns how many were dropped.
    pub fn drop_from(&mut self, end_ms: u64) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.timestamp < end_ms);
        before - self.events.len()
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Convert a duration in hours to whole simulation milliseconds (at least 1 ms
/// for any positive duration, so distinct moves never collapse to zero time).
pub fn hours_to_ms(hours: f64) -> u64 {
    if hours.is_nan() || hours <= 0.0 {
        return 0;
    }
    ((hours * ONE_HOUR_MS as f64).round() as u64).max(1)
}
