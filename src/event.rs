//! # Peer event bus
//!
//! §4.5/§5: sensor and GNSS services publish lifecycle events that the
//! Depth Pile Manager and TX Service react to; ordering within a given
//! source is guaranteed (a GNSS INACTIVE can never overtake its preceding
//! LOG_UPDATED). Modeled with `embassy_sync::pubsub::PubSubChannel`, the
//! same embassy family the teacher already depends on for `embassy-time`.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};

use crate::types::SensorSample;

/// Event sources named in §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventSource {
    GnssSensor,
    Als,
    Ph,
    Pressure,
    SeaTemp,
    Baro,
    UwSensor,
}

/// Immersion transition carried by `UwSensor` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImmersionState {
    Wet,
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeerEvent {
    ServiceActive(EventSource),
    ServiceInactive(EventSource),
    LogUpdated(EventSource, SensorSample),
    /// Carried by `UwSensor` `ServiceActive`/`ServiceInactive` pairs in the
    /// original firmware; split out here since immersion transitions gate
    /// transmission directly (I2/I3) rather than feeding the depth pile.
    Immersion(ImmersionState),
    BatteryCritical,
    BatteryNormal,
    /// Live battery percentage (0-100), polled independently of the
    /// `BatteryCritical`/`BatteryNormal` FSM transition pair; the TX Service
    /// compares this against `lb_threshold_pct` for the I4 degrade (§4.8),
    /// which is a different threshold than the FSM's critical cutoff.
    BatteryLevel(u8),
    TxComplete,
}

/// Max simultaneous subscribers: Depth Pile Manager and TX Service.
const SUBSCRIBERS: usize = 2;
/// Max simultaneous publishers: each sensor service plus GNSS plus UW/battery.
const PUBLISHERS: usize = 8;
/// Bounded queue depth; a task-context single-threaded run loop drains
/// every posted event before the next can be published (§5).
const QUEUE_DEPTH: usize = 16;

pub type Bus = PubSubChannel<NoopRawMutex, PeerEvent, QUEUE_DEPTH, SUBSCRIBERS, PUBLISHERS>;
pub type BusPublisher<'a> = Publisher<'a, NoopRawMutex, PeerEvent, QUEUE_DEPTH, SUBSCRIBERS, PUBLISHERS>;
pub type BusSubscriber<'a> = Subscriber<'a, NoopRawMutex, PeerEvent, QUEUE_DEPTH, SUBSCRIBERS, PUBLISHERS>;
