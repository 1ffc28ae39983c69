//! # Depth pile manager
//!
//! Correlates a GNSS session (`ServiceActive`..`ServiceInactive` window on
//! `EventSource::GnssSensor`) with whichever enabled sensor services
//! reported a sample during that window, converts each sample to its
//! wire-integer form (§3), and commits the combined entry to the depth
//! pile with `burst_counter = ntry_per_message` (or unlimited when zero,
//! §9). A sensor that never reports within 2s of GNSS going inactive is
//! simply omitted from the committed entry rather than blocking it.

use embassy_time::{Duration, Instant};

use crate::depth_pile::DepthPile;
use crate::event::{EventSource, ImmersionState, PeerEvent};
use crate::types::{BaroCalibration, DepthPileEntry, GpsFix, SensorAttachments, SensorSample};

/// Timeout after GNSS INACTIVE before a non-reporting sensor's silence is
/// treated as final (§3/§4.5).
pub const SENSOR_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledSensors {
    pub als: bool,
    pub ph: bool,
    pub pressure: bool,
    pub sea_temp: bool,
    pub baro: bool,
}

impl EnabledSensors {
    pub const NONE: EnabledSensors = EnabledSensors { als: false, ph: false, pressure: false, sea_temp: false, baro: false };

    fn is_enabled(&self, source: EventSource) -> bool {
        match source {
            EventSource::Als => self.als,
            EventSource::Ph => self.ph,
            EventSource::Pressure => self.pressure,
            EventSource::SeaTemp => self.sea_temp,
            EventSource::Baro => self.baro,
            _ => false,
        }
    }
}

#[derive(Default)]
struct Session {
    active: bool,
    fix: Option<GpsFix>,
    samples: [Option<SensorSample>; 5],
    reported: [bool; 5],
    inactive_at: Option<Instant>,
}

fn sensor_slot(source: EventSource) -> Option<usize> {
    match source {
        EventSource::Als => Some(0),
        EventSource::Ph => Some(1),
        EventSource::Pressure => Some(2),
        EventSource::SeaTemp => Some(3),
        EventSource::Baro => Some(4),
        _ => None,
    }
}

pub struct DepthPileManager {
    enabled: EnabledSensors,
    baro_cal: BaroCalibration,
    ntry_per_message: u32,
    session: Session,
}

impl DepthPileManager {
    pub fn new(enabled: EnabledSensors, baro_cal: BaroCalibration, ntry_per_message: u32) -> Self {
        DepthPileManager { enabled, baro_cal, ntry_per_message, session: Session::default() }
    }

    pub fn set_ntry_per_message(&mut self, n: u32) {
        self.ntry_per_message = n;
    }

    fn burst_counter(&self) -> u32 {
        if self.ntry_per_message == 0 {
            u32::MAX
        } else {
            self.ntry_per_message
        }
    }

    /// Processes one peer-event-bus event against the in-progress session.
    /// Returns a completed entry to commit when the session closes with at
    /// least one subscribed sensor already reported; otherwise `None`
    /// (commit may still happen later via [`poll_timeout`]).
    pub fn on_event(&mut self, event: PeerEvent, fix_on_active: impl FnOnce() -> Option<GpsFix>, now: Instant) -> Option<DepthPileEntry> {
        match event {
            PeerEvent::ServiceActive(EventSource::GnssSensor) => {
                self.session = Session { active: true, fix: fix_on_active(), ..Session::default() };
                None
            }
            PeerEvent::ServiceInactive(EventSource::GnssSensor) => {
                if !self.session.active {
                    return None;
                }
                self.session.active = false;
                self.session.inactive_at = Some(now);
                if self.session.reported.iter().enumerate().any(|(i, &r)| r && self.enabled.is_enabled(slot_source(i))) {
                    self.commit()
                } else {
                    None
                }
            }
            PeerEvent::LogUpdated(source, sample) => {
                if self.session.active {
                    if let Some(slot) = sensor_slot(source) {
                        self.session.samples[slot] = Some(sample);
                        self.session.reported[slot] = true;
                    }
                }
                None
            }
            PeerEvent::Immersion(_) | PeerEvent::BatteryCritical | PeerEvent::BatteryNormal | PeerEvent::TxComplete => None,
            PeerEvent::ServiceActive(_) | PeerEvent::ServiceInactive(_) => None,
        }
    }

    /// Call periodically (e.g. every tick) once the GNSS session has gone
    /// inactive; commits the entry once 2s have elapsed since INACTIVE even
    /// if some subscribed sensors never reported.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<DepthPileEntry> {
        if self.session.active {
            return None;
        }
        let inactive_at = self.session.inactive_at?;
        if self.session.fix.is_none() {
            return None;
        }
        if now.saturating_duration_since(inactive_at) >= SENSOR_TIMEOUT {
            self.commit()
        } else {
            None
        }
    }

    fn commit(&mut self) -> Option<DepthPileEntry> {
        let fix = self.session.fix.take()?;
        let mut sensors = SensorAttachments::default();
        if self.enabled.als {
            if let Some(s) = self.session.samples[0] {
                sensors.als_lux = Some(convert_als(s));
            }
        }
        if self.enabled.ph {
            if let Some(s) = self.session.samples[1] {
                sensors.ph_x1000 = Some(convert_ph(s));
            }
        }
        if self.enabled.pressure {
            if let Some(s) = self.session.samples[2] {
                let (bar, temp) = convert_pressure(s);
                sensors.pressure_bar_x1000 = Some(bar);
                sensors.pressure_temp = Some(temp);
            }
        }
        if self.enabled.sea_temp {
            if let Some(s) = self.session.samples[3] {
                sensors.sea_temp = Some(convert_sea_temp(s));
            }
        }
        if self.enabled.baro {
            if let Some(s) = self.session.samples[4] {
                sensors.baro_hpa_x10 = Some(convert_baro(s, &self.baro_cal));
            }
        }
        self.session.inactive_at = None;
        Some(DepthPileEntry { fix, sensors, burst_counter: self.burst_counter() })
    }

    /// Commits the pending entry (if timed out) into the pile; a thin
    /// convenience wrapper so callers don't need to hold both types.
    pub fn drain_into(&mut self, pile: &mut DepthPile, now: Instant) {
        if let Some(entry) = self.poll_timeout(now) {
            pile.store(entry);
        }
    }
}

fn slot_source(slot: usize) -> EventSource {
    match slot {
        0 => EventSource::Als,
        1 => EventSource::Ph,
        2 => EventSource::Pressure,
        3 => EventSource::SeaTemp,
        _ => EventSource::Baro,
    }
}

fn convert_als(s: SensorSample) -> u16 {
    s.port[0].clamp(0.0, 65535.0) as u16
}

fn convert_ph(s: SensorSample) -> u16 {
    (s.port[0] * 1000.0).clamp(0.0, 14000.0) as u16
}

fn convert_pressure(s: SensorSample) -> (u32, u16) {
    let bar = (s.port[0] * 1000.0).clamp(0.0, (1u32 << 20) as f64 - 1.0) as u32;
    let temp = (s.port[1] * 100.0 + 4000.0).clamp(0.0, (1u32 << 13) as f64 - 1.0) as u16;
    (bar, temp)
}

fn convert_sea_temp(s: SensorSample) -> u32 {
    (s.port[0] * 1000.0 + 100_000.0).clamp(0.0, (1u32 << 18) as f64 - 1.0) as u32
}

fn convert_baro(s: SensorSample, cal: &BaroCalibration) -> u16 {
    let hpa = s.port[0] * cal.hpa_scale + cal.hpa_offset;
    (hpa * 10.0).clamp(0.0, (1u32 << 15) as f64 - 1.0) as u16
}
