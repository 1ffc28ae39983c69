//! # Operational FSM
//!
//! §4.9: boot/operational/configuration/error lifecycle. Pure state machine
//! driven by explicit events and a periodic `poll_timeouts` tick; owns no
//! hardware or timers itself, matching C6-C8's host-testable style.

use embassy_time::{Duration, Instant};

use crate::error::TxCoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationalState {
    Boot,
    PreOperational,
    Operational,
    Configuration,
    BatteryCritical,
    Error,
    Off,
}

/// Reed-switch gestures (§4.9): `Engage`/`Release` only drive an LED cue
/// elsewhere and are accepted here for completeness but never transition
/// the FSM on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReedGesture {
    Engage,
    Release,
    ShortHold,
    LongHold,
}

/// Watchdog settle tick before Boot -> PreOperational on a successful mount.
const BOOT_SETTLE: Duration = Duration::from_secs(1);
/// "Brief delay" before PreOperational -> Operational (§4.9), not otherwise
/// specified; pinned here rather than left a magic number at the call site.
const PRE_OPERATIONAL_SETTLE: Duration = Duration::from_millis(500);
/// Console inactivity timeout out of Configuration (§4.9: "≥ 5 min").
const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// BatteryCritical -> Off timeout; not numerically specified by §4.9, chosen
/// generous enough to flush a final low-battery DTE status frame.
const BATTERY_CRITICAL_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Fsm {
    state: OperationalState,
    entered_at: Instant,
    mount_ok: Option<bool>,
    console_last_activity: Instant,
}

impl Fsm {
    pub fn new(now: Instant) -> Self {
        Fsm { state: OperationalState::Boot, entered_at: now, mount_ok: None, console_last_activity: now }
    }

    pub fn state(&self) -> OperationalState {
        self.state
    }

    fn enter(&mut self, state: OperationalState, now: Instant) {
        self.state = state;
        self.entered_at = now;
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    /// Boot: result of mounting storage, after the caller has already
    /// attempted format+mount on first failure (§4.9 "on failure try
    /// format+mount"). `Ok` schedules the settle tick to PreOperational;
    /// `Err` is the hard failure that sends Boot straight to Error.
    pub fn on_storage_mount_result(&mut self, result: Result<(), ()>, now: Instant) {
        if self.state != OperationalState::Boot {
            return;
        }
        match result {
            Ok(()) => self.mount_ok = Some(true),
            Err(()) => self.enter(OperationalState::Error, now),
        }
    }

    pub fn on_battery_critical(&mut self, now: Instant) {
        if matches!(self.state, OperationalState::Operational | OperationalState::PreOperational) {
            self.enter(OperationalState::BatteryCritical, now);
        }
    }

    /// A fatal device error (§7 `is_fatal_to_device`) forces Error from any
    /// state other than Off.
    pub fn on_fatal_error(&mut self, err: TxCoreError, now: Instant) {
        if err.is_fatal_to_device() && self.state != OperationalState::Off {
            self.enter(OperationalState::Error, now);
        }
    }

    pub fn on_console_activity(&mut self, now: Instant) {
        self.console_last_activity = now;
    }

    /// §4.9: short hold toggles Operational <-> Configuration; long hold
    /// forces Off from any state.
    pub fn on_reed_gesture(&mut self, gesture: ReedGesture, now: Instant) {
        match gesture {
            ReedGesture::LongHold => {
                if self.state != OperationalState::Off {
                    self.enter(OperationalState::Off, now);
                }
            }
            ReedGesture::ShortHold => match self.state {
                OperationalState::Operational => self.enter(OperationalState::Configuration, now),
                OperationalState::Configuration => {
                    self.console_last_activity = now;
                    self.enter(OperationalState::Operational, now);
                }
                _ => {}
            },
            ReedGesture::Engage | ReedGesture::Release => {}
        }
    }

    pub fn on_wake(&mut self, now: Instant) {
        if self.state == OperationalState::Off {
            self.mount_ok = None;
            self.enter(OperationalState::Boot, now);
        }
    }

    /// Call periodically; advances timeout-driven transitions (§4.9). Must
    /// be fed the live battery-critical flag since PreOperational's branch
    /// depends on it at the moment of entry into Operational.
    pub fn poll_timeouts(&mut self, now: Instant, battery_critical: bool) {
        match self.state {
            OperationalState::Boot => {
                if self.mount_ok == Some(true) && self.elapsed(now) >= BOOT_SETTLE {
                    self.enter(OperationalState::PreOperational, now);
                }
            }
            OperationalState::PreOperational => {
                if battery_critical {
                    self.enter(OperationalState::BatteryCritical, now);
                } else if self.elapsed(now) >= PRE_OPERATIONAL_SETTLE {
                    self.enter(OperationalState::Operational, now);
                }
            }
            OperationalState::Configuration => {
                if now.saturating_duration_since(self.console_last_activity) >= CONFIGURATION_TIMEOUT {
                    self.enter(OperationalState::Off, now);
                }
            }
            OperationalState::BatteryCritical => {
                if self.elapsed(now) >= BATTERY_CRITICAL_TIMEOUT {
                    self.enter(OperationalState::Off, now);
                }
            }
            OperationalState::Error => {
                if self.elapsed(now) >= ERROR_TIMEOUT {
                    self.enter(OperationalState::Off, now);
                }
            }
            OperationalState::Operational | OperationalState::Off => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_settles_to_pre_operational_then_operational() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_storage_mount_result(Ok(()), t0);
        fsm.poll_timeouts(t0 + Duration::from_millis(999), false);
        assert_eq!(fsm.state(), OperationalState::Boot);
        fsm.poll_timeouts(t0 + BOOT_SETTLE, false);
        assert_eq!(fsm.state(), OperationalState::PreOperational);
        fsm.poll_timeouts(t0 + BOOT_SETTLE + PRE_OPERATIONAL_SETTLE, false);
        assert_eq!(fsm.state(), OperationalState::Operational);
    }

    #[test]
    fn mount_failure_goes_straight_to_error_then_off() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_storage_mount_result(Err(()), t0);
        assert_eq!(fsm.state(), OperationalState::Error);
        fsm.poll_timeouts(t0 + ERROR_TIMEOUT, false);
        assert_eq!(fsm.state(), OperationalState::Off);
    }

    #[test]
    fn battery_critical_from_operational_then_off_after_timeout() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_storage_mount_result(Ok(()), t0);
        fsm.poll_timeouts(t0 + BOOT_SETTLE + PRE_OPERATIONAL_SETTLE, false);
        assert_eq!(fsm.state(), OperationalState::Operational);
        fsm.on_battery_critical(t0 + Duration::from_secs(10));
        assert_eq!(fsm.state(), OperationalState::BatteryCritical);
        fsm.poll_timeouts(t0 + Duration::from_secs(10) + BATTERY_CRITICAL_TIMEOUT, false);
        assert_eq!(fsm.state(), OperationalState::Off);
    }

    #[test]
    fn short_hold_toggles_operational_and_configuration() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_storage_mount_result(Ok(()), t0);
        fsm.poll_timeouts(t0 + BOOT_SETTLE + PRE_OPERATIONAL_SETTLE, false);
        fsm.on_reed_gesture(ReedGesture::ShortHold, t0 + Duration::from_secs(20));
        assert_eq!(fsm.state(), OperationalState::Configuration);
        fsm.on_reed_gesture(ReedGesture::ShortHold, t0 + Duration::from_secs(21));
        assert_eq!(fsm.state(), OperationalState::Operational);
    }

    #[test]
    fn configuration_inactivity_times_out_to_off() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_storage_mount_result(Ok(()), t0);
        fsm.poll_timeouts(t0 + BOOT_SETTLE + PRE_OPERATIONAL_SETTLE, false);
        fsm.on_reed_gesture(ReedGesture::ShortHold, t0 + Duration::from_secs(20));
        fsm.poll_timeouts(t0 + Duration::from_secs(20) + CONFIGURATION_TIMEOUT, false);
        assert_eq!(fsm.state(), OperationalState::Off);
    }

    #[test]
    fn long_hold_forces_off_from_any_state() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_reed_gesture(ReedGesture::LongHold, t0);
        assert_eq!(fsm.state(), OperationalState::Off);
    }

    #[test]
    fn wake_from_off_returns_to_boot() {
        let t0 = Instant::from_secs(0);
        let mut fsm = Fsm::new(t0);
        fsm.on_reed_gesture(ReedGesture::LongHold, t0);
        fsm.on_wake(t0 + Duration::from_secs(5));
        assert_eq!(fsm.state(), OperationalState::Boot);
    }
}
