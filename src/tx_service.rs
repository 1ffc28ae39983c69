//! # TX Service
//!
//! Drives one end-to-end transmit cycle: gate checks (§4.8 I2/I3), schedule
//! computation per mode, frame selection and build, modem command sequencing,
//! and bookkeeping (TX counter, scheduler state) on completion. Owns the
//! depth pile itself since it is the only consumer that ever calls
//! `retrieve`/`retrieve_latest` (§4.4/§4.8).

use crate::config_store::ConfigStore;
use crate::depth_pile::DepthPile;
use crate::error::TxCoreError;
use crate::event::{ImmersionState, PeerEvent};
use crate::modem::{Modem, TxMode, TxPower};
use crate::packet;
use crate::scheduler::{self, JitterSource, SchedulerState};
use crate::types::{ArgosConfig, ArgosMode, DepthPileEntry, Location, PassPredict, SensorAttachments, UplinkStatus, Zone};

/// Fixed transmit power used whenever I4's degrade condition is active
/// (low battery or out of zone), regardless of the configured `power_mw`.
const DEGRADED_POWER_MW: u16 = 350;
/// Depth pile entry count requested per frame whenever I4's degrade
/// condition is active, regardless of the configured `depth_pile` size.
const DEGRADED_DEPTH_PILE: usize = 1;

fn has_sensor_data(s: &SensorAttachments) -> bool {
    s.als_lux.is_some()
        || s.ph_x1000.is_some()
        || s.pressure_bar_x1000.is_some()
        || s.pressure_temp.is_some()
        || s.sea_temp.is_some()
        || s.baro_hpa_x10.is_some()
}

fn uplink_to_tx_mode(uplink: UplinkStatus) -> TxMode {
    match uplink {
        UplinkStatus::A2 => TxMode::A2,
        UplinkStatus::A3 => TxMode::A3,
    }
}

pub struct TxService<M: Modem, C: ConfigStore> {
    modem: M,
    config_store: C,
    depth_pile: DepthPile,
    scheduler_state: SchedulerState,
    jitter: JitterSource,
    running: bool,
    immersion: ImmersionState,
    /// Live battery percentage, compared against `lb_threshold_pct` for the
    /// I4 degrade. Defaults to full so a service that never receives a
    /// `BatteryLevel` event never degrades on battery grounds.
    battery_pct: u8,
    /// Set once any fix (valid or invalid) has ever been stored, so the
    /// time-sync burst condition can tell "no wall clock yet" apart from
    /// "pile is merely dry this cycle".
    ever_stored_fix: bool,
    /// True until the first transmit attempt since the last `start()`,
    /// gating the time-sync burst fallback (§4.8).
    first_tx_since_start: bool,
    next_uplink: UplinkStatus,
    next_tx_epoch_ms: Option<u64>,
}

impl<M: Modem, C: ConfigStore> TxService<M, C> {
    pub fn new(modem: M, config_store: C, jitter_seed: u64) -> Self {
        TxService {
            modem,
            config_store,
            depth_pile: DepthPile::new(),
            scheduler_state: SchedulerState::default(),
            jitter: JitterSource::new(jitter_seed),
            running: false,
            immersion: ImmersionState::Dry,
            battery_pct: 100,
            ever_stored_fix: false,
            first_tx_since_start: true,
            next_uplink: UplinkStatus::A2,
            next_tx_epoch_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.first_tx_since_start = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.next_tx_epoch_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Epoch-ms of the transmit currently scheduled, if any (§6 DTE status).
    pub fn get_last_schedule(&self) -> Option<u64> {
        self.next_tx_epoch_ms
    }

    pub fn store_fix(&mut self, entry: DepthPileEntry) {
        self.depth_pile.store(entry);
        self.ever_stored_fix = true;
    }

    /// Feeds peer-event-bus events the TX Service itself cares about: the
    /// immersion interlock (I3 — dry_time_before_tx holdoff after surfacing)
    /// and the live battery percentage used by I4. `BatteryCritical`/
    /// `BatteryNormal` drive the operational-state machine's own cutoff
    /// elsewhere and carry no separate meaning here. GNSS/sensor correlation
    /// lives in the Depth Pile Manager, not here.
    pub fn on_event(&mut self, event: PeerEvent, cfg: &ArgosConfig, now_ms: u64) {
        match event {
            PeerEvent::Immersion(ImmersionState::Wet) => self.immersion = ImmersionState::Wet,
            PeerEvent::Immersion(ImmersionState::Dry) => {
                self.immersion = ImmersionState::Dry;
                self.scheduler_state.set_earliest_schedule(now_ms + cfg.dry_time_before_tx_s as u64 * 1000);
            }
            PeerEvent::BatteryLevel(pct) => self.battery_pct = pct,
            PeerEvent::ServiceInactive(crate::event::EventSource::GnssSensor) => {}
            _ => {}
        }
    }

    pub fn notify_fix_location(&mut self, loc: Location) {
        self.scheduler_state.set_last_location(loc);
    }

    /// §4.8 gate checks: `mode == Off` and wet immersion (when enabled)
    /// decline the cycle outright. Low battery and out-of-zone never decline
    /// a cycle on their own; they only degrade it (I4, see `degrade_state`).
    fn gate(&self, cfg: &ArgosConfig) -> Result<(), TxCoreError> {
        if !self.running || cfg.mode == ArgosMode::Off {
            return Err(TxCoreError::Gated);
        }
        if cfg.underwater_en && self.immersion == ImmersionState::Wet {
            return Err(TxCoreError::Gated);
        }
        Ok(())
    }

    /// I4: low battery and out-of-zone each independently force a degraded
    /// cycle (`depth_pile` capped to 1, transmit power capped to 350 mW).
    /// Out-of-zone is evaluated against the *dynamic* last-known location,
    /// not the static `ooz_en` flag alone — with no enabled zone configured,
    /// enabling `ooz_en` means "always out of zone".
    fn degrade_state(&self, cfg: &ArgosConfig, zones: &[Zone]) -> (bool, bool) {
        let low_battery_active = cfg.lb_en && self.battery_pct <= cfg.lb_threshold_pct;
        let out_of_zone_active = cfg.ooz_en
            && match self.scheduler_state.last_location {
                Some(loc) => !zones.iter().any(|z| z.enabled && loc.distance_m(z.center) <= z.radius_m),
                None => true,
            };
        (low_battery_active, out_of_zone_active)
    }

    /// §4.6: computes the delay, in ms from `now_ms`, until the next
    /// transmit opportunity, dispatching to the mode-specific scheduler.
    /// Also records the chosen uplink (A2 unless pass prediction selects
    /// A3) and `next_tx_epoch_ms` for [`get_last_schedule`].
    pub fn compute_next_delay(
        &mut self,
        cfg: &ArgosConfig,
        pass_predict: Option<&PassPredict>,
        now_ms: u64,
    ) -> Result<u64, TxCoreError> {
        self.gate(cfg)?;
        let delay_ms = match cfg.mode {
            ArgosMode::Off => return Err(TxCoreError::Gated),
            ArgosMode::Legacy => {
                self.next_uplink = UplinkStatus::A2;
                scheduler::schedule_legacy(cfg, &self.scheduler_state, now_ms, &mut self.jitter)
            }
            ArgosMode::DutyCycle => {
                self.next_uplink = UplinkStatus::A2;
                scheduler::schedule_duty_cycle(cfg, &self.scheduler_state, now_ms).ok_or(TxCoreError::InvalidSchedule)?
            }
            ArgosMode::PassPrediction => {
                let table = pass_predict.ok_or(TxCoreError::InvalidSchedule)?;
                let (delay, uplink) =
                    scheduler::schedule_prepass(cfg, table, &self.scheduler_state, now_ms).ok_or(TxCoreError::InvalidSchedule)?;
                self.next_uplink = uplink;
                delay
            }
        };
        self.next_tx_epoch_ms = Some(now_ms + delay_ms);
        Ok(delay_ms)
    }

    /// Selects a frame: the sensor-augmented format when the most recent
    /// retrieved fix carries any sensor attachment, otherwise the GNSS-only
    /// short/long format per §4.3/§4.4. `depth_pile` entry count is the
    /// configured pile size capped to the per-frame maximum, or 1 when I4's
    /// degrade condition (`degraded`) is active. The time-sync burst path
    /// only fires on the first transmission since `start()` once at least
    /// one fix has ever been stored (§4.8) — a later cycle that merely finds
    /// the pile dry declines instead of falling back to it.
    fn build_frame(&mut self, cfg: &ArgosConfig, ooz_active: bool, degraded: bool) -> Result<([u8; packet::MAX_FRAME_BYTES], usize), TxCoreError> {
        if cfg.time_sync_burst_en && self.first_tx_since_start && self.ever_stored_fix {
            self.first_tx_since_start = false;
            self.next_uplink = UplinkStatus::A2;
            return match self.depth_pile.retrieve_latest() {
                Some(latest) => packet::build_gnss(core::slice::from_ref(&latest), true, ooz_active),
                None => packet::build_gnss(&[], true, ooz_active),
            };
        }

        let want = if degraded { DEGRADED_DEPTH_PILE } else { cfg.depth_pile.as_u8() as usize };
        let (slots, n) = self.depth_pile.retrieve(want);
        if n == 0 {
            return Err(TxCoreError::Gated);
        }
        self.first_tx_since_start = false;

        let first = slots[0].expect("n > 0 guarantees the first slot is occupied");
        let mut fixed = [first; crate::depth_pile::MAX_ENTRIES_PER_FRAME];
        for i in 1..n {
            fixed[i] = slots[i].expect("n entries are contiguous from the front");
        }

        if has_sensor_data(&first.sensors) {
            packet::build_sensor(&first, &first.sensors, false, ooz_active)
        } else {
            packet::build_gnss(&fixed[..n], false, ooz_active)
        }
    }

    /// Runs one transmit cycle end to end: gate, build, key up the modem,
    /// send, key down, and commit the TX counter and scheduler bookkeeping
    /// (§4.8, §5). Leaves the depth pile's burst counters as decremented by
    /// `build_frame`'s `retrieve` even if the send itself fails, matching
    /// the at-most-once semantics `ntry_per_message` describes. `zones` is
    /// the configured geofence list consulted for I4's out-of-zone check;
    /// an empty slice means no zone ever contains the device.
    pub async fn run_cycle(&mut self, cfg: &ArgosConfig, zones: &[Zone], now_ms: u64) -> Result<u32, TxCoreError> {
        self.gate(cfg)?;
        let (low_battery_active, out_of_zone_active) = self.degrade_state(cfg, zones);
        let degraded = low_battery_active || out_of_zone_active;
        let (buf, n_bits) = self.build_frame(cfg, out_of_zone_active, degraded)?;
        let mode = uplink_to_tx_mode(self.next_uplink);
        let n_bytes = n_bits.div_ceil(8);
        let power_mw = if degraded { DEGRADED_POWER_MW } else { cfg.power_mw };

        self.modem.power_on().await?;
        self.modem.set_frequency(cfg.frequency_hz).await?;
        self.modem.set_tcxo_warmup_time(cfg.tcxo_warmup_s).await?;
        self.modem.set_tx_power(TxPower::nearest_at_most(power_mw)).await?;
        self.modem.send(mode, &buf[..n_bytes], n_bits).await?;
        self.modem.power_off().await?;

        self.scheduler_state.notify_tx_complete(now_ms);
        self.config_store.increment_tx_counter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::test_double::MemoryConfigStore;
    use crate::types::{FixType, GpsFix};

    struct FakeModem {
        sent: Option<(TxMode, usize)>,
    }

    impl Modem for FakeModem {
        async fn power_on(&mut self) -> Result<(), TxCoreError> {
            Ok(())
        }
        async fn power_off(&mut self) -> Result<(), TxCoreError> {
            Ok(())
        }
        async fn set_frequency(&mut self, _hz: f64) -> Result<(), TxCoreError> {
            Ok(())
        }
        async fn set_tcxo_warmup_time(&mut self, _seconds: u8) -> Result<(), TxCoreError> {
            Ok(())
        }
        async fn set_tx_power(&mut self, _power: TxPower) -> Result<(), TxCoreError> {
            Ok(())
        }
        async fn send(&mut self, mode: TxMode, _bytes: &[u8], n_bits: usize) -> Result<(), TxCoreError> {
            self.sent = Some((mode, n_bits));
            Ok(())
        }
        async fn stop_send(&mut self) -> Result<(), TxCoreError> {
            Ok(())
        }
    }

    fn cfg() -> ArgosConfig {
        ArgosConfig {
            mode: ArgosMode::Legacy,
            tr_nom_s: 90,
            duty_cycle: 0,
            power_mw: 500,
            frequency_hz: 401_650_000.0,
            depth_pile: crate::types::DepthPileSize::One,
            ntry_per_message: 1,
            argos_id: 0x1234567,
            jitter_enabled: false,
            tcxo_warmup_s: 5,
            dry_time_before_tx_s: 60,
            underwater_en: true,
            lb_en: true,
            lb_threshold_pct: 10,
            prepass_min_elevation_deg: 5.0,
            prepass_max_elevation_deg: 90.0,
            prepass_min_duration_s: 30,
            prepass_linear_margin_s: 86_400,
            prepass_comp_step_s: 30,
            prepass_max_passes: 10,
            time_sync_burst_en: true,
            ooz_en: false,
        }
    }

    fn fix() -> GpsFix {
        GpsFix {
            year: 2024,
            month: 1,
            day: 1,
            hour: 0,
            min: 0,
            sec: 0,
            latitude: 10.0,
            longitude: 20.0,
            valid: true,
            fix_type: FixType::Fix3D,
            ground_speed_mm_s: 0,
            heading_units: 0,
            altitude_mm: 0,
            battery_mv: 4000,
            schedule_epoch_s: 0,
        }
    }

    fn make_service() -> TxService<FakeModem, MemoryConfigStore> {
        let store = MemoryConfigStore { config: cfg(), tx_counter: 0, last_fix: None };
        TxService::new(FakeModem { sent: None }, store, 7)
    }

    #[test]
    fn gate_blocks_when_mode_is_off() {
        let mut svc = make_service();
        svc.start();
        let mut c = cfg();
        c.mode = ArgosMode::Off;
        assert_eq!(svc.compute_next_delay(&c, None, 0), Err(TxCoreError::Gated));
    }

    #[test]
    fn gate_blocks_while_wet() {
        let mut svc = make_service();
        svc.start();
        svc.on_event(PeerEvent::Immersion(ImmersionState::Wet), &cfg(), 0);
        assert_eq!(svc.compute_next_delay(&cfg(), None, 0), Err(TxCoreError::Gated));
    }

    #[test]
    fn drying_out_pushes_earliest_allowed_forward() {
        let mut svc = make_service();
        svc.start();
        let mut c = cfg();
        c.tr_nom_s = 1; // small enough that the dry-time interlock dominates
        svc.on_event(PeerEvent::Immersion(ImmersionState::Dry), &c, 1_000);
        let delay = svc.compute_next_delay(&c, None, 1_000).unwrap();
        assert_eq!(delay, 60_000);
    }

    #[test]
    fn run_cycle_declines_when_no_fix_has_ever_been_received() {
        let mut svc = make_service();
        svc.start();
        assert_eq!(pollster_block_on(svc.run_cycle(&cfg(), &[], 0)), Err(TxCoreError::Gated));
    }

    #[test]
    fn run_cycle_with_a_stored_fix_sends_and_increments_counter() {
        let mut svc = make_service();
        svc.start();
        svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 1 });
        let counter = pollster_block_on(svc.run_cycle(&cfg(), &[], 0)).unwrap();
        assert_eq!(counter, 1);
        let (mode, n_bits) = svc.modem.sent.unwrap();
        assert_eq!(mode, TxMode::A2);
        assert!(n_bits > 0);
    }

    #[test]
    fn first_cycle_uses_time_sync_burst_even_with_an_invalid_fix() {
        let mut svc = make_service();
        svc.start();
        let mut invalid = fix();
        invalid.valid = false;
        svc.store_fix(DepthPileEntry { fix: invalid, sensors: SensorAttachments::default(), burst_counter: 0 });
        pollster_block_on(svc.run_cycle(&cfg(), &[], 0)).unwrap();
        let (_, n_bits) = svc.modem.sent.unwrap();
        assert_eq!(n_bits, 120);
    }

    #[test]
    fn time_sync_burst_does_not_repeat_on_a_later_dry_cycle() {
        let mut svc = make_service();
        svc.start();
        // retrieve_latest ignores burst_counter, so a burst-exhausted entry
        // still supplies the time-sync burst but leaves the normal path dry.
        svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 0 });
        pollster_block_on(svc.run_cycle(&cfg(), &[], 0)).unwrap();
        assert_eq!(pollster_block_on(svc.run_cycle(&cfg(), &[], 1_000)), Err(TxCoreError::Gated));
    }

    /// Burns the first-transmission time-sync burst on an unrelated warm-up
    /// cycle, so a later assertion exercises the degrade path in
    /// `build_frame`'s normal branch rather than the burst branch.
    fn warm_up<M: Modem, C: ConfigStore>(svc: &mut TxService<M, C>, cfg: &ArgosConfig) {
        svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 1 });
        pollster_block_on(svc.run_cycle(cfg, &[], 0)).unwrap();
    }

    #[test]
    fn low_battery_degrades_to_a_short_frame_at_reduced_power() {
        let mut svc = make_service();
        svc.start();
        warm_up(&mut svc, &cfg());
        svc.on_event(PeerEvent::BatteryLevel(5), &cfg(), 1_000);
        for _ in 0..4 {
            svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 10 });
        }
        let mut c = cfg();
        c.depth_pile = crate::types::DepthPileSize::Four;
        pollster_block_on(svc.run_cycle(&c, &[], 1_000)).unwrap();
        let (_, n_bits) = svc.modem.sent.unwrap();
        assert_eq!(n_bits, 120);
    }

    #[test]
    fn out_of_zone_with_no_configured_zone_degrades_every_cycle() {
        let mut svc = make_service();
        svc.start();
        warm_up(&mut svc, &cfg());
        svc.notify_fix_location(Location { latitude_deg: 11.8768, longitude_deg: -33.8232 });
        for _ in 0..4 {
            svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 10 });
        }
        let mut c = cfg();
        c.ooz_en = true;
        c.depth_pile = crate::types::DepthPileSize::Four;
        pollster_block_on(svc.run_cycle(&c, &[], 1_000)).unwrap();
        let (_, n_bits) = svc.modem.sent.unwrap();
        assert_eq!(n_bits, 120);
    }

    #[test]
    fn being_inside_a_configured_zone_does_not_degrade() {
        let mut svc = make_service();
        svc.start();
        warm_up(&mut svc, &cfg());
        let here = Location { latitude_deg: 11.8768, longitude_deg: -33.8232 };
        svc.notify_fix_location(here);
        for _ in 0..4 {
            svc.store_fix(DepthPileEntry { fix: fix(), sensors: SensorAttachments::default(), burst_counter: 10 });
        }
        let mut c = cfg();
        c.ooz_en = true;
        c.depth_pile = crate::types::DepthPileSize::Four;
        let zones = [Zone { id: 0, enabled: true, center: here, radius_m: 1_000.0 }];
        pollster_block_on(svc.run_cycle(&c, &zones, 1_000)).unwrap();
        let (_, n_bits) = svc.modem.sent.unwrap();
        // long frame: 216 payload bits + 32-bit BCH parity.
        assert_eq!(n_bits, 248);
    }

    /// Minimal single-poll executor: every future this crate awaits
    /// (`FakeModem`'s methods) resolves immediately, so one poll suffices
    /// without pulling in a full async test runner.
    fn pollster_block_on<F: core::future::Future>(mut fut: F) -> F::Output {
        use core::pin::pin;
        use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);

        let raw = RawWaker::new(core::ptr::null(), &VTABLE);
        let waker = unsafe { Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = pin!(fut);
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }
}
