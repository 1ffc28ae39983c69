//! # TX scheduler
//!
//! Computes the delay, in milliseconds, until the next instant an uplink
//! may occur, in each of the three modes (§4.6). Pure and deterministic
//! given `(config, scheduler state, now)`; no I/O, no clock reads — the
//! caller supplies `now_ms` so this module stays host-testable.

use crate::prepass::{evaluate_passes, PassSelection};
use crate::types::{ArgosConfig, ArgosMode, Location, PassPredict, UplinkStatus};

const MS_PER_SEC: u64 = 1000;
const SECONDS_PER_HOUR: u64 = 3600;
const HOURS_PER_DAY: u64 = 24;

/// Mutable scheduler state carried across calls (§3 "Scheduler state").
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerState {
    pub last_tx_epoch_ms: u64,
    pub earliest_allowed_tx_epoch_ms: u64,
    pub last_location: Option<Location>,
}

impl SchedulerState {
    pub fn notify_tx_complete(&mut self, now_ms: u64) {
        self.last_tx_epoch_ms = now_ms;
    }

    /// Pushes the earliest-allowed-TX watermark forward (I3, immersion
    /// interlock); never moves it backward.
    pub fn set_earliest_schedule(&mut self, t_ms: u64) {
        if t_ms > self.earliest_allowed_tx_epoch_ms {
            self.earliest_allowed_tx_epoch_ms = t_ms;
        }
    }

    pub fn set_last_location(&mut self, loc: Location) {
        self.last_location = Some(loc);
    }
}

/// A simple linear-congruential PRNG used only for the optional uniform
/// jitter term; deterministic and seedable so tests can reproduce a given
/// jitter sequence without pulling in a `rand` dependency the teacher never
/// carries either.
#[derive(Debug, Clone, Copy)]
pub struct JitterSource(u64);

impl JitterSource {
    pub fn new(seed: u64) -> Self {
        JitterSource(seed | 1)
    }

    /// Uniform value in `[0, bound)`.
    fn next(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (self.0 >> 32) % bound
    }
}

/// §4.6 `schedule_legacy`. Slots are aligned to `tr_nom` seconds since the
/// last transmission; optional uniform jitter in `[0, tr_nom*1000)` is
/// added when `cfg.jitter_enabled`. Never returns less than the remaining
/// time to `earliest_allowed_tx`.
pub fn schedule_legacy(cfg: &ArgosConfig, state: &SchedulerState, now_ms: u64, jitter: &mut JitterSource) -> u64 {
    let period_ms = (cfg.tr_nom_s as u64) * MS_PER_SEC;
    let elapsed = now_ms.saturating_sub(state.last_tx_epoch_ms);
    let next_slot = elapsed.div_ceil(period_ms) * period_ms;
    let mut delay = next_slot - elapsed;
    if cfg.jitter_enabled {
        delay += jitter.next(period_ms);
    }
    let earliest_delay = state.earliest_allowed_tx_epoch_ms.saturating_sub(now_ms);
    delay.max(earliest_delay)
}

/// §4.6 `schedule_duty_cycle`. Iterates UTC hours forward from the current
/// hour (up to 48h ahead) for the first hour whose duty-cycle bit is set
/// and whose hour-aligned start is at or after both `now` and
/// `earliest_allowed_tx`; the slot within that hour aligns to `tr_nom`.
/// Legacy mode is duty-cycle mode with an all-hours mask (§9/SPEC_FULL §4.6).
pub fn schedule_duty_cycle(cfg: &ArgosConfig, state: &SchedulerState, now_ms: u64) -> Option<u64> {
    let duty_cycle = if cfg.mode == ArgosMode::Legacy { 0xFF_FFFF } else { cfg.duty_cycle };
    let now_s = now_ms / MS_PER_SEC;
    let start_of_day_s = now_s - (now_s % (SECONDS_PER_HOUR * HOURS_PER_DAY));
    let tr_nom_s = cfg.tr_nom_s.max(1) as u64;

    let mut slot_s = start_of_day_s;
    let mut hour = 0u64;
    while hour < 2 * HOURS_PER_DAY {
        if is_in_duty_cycle(hour % HOURS_PER_DAY, duty_cycle)
            && slot_s >= now_s
            && slot_s * MS_PER_SEC >= state.earliest_allowed_tx_epoch_ms
        {
            return Some(slot_s * MS_PER_SEC - now_ms);
        }
        slot_s += tr_nom_s;
        hour = slot_s / SECONDS_PER_HOUR;
    }
    None
}

/// `is_in_duty_cycle(h, mask) == ((mask >> (23-h)) & 1) != 0` for `h` in
/// 0..23 (§8 testable property).
pub fn is_in_duty_cycle(hour: u64, mask: u32) -> bool {
    ((mask >> (23 - hour)) & 1) != 0
}

/// §4.6 `schedule_prepass`. Iterates satellites x time windows, returning
/// the earliest valid pass instant and which uplink mode to use. Returns
/// `None` (`INVALID_SCHEDULE`) if there is no valid pass or no last known
/// location.
pub fn schedule_prepass(
    cfg: &ArgosConfig,
    pass_predict: &PassPredict,
    state: &SchedulerState,
    now_ms: u64,
) -> Option<(u64, UplinkStatus)> {
    let location = state.last_location?;
    let now_s = now_ms / MS_PER_SEC;
    let earliest_s = state.earliest_allowed_tx_epoch_ms.div_ceil(MS_PER_SEC).max(now_s);

    let selection: PassSelection = evaluate_passes(cfg, pass_predict, location, earliest_s)?;
    let delay_ms = selection.start_epoch_s.saturating_sub(now_s) * MS_PER_SEC;
    Some((delay_ms, selection.uplink))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cfg() -> ArgosConfig {
        ArgosConfig {
            mode: ArgosMode::Legacy,
            tr_nom_s: 10,
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
            lb_en: false,
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

    #[test]
    fn is_in_duty_cycle_matches_spec_formula() {
        let mask = 0x1u32; // bit 0 set => only hour 23
        for h in 0..24u64 {
            assert_eq!(is_in_duty_cycle(h, mask), ((mask >> (23 - h)) & 1) != 0);
        }
    }

    #[test]
    fn legacy_scenario_1() {
        let cfg = base_cfg();
        let mut jitter = JitterSource::new(1);
        let state = SchedulerState::default();
        assert_eq!(schedule_legacy(&cfg, &state, 0, &mut jitter), 0);
        assert_eq!(schedule_legacy(&cfg, &state, 10_000, &mut jitter), 0);
        assert_eq!(schedule_legacy(&cfg, &state, 20_000, &mut jitter), 0);
        assert_eq!(schedule_legacy(&cfg, &state, 30_000, &mut jitter), 0);
        assert_eq!(schedule_legacy(&cfg, &state, 35_000, &mut jitter), 5_000);
        assert_eq!(schedule_legacy(&cfg, &state, 59_000, &mut jitter), 1_000);
    }

    #[test]
    fn duty_cycle_scenario_2() {
        let mut cfg = base_cfg();
        cfg.mode = ArgosMode::DutyCycle;
        cfg.duty_cycle = 0x1; // only hour 23
        let mut state = SchedulerState::default();
        let delay = schedule_duty_cycle(&cfg, &state, 0).unwrap();
        assert_eq!(delay, 23 * 3_600_000);
        state.notify_tx_complete(23 * 3_600_000);
        let delay2 = schedule_duty_cycle(&cfg, &state, 23 * 3_600_000).unwrap();
        assert_eq!(delay2, 10_000);
    }

    #[test]
    fn duty_cycle_respects_earliest_allowed() {
        let mut cfg = base_cfg();
        cfg.mode = ArgosMode::DutyCycle;
        cfg.duty_cycle = 0xFF_FFFF; // every hour
        cfg.tr_nom_s = 20;
        let mut state = SchedulerState::default();
        state.set_earliest_schedule(50_000);
        let delay = schedule_duty_cycle(&cfg, &state, 0).unwrap();
        assert_eq!(delay, 60_000);
    }
}
