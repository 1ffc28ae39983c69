//! # Prepass predictor
//!
//! Propagates each satellite's ground track from its ephemeris sample with
//! a deterministic two-body (circular orbit + inclination) approximation —
//! no ephemeris fitting — then finds valid visibility windows at the last
//! known fix location via the spherical law of cosines (§4.7).

use core::f64::consts::PI;

use crate::types::{ArgosConfig, Location, PassPredict, SatelliteEphemeris, UplinkStatus};

const EARTH_RADIUS_KM: f64 = 6378.137;
/// Sidereal rotation rate of the Earth, degrees per second.
const EARTH_ROTATION_DEG_PER_S: f64 = 360.0 / 86_164.0905;

fn deg2rad(d: f64) -> f64 {
    d * PI / 180.0
}
fn rad2deg(r: f64) -> f64 {
    r * 180.0 / PI
}

/// Sub-satellite ground point and current orbital radius at `epoch_s`.
struct GroundTrack {
    lat_deg: f64,
    lon_deg: f64,
    radius_km: f64,
}

fn propagate(eph: &SatelliteEphemeris, epoch_s: i64) -> GroundTrack {
    let dt = (epoch_s - eph.epoch_s) as f64;
    let period_s = eph.orbital_period_min * 60.0;
    let revolutions = dt / period_s;
    let phase = 2.0 * PI * revolutions.fract() * if revolutions >= 0.0 { 1.0 } else { -1.0 }
        + 2.0 * PI * revolutions.trunc().fract()
        + deg2rad(eph.argument_of_perigee_drift_deg_per_s * dt);
    let theta = phase;
    let incl = deg2rad(eph.inclination_deg);

    let lat = (incl.sin() * theta.sin()).asin();
    let dlon = (incl.cos() * theta.sin()).atan2(theta.cos());
    let earth_rotation = EARTH_ROTATION_DEG_PER_S * dt;
    let lon_deg = wrap_deg(eph.ascending_node_longitude_deg + rad2deg(dlon) - earth_rotation);

    let radius_km = eph.semi_major_axis_km + eph.semi_major_axis_drift_km_per_s * dt;

    GroundTrack { lat_deg: rad2deg(lat), lon_deg, radius_km }
}

fn wrap_deg(mut d: f64) -> f64 {
    while d > 180.0 {
        d -= 360.0;
    }
    while d < -180.0 {
        d += 360.0;
    }
    d
}

/// Elevation angle, in degrees, of a satellite at `radius_km` whose
/// sub-satellite point is `track`, as seen from `observer`. Uses the
/// spherical law of cosines to get the central angle, then the standard
/// circular-orbit elevation relation `tan(E) = (cos(gamma) - Re/r) / sin(gamma)`.
fn elevation_deg(track: &GroundTrack, observer: Location) -> f64 {
    let lat1 = deg2rad(track.lat_deg);
    let lat2 = deg2rad(observer.latitude_deg);
    let dlon = deg2rad(track.lon_deg - observer.longitude_deg);
    let cos_gamma = (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos()).clamp(-1.0, 1.0);
    let gamma = cos_gamma.acos();
    if gamma < 1.0e-9 {
        return 90.0;
    }
    let ratio = EARTH_RADIUS_KM / track.radius_km;
    rad2deg((cos_gamma - ratio).atan2(gamma.sin()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSelection {
    pub start_epoch_s: u64,
    pub uplink: UplinkStatus,
}

/// §4.6/§4.7: scans `[earliest_s, earliest_s + linear_margin_s]` in
/// `comp_step_s` steps for each satellite advertising an uplink capability,
/// forming passes (contiguous spans with elevation above `min_elevation`)
/// and keeping the earliest one whose peak stays below `max_elevation` and
/// whose above-minimum duration is at least `min_duration`. Ties on start
/// time prefer the higher uplink capability (A3 over A2).
pub fn evaluate_passes(
    cfg: &ArgosConfig,
    pass_predict: &PassPredict,
    observer: Location,
    earliest_s: u64,
) -> Option<PassSelection> {
    let mut best: Option<PassSelection> = None;
    let mut passes_found: u32 = 0;

    for sat in pass_predict.satellites {
        let Some(uplink) = sat.uplink else { continue };
        if passes_found >= cfg.prepass_max_passes {
            break;
        }

        let mut in_pass = false;
        let mut pass_start_s: u64 = 0;
        let mut pass_peak: f64 = f64::MIN;
        let mut t = earliest_s;
        let end = earliest_s + cfg.prepass_linear_margin_s as u64;
        let step = cfg.prepass_comp_step_s.max(1) as u64;

        while t <= end {
            let track = propagate(sat, t as i64);
            let elevation = elevation_deg(&track, observer);
            let above_min = elevation >= cfg.prepass_min_elevation_deg;

            if above_min && !in_pass {
                in_pass = true;
                pass_start_s = t;
                pass_peak = elevation;
            } else if above_min && in_pass {
                if elevation > pass_peak {
                    pass_peak = elevation;
                }
            } else if !above_min && in_pass {
                in_pass = false;
                let duration_s = t.saturating_sub(pass_start_s);
                passes_found += 1;
                if pass_peak < cfg.prepass_max_elevation_deg && duration_s as u32 >= cfg.prepass_min_duration_s {
                    let candidate = PassSelection { start_epoch_s: pass_start_s, uplink };
                    best = Some(pick_better(best, candidate));
                }
                if passes_found >= cfg.prepass_max_passes {
                    break;
                }
            }
            t += step;
        }

        if in_pass {
            let duration_s = end.saturating_sub(pass_start_s);
            if pass_peak < cfg.prepass_max_elevation_deg && duration_s as u32 >= cfg.prepass_min_duration_s {
                let candidate = PassSelection { start_epoch_s: pass_start_s, uplink };
                best = Some(pick_better(best, candidate));
            }
        }
    }

    best
}

fn pick_better(current: Option<PassSelection>, candidate: PassSelection) -> PassSelection {
    match current {
        None => candidate,
        Some(cur) => {
            if candidate.start_epoch_s < cur.start_epoch_s {
                candidate
            } else if candidate.start_epoch_s > cur.start_epoch_s {
                cur
            } else if candidate.uplink > cur.uplink {
                candidate
            } else {
                cur
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ArgosConfig {
        ArgosConfig {
            mode: crate::types::ArgosMode::PassPrediction,
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
            lb_en: false,
            lb_threshold_pct: 10,
            prepass_min_elevation_deg: 5.0,
            prepass_max_elevation_deg: 90.0,
            prepass_min_duration_s: 60,
            prepass_linear_margin_s: 3 * 86_400,
            prepass_comp_step_s: 15,
            prepass_max_passes: 20,
            time_sync_burst_en: true,
            ooz_en: false,
        }
    }

    fn polar_low_earth_orbit() -> SatelliteEphemeris {
        // A near-polar LEO, 101 minute period, ascending node over the
        // observer's longitude at epoch so a pass occurs quickly.
        SatelliteEphemeris {
            hex_id: 0xA,
            downlink: true,
            uplink: Some(UplinkStatus::A3),
            epoch_s: 0,
            semi_major_axis_km: 7200.0,
            inclination_deg: 98.7,
            ascending_node_longitude_deg: 0.0,
            argument_of_perigee_drift_deg_per_s: 0.0,
            orbital_period_min: 101.0,
            semi_major_axis_drift_km_per_s: 0.0,
        }
    }

    #[test]
    fn finds_a_valid_pass_for_a_visible_satellite() {
        let cfg = cfg();
        let table = [polar_low_earth_orbit()];
        let pass_predict = PassPredict { version: 1, satellites: &table };
        let observer = Location { latitude_deg: 0.0, longitude_deg: 0.0 };
        let selection = evaluate_passes(&cfg, &pass_predict, observer, 0).expect("expected a visible pass");
        assert_eq!(selection.uplink, UplinkStatus::A3);
    }

    #[test]
    fn no_pass_without_uplink_capable_satellites() {
        let cfg = cfg();
        let mut sat = polar_low_earth_orbit();
        sat.uplink = None;
        let table = [sat];
        let pass_predict = PassPredict { version: 1, satellites: &table };
        let observer = Location { latitude_deg: 0.0, longitude_deg: 0.0 };
        assert!(evaluate_passes(&cfg, &pass_predict, observer, 0).is_none());
    }

    #[test]
    fn earliest_allowed_tx_is_respected() {
        let cfg = cfg();
        let table = [polar_low_earth_orbit()];
        let pass_predict = PassPredict { version: 1, satellites: &table };
        let observer = Location { latitude_deg: 0.0, longitude_deg: 0.0 };
        let unconstrained = evaluate_passes(&cfg, &pass_predict, observer, 0).unwrap();
        let pushed = evaluate_passes(&cfg, &pass_predict, observer, unconstrained.start_epoch_s + 1).unwrap();
        assert!(pushed.start_epoch_s > unconstrained.start_epoch_s);
    }
}
