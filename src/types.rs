//! # Domain data model
//!
//! GNSS fixes, sensor samples, transmit configuration and the satellite
//! ephemeris table used by the prepass predictor. These types are pure data;
//! none of them own hardware resources.

/// A single GNSS fix, immutable once captured.
///
/// `sec` is kept separate from the minute-resolution fields used on the
/// wire so that `delta_time_loc` (§4.3) can be computed to second precision.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsFix {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    /// Degrees, positive north, in `[-90, 90]`.
    pub latitude: f64,
    /// Degrees, positive east, in `[-180, 180]`.
    pub longitude: f64,
    pub valid: bool,
    pub fix_type: FixType,
    /// Ground speed in mm/s.
    pub ground_speed_mm_s: u32,
    /// Heading in 1/1.42 degree units, as produced by the GNSS driver.
    pub heading_units: u16,
    /// Altitude above MSL, in mm.
    pub altitude_mm: i32,
    pub battery_mv: u16,
    /// Unix epoch seconds this fix's schedule slot was taken at.
    pub schedule_epoch_s: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixType {
    Fix2D,
    Fix3D,
}

impl GpsFix {
    /// Epoch seconds derived from the fix's wall-clock fields, for
    /// `delta_time_loc` age comparisons. Uses a proleptic Gregorian
    /// day count; valid for the 2000-2099 range the tracker operates in.
    pub fn epoch_seconds(&self) -> i64 {
        let y = self.year as i64;
        let m = self.month as i64;
        let d = self.day as i64;
        // Days since epoch via civil_from_days inverse (Howard Hinnant's algorithm).
        let y2 = y - i64::from(m <= 2);
        let era = if y2 >= 0 { y2 } else { y2 - 399 } / 400;
        let yoe = y2 - era * 400;
        let mp = (m + 9) % 12;
        let doy = (153 * mp + 2) / 5 + d - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        let days = era * 146_097 + doe - 719_468;
        days * 86_400 + i64::from(self.hour) * 3600 + i64::from(self.min) * 60 + i64::from(self.sec)
    }
}

/// Per-service sensor sample, up to two double-precision ports.
///
/// Wire interpretation is fixed per service (§3):
/// ALS `port[0]`=lux, PH `port[0]`=pH*1000, Pressure `port[0]`=bar*1000 and
/// `port[1]`=temp*100+4000, SeaTemp `port[0]`=C*1000+100000, Baro
/// `port[0]`=hPa*10.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample {
    pub port: [f64; 2],
}

/// Calibration knob for the baro sensor's pressure conversion.
///
/// The original firmware carried three mutually inconsistent `ads1015.cpp`
/// copies computing hPa from raw voltage (see §9 open question); this crate
/// pins a single affine conversion and never reproduces the duplicated
/// paths. Callers performing the raw ADC -> hPa conversion own that math;
/// this struct only carries the scale/offset they resolved on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaroCalibration {
    pub hpa_scale: f64,
    pub hpa_offset: f64,
}

impl Default for BaroCalibration {
    fn default() -> Self {
        BaroCalibration { hpa_scale: 1.0, hpa_offset: 0.0 }
    }
}

/// Per-service converted sensor attachment, stored alongside a depth pile
/// entry. Values are already in wire-integer form (§3), converted at
/// commit time by the Depth Pile Manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorAttachments {
    pub als_lux: Option<u16>,
    pub ph_x1000: Option<u16>,
    pub pressure_bar_x1000: Option<u32>,
    pub pressure_temp: Option<u16>,
    pub sea_temp: Option<u32>,
    pub baro_hpa_x10: Option<u16>,
}

/// One entry in the depth pile: a GNSS fix plus whatever sensor readings
/// were co-sampled during that GNSS session, and the remaining burst count.
///
/// Invariant I1/§3: `burst_counter > 0` iff the entry is eligible for
/// retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DepthPileEntry {
    pub fix: GpsFix,
    pub sensors: SensorAttachments,
    pub burst_counter: u32,
}

/// Argos uplink mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArgosMode {
    Off,
    Legacy,
    DutyCycle,
    PassPrediction,
}

/// Allowed depth pile sizes (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DepthPileSize {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Eight = 8,
    Twelve = 12,
    Sixteen = 16,
    TwentyFour = 24,
}

impl DepthPileSize {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Argos transmit configuration, `ArgosConfig` of §3.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArgosConfig {
    pub mode: ArgosMode,
    /// Seconds between transmit slots.
    pub tr_nom_s: u32,
    /// 24-bit mask, MSB = hour 0 UTC.
    pub duty_cycle: u32,
    pub power_mw: u16,
    pub frequency_hz: f64,
    pub depth_pile: DepthPileSize,
    /// 0 means unlimited bursts (§9 open question resolution).
    pub ntry_per_message: u32,
    /// 28-bit Argos platform id.
    pub argos_id: u32,
    pub jitter_enabled: bool,
    pub tcxo_warmup_s: u8,
    pub dry_time_before_tx_s: u32,
    pub underwater_en: bool,
    pub lb_en: bool,
    /// Low-battery percentage threshold.
    pub lb_threshold_pct: u8,
    pub prepass_min_elevation_deg: f64,
    pub prepass_max_elevation_deg: f64,
    pub prepass_min_duration_s: u32,
    pub prepass_linear_margin_s: u32,
    pub prepass_comp_step_s: u32,
    pub prepass_max_passes: u32,
    pub time_sync_burst_en: bool,
    pub ooz_en: bool,
}

/// Uplink capability advertised by a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UplinkStatus {
    A2,
    A3,
}

/// One satellite ephemeris entry, `PassPredict` of §3.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SatelliteEphemeris {
    pub hex_id: u32,
    pub downlink: bool,
    pub uplink: Option<UplinkStatus>,
    /// Ephemeris epoch, unix seconds.
    pub epoch_s: i64,
    pub semi_major_axis_km: f64,
    pub inclination_deg: f64,
    pub ascending_node_longitude_deg: f64,
    pub argument_of_perigee_drift_deg_per_s: f64,
    pub orbital_period_min: f64,
    pub semi_major_axis_drift_km_per_s: f64,
}

/// Satellite ephemeris table, version-tagged as persisted (§6).
#[derive(Debug, Clone, Copy)]
pub struct PassPredict<'a> {
    pub version: u32,
    pub satellites: &'a [SatelliteEphemeris],
}

/// Geodetic reference location, cached for prepass elevation computation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Location {
    /// Great-circle distance to `other`, in meters, via the spherical law of
    /// cosines (the same central-angle construction `prepass.rs` uses for
    /// elevation, scaled by Earth's mean radius instead of orbital height).
    pub fn distance_m(&self, other: Location) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_378_137.0;
        let lat1 = self.latitude_deg.to_radians();
        let lat2 = other.latitude_deg.to_radians();
        let dlon = (other.longitude_deg - self.longitude_deg).to_radians();
        let cos_gamma = (lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos()).clamp(-1.0, 1.0);
        cos_gamma.acos() * EARTH_RADIUS_M
    }
}

/// A circular geofence zone (§6 `read_zone`/`write_zone`). The device is
/// "in zone" when its last known location falls within `radius_m` of
/// `center` for at least one `enabled` zone; `ooz_en` in [`ArgosConfig`]
/// only turns the check on, it does not itself define a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Zone {
    pub id: u8,
    pub enabled: bool,
    pub center: Location,
    pub radius_m: f64,
}

/// Delta-time-loc 4-bit code (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeltaTimeLoc {
    Min10 = 1,
    Min15 = 2,
    Min30 = 3,
    Hour1 = 4,
    Hour2 = 5,
    Hour3 = 6,
    Hour4 = 7,
    Hour6 = 8,
    Hour12 = 9,
    Hour24 = 10,
}

impl DeltaTimeLoc {
    /// Classify the absolute age gap between two fixes, per §4.3.
    pub fn from_fixes(a: &GpsFix, b: &GpsFix) -> Self {
        let diff = (a.epoch_seconds() - b.epoch_seconds()).unsigned_abs();
        const MIN: u64 = 60;
        const HOUR: u64 = 3600;
        if diff >= 24 * HOUR {
            DeltaTimeLoc::Hour24
        } else if diff >= 12 * HOUR {
            DeltaTimeLoc::Hour12
        } else if diff >= 6 * HOUR {
            DeltaTimeLoc::Hour6
        } else if diff >= 4 * HOUR {
            DeltaTimeLoc::Hour4
        } else if diff >= 3 * HOUR {
            DeltaTimeLoc::Hour3
        } else if diff >= 2 * HOUR {
            DeltaTimeLoc::Hour2
        } else if diff >= HOUR {
            DeltaTimeLoc::Hour1
        } else if diff >= 30 * MIN {
            DeltaTimeLoc::Min30
        } else if diff >= 15 * MIN {
            DeltaTimeLoc::Min15
        } else {
            DeltaTimeLoc::Min10
        }
    }
}
