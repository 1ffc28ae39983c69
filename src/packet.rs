//! # Packet builder
//!
//! Composes the certification, GNSS-only and sensor-augmented Argos uplink
//! frames (§4.3), bit-exact. There is no header: a frame is its payload
//! followed by a BCH parity tail (certification frames are a plain byte
//! passthrough with neither). The payload's leading byte is a CRC8 checksum
//! of everything that follows it up to the parity (`bch::BchCode::CRC8`),
//! computed last and patched in once the rest of the payload is packed.

use crate::bch::BchCode;
use crate::bitpack::pack;
use crate::error::TxCoreError;
use crate::types::{DeltaTimeLoc, DepthPileEntry, FixType, SensorAttachments};

const SHORT_PAYLOAD_BITS: usize = 99;
const LONG_PAYLOAD_BITS: usize = 216;

/// Bits of the long/sensor frame's first-fix prelude, up through battery:
/// crc8(8) + day(5) + hour(5) + min(6) + lat(21) + lon(22) + speed(8) + batt(8).
const PRELUDE_BITS: usize = 83;

const LON_LAT_RESOLUTION: f64 = 10_000.0;
const MV_PER_UNIT: u32 = 28;
const DEGREES_PER_UNIT: f64 = 1.0 / 1.42;

/// Max frame size in bytes across all formats (long frame, 31 bytes).
pub const MAX_FRAME_BYTES: usize = 31;

/// §4.3: sign bit 20 for latitude, convert degrees to the 1/10000-degree
/// unsigned magnitude with an explicit sign bit (never two's complement).
fn convert_latitude(deg: f64) -> u32 {
    if deg >= 0.0 {
        (deg * LON_LAT_RESOLUTION) as u32
    } else {
        (((-deg) * LON_LAT_RESOLUTION) as u32) | (1 << 20)
    }
}

/// Sign bit 21 for longitude.
fn convert_longitude(deg: f64) -> u32 {
    if deg >= 0.0 {
        (deg * LON_LAT_RESOLUTION) as u32
    } else {
        (((-deg) * LON_LAT_RESOLUTION) as u32) | (1 << 21)
    }
}

/// Forces `value`'s low bit to `flag`, leaving the rest untouched. The speed
/// and battery fields each give up their LSB this way to carry the sync/ooz
/// flags rather than a dedicated header bit.
fn flagged_byte(value: u32, flag: bool) -> u32 {
    (value & !1) | (flag as u32)
}

/// Packs the day/hour/min/lat/lon/speed run common to every format, then the
/// fields specific to the short format (heading, altitude) when requested.
/// `sync` rides the speed byte's LSB. Returns the position after the last
/// field written.
fn pack_fix_core(
    buf: &mut [u8],
    mut pos: usize,
    entry: &DepthPileEntry,
    sync: bool,
    include_heading_altitude: bool,
) -> Result<usize, TxCoreError> {
    let fix = &entry.fix;
    pos = pack(buf, pos, fix.day as u32, 5)?;
    pos = pack(buf, pos, fix.hour as u32, 5)?;
    pos = pack(buf, pos, fix.min as u32, 6)?;

    if fix.valid {
        pos = pack(buf, pos, convert_latitude(fix.latitude), 21)?;
        pos = pack(buf, pos, convert_longitude(fix.longitude), 22)?;
        let speed_kmh = (3600u64 * fix.ground_speed_mm_s as u64) / 1_000_000;
        pos = pack(buf, pos, flagged_byte(speed_kmh as u32, sync), 8)?;
        if include_heading_altitude {
            let heading_deg = (fix.heading_units as f64 * DEGREES_PER_UNIT) as u32;
            pos = pack(buf, pos, heading_deg, 8)?;
            let alt_m = if fix.fix_type == FixType::Fix2D { 0xFF } else { (fix.altitude_mm / 1000) as u32 };
            pos = pack(buf, pos, alt_m, 8)?;
        }
    } else {
        pos = pack(buf, pos, 0xFFFF_FFFF, 21)?;
        pos = pack(buf, pos, 0xFFFF_FFFF, 22)?;
        pos = pack(buf, pos, flagged_byte(0xFF, sync), 8)?;
        if include_heading_altitude {
            pos = pack(buf, pos, 0xFF, 8)?;
            pos = pack(buf, pos, 0xFF, 8)?;
        }
    }
    Ok(pos)
}

/// Patches the leading CRC8 byte: checksum of every payload bit after it,
/// not including the BCH parity that follows.
fn finish_with_crc8(buf: &mut [u8], payload_bits: usize) -> Result<usize, TxCoreError> {
    let crc = BchCode::CRC8.encode(buf, 8, payload_bits - 8);
    pack(buf, 0, crc, 8)?;
    Ok(payload_bits)
}

/// Builds a manufacturing certification frame: the input bytes, verbatim,
/// with no header, no CRC8 and no BCH parity. Used by factory test tooling,
/// never by the normal TX cycle.
pub fn build_certification(hex_id_bytes: &[u8]) -> Result<([u8; MAX_FRAME_BYTES], usize), TxCoreError> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let mut pos = 0;
    for &byte in hex_id_bytes {
        pos = pack(&mut buf, pos, byte as u32, 8)?;
    }
    Ok((buf, pos))
}

/// Builds the short (single fix) or long (2-4 fix) GNSS frame, selected by
/// `entries.len()`. `entries[1..]` are ignored when only a short frame is
/// requested (`entries.len() == 1`).
pub fn build_gnss(entries: &[DepthPileEntry], sync: bool, ooz: bool) -> Result<([u8; MAX_FRAME_BYTES], usize), TxCoreError> {
    if entries.len() <= 1 {
        build_short(entries.first(), sync, ooz)
    } else {
        build_long(entries, sync, ooz)
    }
}

fn build_short(entry: Option<&DepthPileEntry>, sync: bool, ooz: bool) -> Result<([u8; MAX_FRAME_BYTES], usize), TxCoreError> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let mut pos = pack(&mut buf, 0, 0, 8)?;

    pos = match entry {
        Some(e) => {
            let p = pack_fix_core(&mut buf, pos, e, sync, true)?;
            pack(&mut buf, p, flagged_byte((e.fix.battery_mv as u32) / MV_PER_UNIT, ooz), 8)?
        }
        None => {
            let p = pack(&mut buf, pos, 0xFFFF_FFFF, 5)?;
            let p = pack(&mut buf, p, 0xFFFF_FFFF, 5)?;
            let p = pack(&mut buf, p, 0xFFFF_FFFF, 6)?;
            let p = pack(&mut buf, p, 0xFFFF_FFFF, 21)?;
            let p = pack(&mut buf, p, 0xFFFF_FFFF, 22)?;
            let p = pack(&mut buf, p, flagged_byte(0xFF, sync), 8)?;
            let p = pack(&mut buf, p, 0xFF, 8)?;
            let p = pack(&mut buf, p, 0xFF, 8)?;
            pack(&mut buf, p, flagged_byte(0xFF, ooz), 8)?
        }
    };
    debug_assert_eq!(pos, SHORT_PAYLOAD_BITS);

    let payload_bits = finish_with_crc8(&mut buf, pos)?;
    let parity = BchCode::B127_106_3.encode(&buf, 0, payload_bits);
    let pos = pack(&mut buf, pos, parity, BchCode::B127_106_3.parity_bits())?;
    Ok((buf, pos))
}

fn build_long(entries: &[DepthPileEntry], sync: bool, ooz: bool) -> Result<([u8; MAX_FRAME_BYTES], usize), TxCoreError> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let pos = pack(&mut buf, 0, 0, 8)?;

    let first = &entries[0];
    let pos = pack_fix_core(&mut buf, pos, first, sync, false)?;
    let mut pos = pack(&mut buf, pos, flagged_byte((first.fix.battery_mv as u32) / MV_PER_UNIT, ooz), 8)?;

    let delta = if entries.len() >= 2 {
        DeltaTimeLoc::from_fixes(&first.fix, &entries[1].fix)
    } else {
        DeltaTimeLoc::Min10
    };
    pos = pack(&mut buf, pos, delta as u32, 4)?;

    for i in 1..4usize {
        pos = match entries.get(i) {
            Some(e) if e.fix.valid => {
                let p = pack(&mut buf, pos, convert_latitude(e.fix.latitude), 21)?;
                pack(&mut buf, p, convert_longitude(e.fix.longitude), 22)?
            }
            _ => {
                let p = pack(&mut buf, pos, 0xFFFF_FFFF, 21)?;
                pack(&mut buf, p, 0xFFFF_FFFF, 22)?
            }
        };
    }
    debug_assert_eq!(pos, LONG_PAYLOAD_BITS);

    let payload_bits = finish_with_crc8(&mut buf, pos)?;
    let parity = BchCode::B255_223_4.encode(&buf, 0, payload_bits);
    let pos = pack(&mut buf, pos, parity, BchCode::B255_223_4.parity_bits())?;
    Ok((buf, pos))
}

/// Builds the sensor-augmented frame: the long frame's first-fix prelude
/// (through battery, no delta/heading/altitude) followed by each enabled
/// sensor's field in order (ALS, PH, Pressure, SeaTemp, Baro), then BCH
/// parity sized to the actual total payload bits, always with the long
/// code. A sensor left `None` contributes zero bits.
pub fn build_sensor(
    entry: &DepthPileEntry,
    sensors: &SensorAttachments,
    sync: bool,
    ooz: bool,
) -> Result<([u8; MAX_FRAME_BYTES], usize), TxCoreError> {
    let mut buf = [0u8; MAX_FRAME_BYTES];
    let pos = pack(&mut buf, 0, 0, 8)?;
    let pos = pack_fix_core(&mut buf, pos, entry, sync, false)?;
    let mut pos = pack(&mut buf, pos, flagged_byte((entry.fix.battery_mv as u32) / MV_PER_UNIT, ooz), 8)?;
    debug_assert_eq!(pos, PRELUDE_BITS);

    if let Some(v) = sensors.als_lux {
        pos = pack(&mut buf, pos, v as u32, 16)?;
    }
    if let Some(v) = sensors.ph_x1000 {
        pos = pack(&mut buf, pos, v as u32, 14)?;
    }
    if let Some(v) = sensors.pressure_bar_x1000 {
        pos = pack(&mut buf, pos, v, 20)?;
    }
    if let Some(v) = sensors.pressure_temp {
        pos = pack(&mut buf, pos, v as u32, 13)?;
    }
    if let Some(v) = sensors.sea_temp {
        pos = pack(&mut buf, pos, v, 18)?;
    }
    if let Some(v) = sensors.baro_hpa_x10 {
        pos = pack(&mut buf, pos, v as u32, 15)?;
    }

    let payload_bits = finish_with_crc8(&mut buf, pos)?;
    let parity = BchCode::B255_223_4.encode(&buf, 0, payload_bits);
    let pos = pack(&mut buf, pos, parity, BchCode::B255_223_4.parity_bits())?;
    Ok((buf, pos))
}
