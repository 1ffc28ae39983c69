//! # Modem contract
//!
//! §6 "Modem API (consumed contract)": the satellite uplink modem itself
//! (SPI command set, bring-up timing, IRQ handling) is out of scope —
//! platform-specific I/O per §1. This module only fixes the narrow async
//! interface the TX Service drives, following the design note in §9 to
//! replace dynamic dispatch with a compile-time trait at this seam.

use crate::error::TxCoreError;

/// Argos uplink modulation class (§6, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxMode {
    A2,
    A3,
}

/// Modem transmit power levels (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxPower {
    Mw3,
    Mw40,
    Mw200,
    Mw350,
    Mw500,
    Mw750,
    Mw1000,
}

impl TxPower {
    /// Nearest configured power level at or below `mw`, used when mapping
    /// `ArgosConfig::power_mw` (an arbitrary configured value) onto the
    /// modem's fixed power enum.
    pub fn nearest_at_most(mw: u16) -> TxPower {
        if mw >= 1000 {
            TxPower::Mw1000
        } else if mw >= 750 {
            TxPower::Mw750
        } else if mw >= 500 {
            TxPower::Mw500
        } else if mw >= 350 {
            TxPower::Mw350
        } else if mw >= 200 {
            TxPower::Mw200
        } else if mw >= 40 {
            TxPower::Mw40
        } else {
            TxPower::Mw3
        }
    }
}

/// Async contract for the satellite uplink modem. `send` completes once the
/// modem has accepted the frame; the asynchronous `TxComplete` IRQ is
/// reported separately through the peer event bus, not through this trait,
/// matching the real hardware's fire-and-forget transmit sequencing (§5).
pub trait Modem {
    async fn power_on(&mut self) -> Result<(), TxCoreError>;
    async fn power_off(&mut self) -> Result<(), TxCoreError>;
    async fn set_frequency(&mut self, hz: f64) -> Result<(), TxCoreError>;
    async fn set_tcxo_warmup_time(&mut self, seconds: u8) -> Result<(), TxCoreError>;
    async fn set_tx_power(&mut self, power: TxPower) -> Result<(), TxCoreError>;
    /// Issues the frame; `n_bits` may be less than `bytes.len() * 8` since
    /// Argos frames are not byte-aligned in length.
    async fn send(&mut self, mode: TxMode, bytes: &[u8], n_bits: usize) -> Result<(), TxCoreError>;
    async fn stop_send(&mut self) -> Result<(), TxCoreError>;
}
