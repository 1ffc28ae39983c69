//! # Error taxonomy
//!
//! §7: one flat error type for the whole crate. Local/recoverable vs. fatal
//! is a property of *where* a given variant is handled (gate-checks,
//! retries, FSM transition), not of the type itself.

/// Errors surfaced by the transmission core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum TxCoreError {
    /// Bit packer write would exceed the destination buffer.
    BitPackOverflow,
    /// Configuration store reported corruption.
    ConfigStoreCorrupted,
    /// SPI transaction to the modem failed.
    SpiCommsError,
    ArticCrcFailure,
    ArticBootTimeout,
    ArticIrqTimeout,
    ArticIncorrectStatus,
    /// Sensor channel read returned an out-of-range/invalid reading.
    BadSensorChannel,
    /// Console protocol framing error (never affects TX).
    DteProtocolError,
    BadFilesystem,
    /// No schedule could be computed (`INVALID_SCHEDULE`, §4.6).
    InvalidSchedule,
    /// The scheduler/service is gated off (immersion wet, battery critical,
    /// mode disabled) and declines to transmit this cycle.
    Gated,
}

impl TxCoreError {
    /// Human-readable tag, used in `defmt` log statements in place of a
    /// `core::fmt::Display` impl the teacher crate never needed either.
    pub fn as_str(self) -> &'static str {
        match self {
            TxCoreError::BitPackOverflow => "bitpack-overflow",
            TxCoreError::ConfigStoreCorrupted => "config-store-corrupted",
            TxCoreError::SpiCommsError => "spi-comms-error",
            TxCoreError::ArticCrcFailure => "artic-crc-failure",
            TxCoreError::ArticBootTimeout => "artic-boot-timeout",
            TxCoreError::ArticIrqTimeout => "artic-irq-timeout",
            TxCoreError::ArticIncorrectStatus => "artic-incorrect-status",
            TxCoreError::BadSensorChannel => "bad-sensor-channel",
            TxCoreError::DteProtocolError => "dte-protocol-error",
            TxCoreError::BadFilesystem => "bad-filesystem",
            TxCoreError::InvalidSchedule => "invalid-schedule",
            TxCoreError::Gated => "gated",
        }
    }

    /// §7: whether this error is fatal to the whole device (FSM -> Error)
    /// as opposed to merely aborting and rescheduling the current TX cycle.
    pub fn is_fatal_to_device(self) -> bool {
        matches!(
            self,
            TxCoreError::ConfigStoreCorrupted | TxCoreError::BadFilesystem
        )
    }
}
