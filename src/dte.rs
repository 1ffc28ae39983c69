//! # DTE console protocol contract
//!
//! §6: the console transport and text framing are out of scope (§1), but the
//! command set and its deferred post-response actions are part of this
//! crate's surface since `RESET`/`FACTR` must be sequenced with the TX
//! Service's `stop()` before the device actually resets. Mirrors the
//! `DTECommand`/`DTEAction` split of `dte_handler.hpp`.

use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DteCommand {
    Parml,
    Parmw,
    Parmr,
    Profw,
    Profr,
    Secur,
    Reset,
    Factr,
    Dumpm,
    Zonew,
    Zoner,
}

/// Decode-time error, mirroring `DTEHandler::DTEError`. Carried as the
/// integer error code in every `_RESP` frame (`0` = OK).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DteError {
    Ok,
    IncorrectCommand,
    NoLengthDelimiter,
    NoDataDelimiter,
    DataLengthMismatch,
    IncorrectData,
}

impl DteError {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Action deferred until after the `_RESP` frame has been sent, since the
/// DTE peer must see the response before the device acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DteAction {
    None,
    /// Grants OTA firmware command privileges; no timing requirement.
    Secur,
    /// Device resets 3s after the `RESET_RESP` is sent (§6).
    Reset,
    /// Device resets immediately after the `FACTR_RESP` is sent (§6).
    Factr,
}

/// The deferred action a successfully handled command schedules, per §6's
/// "After responding to FACTR the device must reset; after responding to
/// RESET the device resets after 3s." Only `SECUR`/`RESET`/`FACTR` carry a
/// deferred action, and only when `error == DteError::Ok`.
pub fn action_for(command: DteCommand, error: DteError) -> DteAction {
    if error != DteError::Ok {
        return DteAction::None;
    }
    match command {
        DteCommand::Secur => DteAction::Secur,
        DteCommand::Reset => DteAction::Reset,
        DteCommand::Factr => DteAction::Factr,
        _ => DteAction::None,
    }
}

/// Delay from "response sent" to "device resets", for `Reset`/`Factr`.
/// `None` for actions that do not reset the device.
pub fn reset_delay(action: DteAction) -> Option<Duration> {
    match action {
        DteAction::Reset => Some(Duration::from_secs(3)),
        DteAction::Factr => Some(Duration::from_secs(0)),
        DteAction::Secur | DteAction::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_and_factr_defer_after_success_only() {
        assert_eq!(action_for(DteCommand::Reset, DteError::Ok), DteAction::Reset);
        assert_eq!(action_for(DteCommand::Reset, DteError::IncorrectData), DteAction::None);
        assert_eq!(action_for(DteCommand::Factr, DteError::Ok), DteAction::Factr);
    }

    #[test]
    fn other_commands_never_schedule_an_action() {
        assert_eq!(action_for(DteCommand::Parml, DteError::Ok), DteAction::None);
        assert_eq!(action_for(DteCommand::Dumpm, DteError::Ok), DteAction::None);
    }

    #[test]
    fn reset_waits_three_seconds_factr_is_immediate() {
        assert_eq!(reset_delay(DteAction::Reset), Some(Duration::from_secs(3)));
        assert_eq!(reset_delay(DteAction::Factr), Some(Duration::from_secs(0)));
        assert_eq!(reset_delay(DteAction::Secur), None);
    }
}
