//! Call-state values reported by AGI commands.

use serde::Serialize;
use std::fmt;

/// Channel state from `ast_channel_state`, returned by `CHANNEL STATUS` as
/// the `result` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelState {
    /// Channel is down and available
    DownAvailable = 0,
    /// Channel is down, but reserved
    DownReserved = 1,
    /// Channel is off hook
    OffHook = 2,
    /// Digits (or equivalent) have been dialed
    DigitsDialed = 3,
    /// Line is ringing
    Ringing = 4,
    /// Remote end is ringing
    RemoteRinging = 5,
    /// Line is up
    Up = 6,
    /// Line is busy
    Busy = 7,
}

impl ChannelState {
    /// Parse from the numeric `result` of `CHANNEL STATUS`.
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            0 => Some(Self::DownAvailable),
            1 => Some(Self::DownReserved),
            2 => Some(Self::OffHook),
            3 => Some(Self::DigitsDialed),
            4 => Some(Self::Ringing),
            5 => Some(Self::RemoteRinging),
            6 => Some(Self::Up),
            7 => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn as_number(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DownAvailable => "DOWN_AVAILABLE",
            Self::DownReserved => "DOWN_RESERVED",
            Self::OffHook => "OFF_HOOK",
            Self::DigitsDialed => "DIGITS_DIALED",
            Self::Ringing => "RINGING",
            Self::RemoteRinging => "REMOTE_RINGING",
            Self::Up => "UP",
            Self::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

/// Error returned when `DIALSTATUS` holds an unrecognized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDialStatusError(pub String);

impl fmt::Display for ParseDialStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dial status: {}", self.0)
    }
}

impl std::error::Error for ParseDialStatusError {}

define_wire_enum! {
    error_type: ParseDialStatusError,
    /// Outcome of `Dial()`, read back from the `DIALSTATUS` channel variable.
    pub enum DialStatus {
        Answer => "ANSWER",
        Busy => "BUSY",
        NoAnswer => "NOANSWER",
        Cancel => "CANCEL",
        Congestion => "CONGESTION",
        ChanUnavail => "CHANUNAVAIL",
        DontCall => "DONTCALL",
        Torture => "TORTURE",
        InvalidArgs => "INVALIDARGS",
    }
}

/// Error returned when a playback status variable holds an unrecognized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlaybackStatusError(pub String);

impl fmt::Display for ParsePlaybackStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown playback status: {}", self.0)
    }
}

impl std::error::Error for ParsePlaybackStatusError {}

define_wire_enum! {
    error_type: ParsePlaybackStatusError,
    /// Playback outcome from `PLAYBACKSTATUS` / `CPLAYBACKSTATUS`.
    pub enum PlaybackStatus {
        Success => "SUCCESS",
        UserStopped => "USERSTOPPED",
        RemoteStopped => "REMOTESTOPPED",
        Error => "ERROR",
    }
}

impl PlaybackStatus {
    /// Map a status variable value; anything unrecognized counts as `Error`.
    pub fn from_variable(value: &str) -> Self {
        value
            .trim()
            .to_uppercase()
            .parse()
            .unwrap_or(PlaybackStatus::Error)
    }
}
