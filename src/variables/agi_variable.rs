//! Typed names of the `agi_*` metadata attributes.

use crate::constants::VARIABLE_PREFIX;

/// Error returned when parsing an unrecognized AGI attribute id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAgiVariableError(pub String);

impl std::fmt::Display for ParseAgiVariableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AGI variable: {}", self.0)
    }
}

impl std::error::Error for ParseAgiVariableError {}

define_wire_enum! {
    error_type: ParseAgiVariableError,
    /// Attribute ids Asterisk sends before the first command (the part after
    /// the `agi_` prefix).
    ///
    /// Anything Asterisk adds in later versions (e.g. `agi_arg_1`) does not
    /// parse and is ignored by the metadata parser.
    pub enum AgiVariable {
        Network => "network",
        NetworkScript => "network_script",
        Request => "request",
        Channel => "channel",
        Language => "language",
        Type => "type",
        UniqueId => "uniqueid",
        Version => "version",
        CallerId => "callerid",
        CallerIdName => "calleridname",
        CallingPres => "callingpres",
        CallingAni2 => "callingani2",
        CallingTon => "callington",
        CallingTns => "callingtns",
        Dnid => "dnid",
        Rdnis => "rdnis",
        Context => "context",
        Extension => "extension",
        Priority => "priority",
        Enhanced => "enhanced",
        AccountCode => "accountcode",
        ThreadId => "threadid",
    }
}

impl AgiVariable {
    /// Full attribute name as it appears on the wire (`agi_callerid`).
    pub fn wire_name(&self) -> String {
        format!("{}{}", VARIABLE_PREFIX, self.as_str())
    }
}
