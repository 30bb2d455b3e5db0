//! Command formatting and reply handling

use crate::{
    arguments::ResponseArguments,
    constants::{LINE_TERMINATOR, STATUS_OK},
    error::{AgiError, AgiResult},
};

/// Validate that a user-provided string contains no newline characters.
///
/// AGI commands are line-delimited; an embedded newline would let a value
/// inject a second command.
fn validate_no_newlines(s: &str, context: &str) -> AgiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AgiError::protocol_error(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Structured decoding of one reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiResponse {
    code: Option<u16>,
    result: i64,
    arguments: ResponseArguments,
}

impl AgiResponse {
    /// `result` is read from the `result` argument (0 when absent).
    pub fn new(code: Option<u16>, arguments: ResponseArguments) -> Self {
        let result = arguments.number(crate::constants::RESULT_KEY);
        Self {
            code,
            result,
            arguments,
        }
    }

    /// Numeric status code, or `None` when the first token was not a number.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn result(&self) -> i64 {
        self.result
    }

    pub fn arguments(&self) -> &ResponseArguments {
        &self.arguments
    }

    /// `true` if the status code is 200.
    pub fn is_success(&self) -> bool {
        self.code == Some(STATUS_OK)
    }

    /// Require code 200; `message` names the failed operation.
    pub fn require_success(self, message: &str) -> AgiResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_failure(message))
        }
    }

    /// Require code 200 and `result == expected`.
    pub fn require_result(self, expected: i64, message: &str) -> AgiResult<Self> {
        if self.is_success() && self.result == expected {
            Ok(self)
        } else {
            Err(self.into_failure(message))
        }
    }

    /// Require code 200 and `result != rejected`.
    pub fn reject_result(self, rejected: i64, message: &str) -> AgiResult<Self> {
        if self.is_success() && self.result != rejected {
            Ok(self)
        } else {
            Err(self.into_failure(message))
        }
    }

    fn into_failure(self, message: &str) -> AgiError {
        AgiError::command_failed(message, self.code, self.result)
    }
}

/// Builds one AGI command line.
///
/// All quoting lives here so every command renders its arguments the same
/// way: [`arg`](Self::arg) appends a plain word, [`quoted`](Self::quoted)
/// wraps the value in double quotes (escape digits, free text) and
/// [`opt_arg`](Self::opt_arg) appends only when a value is present.
/// Trailing empty optional arguments are never emitted.
///
/// ```
/// use asterisk_agi_tokio::CommandBuilder;
///
/// let line = CommandBuilder::new("STREAM FILE")
///     .arg("demo-congrats").unwrap()
///     .quoted("#").unwrap()
///     .opt_arg(None::<u32>).unwrap()
///     .build();
/// assert_eq!(line, "STREAM FILE demo-congrats \"#\"\n");
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    line: String,
}

impl CommandBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            line: command.to_string(),
        }
    }

    /// Append a bare argument.
    pub fn arg(mut self, value: impl ToString) -> AgiResult<Self> {
        let value = value.to_string();
        validate_no_newlines(&value, "command argument")?;
        self.line
            .push(' ');
        self.line
            .push_str(&value);
        Ok(self)
    }

    /// Append a double-quoted argument. Embedded quotes are backslash-escaped.
    pub fn quoted(mut self, value: impl AsRef<str>) -> AgiResult<Self> {
        let value = value.as_ref();
        validate_no_newlines(value, "command argument")?;
        self.line
            .push_str(" \"");
        for c in value.chars() {
            if c == '"' || c == '\\' {
                self.line
                    .push('\\');
            }
            self.line
                .push(c);
        }
        self.line
            .push('"');
        Ok(self)
    }

    /// Append `value` when present.
    pub fn opt_arg<T: ToString>(self, value: Option<T>) -> AgiResult<Self> {
        match value {
            Some(v) => self.arg(v),
            None => Ok(self),
        }
    }

    /// The finished line including its terminator.
    pub fn build(self) -> String {
        let mut line = self.line;
        line.push_str(LINE_TERMINATOR);
        line
    }

    /// The line without its terminator, as passed to `send_command`.
    pub fn into_command(self) -> String {
        self.line
    }
}

/// Wire form of a raw command: trimmed, newline-free, one terminator.
pub(crate) fn to_wire_line(command: &str) -> AgiResult<String> {
    let command = command.trim();
    validate_no_newlines(command, "command")?;
    let mut line = String::with_capacity(command.len() + 1);
    line.push_str(command);
    line.push_str(LINE_TERMINATOR);
    Ok(line)
}
