//! Typed access to the tokens of an AGI reply line

use crate::constants::RESULT_KEY;
use std::fmt;

/// Value of one reply token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    /// `key=value` or bare token text
    Text(String),
    /// Parenthesised flag such as `(timeout)`
    Flag(bool),
}

impl ArgumentValue {
    fn is_truthy(&self) -> bool {
        match self {
            ArgumentValue::Text(s) => !s.is_empty(),
            ArgumentValue::Flag(b) => *b,
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Text(s) => f.write_str(s),
            ArgumentValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// One `(key, value)` pair of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub key: String,
    pub value: ArgumentValue,
}

/// Ordered reply arguments.
///
/// Keys may repeat; every lookup returns the first match. Accessors never
/// fail: a missing or mistyped entry yields the type's empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseArguments {
    args: Vec<Argument>,
}

/// Base-10 prefix parse: optional sign, then digits. Anything else is 0.
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end]
        .parse::<i64>()
        .unwrap_or(0);
    if negative {
        -value
    } else {
        value
    }
}

impl ResponseArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.args.push(Argument {
            key: key.into(),
            value: ArgumentValue::Text(value.into()),
        });
    }

    pub fn add_flag(&mut self, key: impl Into<String>, value: bool) {
        self.args.push(Argument {
            key: key.into(),
            value: ArgumentValue::Flag(value),
        });
    }

    fn find(&self, key: &str) -> Option<&ArgumentValue> {
        self.args
            .iter()
            .find(|a| a.key == key)
            .map(|a| &a.value)
    }

    /// Raw text of `key`, or `""` when absent.
    pub fn string(&self, key: &str) -> &str {
        match self.find(key) {
            Some(ArgumentValue::Text(s)) => s,
            Some(ArgumentValue::Flag(true)) => "true",
            Some(ArgumentValue::Flag(false)) => "false",
            None => "",
        }
    }

    /// `key` as a base-10 integer; absent or non-numeric yields 0.
    pub fn number(&self, key: &str) -> i64 {
        match self.find(key) {
            Some(ArgumentValue::Text(s)) => parse_leading_int(s),
            _ => 0,
        }
    }

    /// Stored flag for `key`; absent or textual entries yield `false`.
    pub fn boolean(&self, key: &str) -> bool {
        matches!(self.find(key), Some(ArgumentValue::Flag(true)))
    }

    /// `number(key)` read as a character code.
    ///
    /// Asterisk reports the DTMF digit pressed during playback this way
    /// (`result=35` is `#`). Code 0 means no digit and yields `""`.
    pub fn char(&self, key: &str) -> String {
        let code = self.number(key);
        if code == 0 {
            return String::new();
        }
        u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    }

    /// Key of the first non-`result` entry with a truthy value.
    ///
    /// Replies like `200 result=1 (SIP/1000-00000001)` carry their payload as
    /// a bare parenthesised token, so the token text itself is the value.
    pub fn nokey(&self) -> &str {
        self.args
            .iter()
            .find(|a| a.key != RESULT_KEY && a.value.is_truthy())
            .map(|a| a.key.as_str())
            .unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args
            .iter()
    }

    pub fn len(&self) -> usize {
        self.args
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.args
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResponseArguments {
        let mut args = ResponseArguments::new();
        args.add_text("result", "35");
        args.add_text("endpos", "1234");
        args.add_flag("timeout", true);
        args.add_text("value", "abc");
        args
    }

    #[test]
    fn test_string_lookup() {
        let args = sample();
        assert_eq!(args.string("endpos"), "1234");
        assert_eq!(args.string("missing"), "");
        assert_eq!(args.string("timeout"), "true");
    }

    #[test]
    fn test_number_lookup() {
        let args = sample();
        assert_eq!(args.number("endpos"), 1234);
        assert_eq!(args.number("value"), 0);
        assert_eq!(args.number("missing"), 0);
        assert_eq!(args.number("timeout"), 0);
    }

    #[test]
    fn test_number_negative_and_prefix() {
        let mut args = ResponseArguments::new();
        args.add_text("result", "-1");
        args.add_text("endpos", "12abc");
        assert_eq!(args.number("result"), -1);
        assert_eq!(args.number("endpos"), 12);
    }

    #[test]
    fn test_boolean_lookup() {
        let args = sample();
        assert!(args.boolean("timeout"));
        assert!(!args.boolean("endpos"));
        assert!(!args.boolean("missing"));
    }

    #[test]
    fn test_char_printable_ascii() {
        for code in 1u8..=126 {
            let mut args = ResponseArguments::new();
            args.add_text("result", code.to_string());
            assert_eq!(args.char("result"), (code as char).to_string());
        }
    }

    #[test]
    fn test_char_zero_is_empty() {
        let mut args = ResponseArguments::new();
        args.add_text("result", "0");
        assert_eq!(args.char("result"), "");
        assert_eq!(args.char("missing"), "");
    }

    #[test]
    fn test_first_match_wins() {
        let mut args = ResponseArguments::new();
        args.add_text("value", "first");
        args.add_text("value", "second");
        assert_eq!(args.string("value"), "first");
    }

    #[test]
    fn test_nokey_skips_result_and_falsy() {
        let mut args = ResponseArguments::new();
        args.add_text("result", "1");
        args.add_text("empty", "");
        args.add_flag("off", false);
        args.add_flag("SIP/1000-00000001", true);
        assert_eq!(args.nokey(), "SIP/1000-00000001");
    }

    #[test]
    fn test_nokey_none() {
        let mut args = ResponseArguments::new();
        args.add_text("result", "1");
        assert_eq!(args.nokey(), "");
    }
}
