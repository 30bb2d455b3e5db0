//! AGI framing: the metadata block, reply lines and the two-phase parser

use crate::{
    arguments::ResponseArguments,
    buffer::AgiBuffer,
    command::AgiResponse,
    constants::{BLOCK_TERMINATOR, HANGUP_SENTINEL, LINE_TERMINATOR, VALUE_KEY, VARIABLE_PREFIX},
    error::AgiResult,
    variables::{AgiVariable, ChannelVariables},
};
use tracing::trace;

/// Phase of the connection.
///
/// `Init` collects the metadata block; the blank line that ends it moves the
/// parser to `Waiting` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Init,
    Waiting,
}

/// One decoded reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// The call was hung up; no reply is carried on this line.
    Hangup,
    Response(AgiResponse),
}

/// A complete frame taken off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgiMessage {
    /// The metadata block that opens every connection
    Variables(ChannelVariables),
    /// A command reply and the raw line it came from
    Response { line: String, response: AgiResponse },
    /// Hangup notification and its raw line
    Hangup { line: String },
}

/// Parse one reply line (no terminator).
///
/// The first whitespace-separated token is the status code. Remaining tokens
/// become arguments: `key=value` splits on the first `=`, a token containing
/// `(` is a flag named by its text minus the surrounding parentheses, and any
/// other token is stored under `value`. A status code that is not a number is
/// kept as `None` for the caller to reject.
pub fn parse_response_line(line: &str) -> ParsedLine {
    let mut tokens = line.split_whitespace();
    let first = tokens
        .next()
        .unwrap_or("");
    if first == HANGUP_SENTINEL {
        return ParsedLine::Hangup;
    }

    let code = first
        .parse::<u16>()
        .ok();
    let mut arguments = ResponseArguments::new();

    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            arguments.add_text(key.trim(), value.trim());
        } else if token.contains('(') {
            let mut chars = token.chars();
            chars.next();
            chars.next_back();
            arguments.add_flag(chars.as_str(), true);
        } else {
            arguments.add_text(VALUE_KEY, token);
        }
    }

    ParsedLine::Response(AgiResponse::new(code, arguments))
}

/// Parse the `agi_<name>: <value>` block into the metadata record.
///
/// Lines without the `agi_` prefix or naming an attribute this crate does not
/// know are skipped.
pub fn parse_variable_block(block: &str) -> ChannelVariables {
    let mut variables = ChannelVariables::default();

    for line in block.lines() {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (line.trim(), ""),
        };
        let Some(id) = name.strip_prefix(VARIABLE_PREFIX) else {
            continue;
        };
        match id.parse::<AgiVariable>() {
            Ok(variable) => variables.set(variable, value),
            Err(_) => trace!("[INIT] Ignoring unknown variable {}", name),
        }
    }

    variables
}

/// Incremental AGI parser.
///
/// Bytes may arrive in chunks of any size; frames are produced only once
/// complete and partial data stays buffered.
pub struct AgiParser {
    buffer: AgiBuffer,
    state: ContextState,
}

impl AgiParser {
    pub fn new() -> Self {
        Self {
            buffer: AgiBuffer::new(),
            state: ContextState::Init,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Add data to the parser buffer
    pub fn add_data(&mut self, data: &[u8]) -> AgiResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()?;
        Ok(())
    }

    /// Try to take the next complete frame from the buffer.
    pub fn parse_message(&mut self) -> AgiResult<Option<AgiMessage>> {
        match self.state {
            ContextState::Init => {
                let Some(block) = self
                    .buffer
                    .extract_until_pattern(BLOCK_TERMINATOR.as_bytes())
                else {
                    return Ok(None);
                };
                self.buffer
                    .compact();

                let variables = parse_variable_block(&String::from_utf8_lossy(&block));
                self.state = ContextState::Waiting;
                Ok(Some(AgiMessage::Variables(variables)))
            }
            ContextState::Waiting => loop {
                let Some(raw) = self
                    .buffer
                    .extract_until_pattern(LINE_TERMINATOR.as_bytes())
                else {
                    self.buffer
                        .compact();
                    return Ok(None);
                };

                let text = String::from_utf8_lossy(&raw);
                let line = text.trim_end_matches('\r');
                // Stray blank lines between replies are not an error.
                if line
                    .trim()
                    .is_empty()
                {
                    continue;
                }

                let line = line.to_string();
                return Ok(Some(match parse_response_line(&line) {
                    ParsedLine::Hangup => AgiMessage::Hangup { line },
                    ParsedLine::Response(response) => AgiMessage::Response { line, response },
                }));
            },
        }
    }
}

impl Default for AgiParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(line: &str) -> AgiResponse {
        match parse_response_line(line) {
            ParsedLine::Response(r) => r,
            ParsedLine::Hangup => panic!("unexpected hangup for {line}"),
        }
    }

    const BLOCK: &str = "agi_network: yes\n\
agi_network_script: ivr\n\
agi_request: agi://127.0.0.1:3000/ivr\n\
agi_channel: SIP/1000-00000001\n\
agi_language: en\n\
agi_type: SIP\n\
agi_uniqueid: 1700000000.1\n\
agi_version: 20.5.0\n\
agi_callerid: 1000\n\
agi_calleridname: Alice\n\
agi_callingpres: 0\n\
agi_callingani2: 0\n\
agi_callington: 0\n\
agi_callingtns: 0\n\
agi_dnid: 200\n\
agi_rdnis: unknown\n\
agi_context: from-internal\n\
agi_extension: 200\n\
agi_priority: 1\n\
agi_enhanced: 0.0\n\
agi_accountcode: \n\
agi_threadid: 140000000000\n\
agi_arg_1: extra\n\n";

    #[test]
    fn test_parse_result_only() {
        let r = response("200 result=1");
        assert_eq!(r.code(), Some(200));
        assert_eq!(r.result(), 1);
        assert_eq!(r.arguments().len(), 1);
        assert_eq!(r.arguments().string("result"), "1");
    }

    #[test]
    fn test_parse_timeout_flag() {
        let r = response("200 result=0 (timeout)");
        assert_eq!(r.result(), 0);
        assert!(r
            .arguments()
            .boolean("timeout"));
    }

    #[test]
    fn test_parse_endpos() {
        let r = response("510 result=-1 endpos=1234");
        assert_eq!(r.code(), Some(510));
        assert_eq!(r.result(), -1);
        assert_eq!(
            r.arguments()
                .number("endpos"),
            1234
        );
    }

    #[test]
    fn test_parse_variable_value_in_parens() {
        let r = response("200 result=1 (SIP/1000-00000001)");
        assert_eq!(
            r.arguments()
                .nokey(),
            "SIP/1000-00000001"
        );
    }

    #[test]
    fn test_parse_bare_token_and_split_on_first_equals() {
        let r = response("200 result=1 hello data=a=b");
        assert_eq!(
            r.arguments()
                .string("value"),
            "hello"
        );
        assert_eq!(
            r.arguments()
                .string("data"),
            "a=b"
        );
    }

    #[test]
    fn test_parse_malformed_code() {
        let r = response("520-Invalid command syntax.  Proper usage follows:");
        assert_eq!(r.code(), None);
        assert!(!r.is_success());
    }

    #[test]
    fn test_hangup_sentinel() {
        assert_eq!(parse_response_line("HANGUP"), ParsedLine::Hangup);
        assert_eq!(parse_response_line("HANGUP 200 result=1"), ParsedLine::Hangup);
    }

    #[test]
    fn test_variable_block_known_set() {
        let vars = parse_variable_block(BLOCK);
        assert!(vars.network());
        assert_eq!(vars.request(), "agi://127.0.0.1:3000/ivr");
        assert_eq!(vars.channel(), "SIP/1000-00000001");
        assert_eq!(vars.caller_id_name(), "Alice");
        assert_eq!(vars.account_code(), "");
        assert_eq!(vars.thread_id(), "140000000000");
        assert!(vars
            .iter()
            .all(|(v, _)| v.as_str() != "arg_1"));
    }

    #[test]
    fn test_variable_block_round_trip() {
        let vars = parse_variable_block(BLOCK);
        let reparsed = parse_variable_block(&vars.to_wire_block());
        assert_eq!(vars, reparsed);
        for (variable, value) in vars.iter() {
            let expected = format!("{}: {}", variable.wire_name(), value);
            assert!(BLOCK.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_parser_init_then_waiting() {
        let mut parser = AgiParser::new();
        parser
            .add_data(b"agi_channel: X\n\n200 result=1\n")
            .unwrap();

        assert_eq!(parser.state(), ContextState::Init);
        match parser
            .parse_message()
            .unwrap()
        {
            Some(AgiMessage::Variables(vars)) => assert_eq!(vars.channel(), "X"),
            other => panic!("expected variables, got {other:?}"),
        }
        assert_eq!(parser.state(), ContextState::Waiting);

        match parser
            .parse_message()
            .unwrap()
        {
            Some(AgiMessage::Response { line, response }) => {
                assert_eq!(line, "200 result=1");
                assert_eq!(response.result(), 1);
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parser_chunk_boundary_independent() {
        let data = b"agi_channel: X\nagi_context: default\n\n";

        let mut whole = AgiParser::new();
        whole
            .add_data(data)
            .unwrap();
        let expected = whole
            .parse_message()
            .unwrap();

        let mut bytewise = AgiParser::new();
        let mut produced = Vec::new();
        for byte in data.iter() {
            bytewise
                .add_data(std::slice::from_ref(byte))
                .unwrap();
            while let Some(message) = bytewise
                .parse_message()
                .unwrap()
            {
                produced.push(message);
            }
        }

        assert_eq!(produced.len(), 1);
        assert_eq!(Some(produced.remove(0)), expected);
        assert_eq!(bytewise.state(), ContextState::Waiting);
    }

    #[test]
    fn test_parser_partial_reply_stays_buffered() {
        let mut parser = AgiParser::new();
        parser
            .add_data(b"\n\n200 res")
            .unwrap();
        assert!(matches!(
            parser
                .parse_message()
                .unwrap(),
            Some(AgiMessage::Variables(_))
        ));
        assert!(parser
            .parse_message()
            .unwrap()
            .is_none());

        parser
            .add_data(b"ult=0 endpos=80\r\n")
            .unwrap();
        match parser
            .parse_message()
            .unwrap()
        {
            Some(AgiMessage::Response { response, .. }) => {
                assert_eq!(
                    response
                        .arguments()
                        .number("endpos"),
                    80
                );
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_parser_skips_blank_lines_and_reports_hangup() {
        let mut parser = AgiParser::new();
        parser
            .add_data(b"\n\n\n\nHANGUP\n")
            .unwrap();
        parser
            .parse_message()
            .unwrap();
        assert_eq!(
            parser
                .parse_message()
                .unwrap(),
            Some(AgiMessage::Hangup {
                line: "HANGUP".to_string()
            })
        );
    }
}
