//! Typed AGI commands on [`AgiChannel`]
//!
//! Each wrapper renders one line with [`CommandBuilder`], sends it with
//! [`AgiChannel::send_command`] and checks the reply: status code 200 plus
//! the result value the command is documented to return on success. Anything
//! else becomes [`AgiError::CommandFailed`] carrying the code and result.
//!
//! Timeouts are taken in seconds and sent in milliseconds, as AGI expects.

use crate::{
    channel::{ChannelState, DialStatus, PlaybackStatus},
    command::{AgiResponse, CommandBuilder},
    connection::AgiChannel,
    error::{AgiError, AgiResult},
};
use tracing::debug;

/// Asterisk's own defaults for the positional `CONTROL STREAM FILE` options.
const DEFAULT_SKIP_MS: u32 = 3000;
const DEFAULT_FAST_FORWARD: char = '#';
const DEFAULT_REWIND: char = '*';

/// Digit pressed during playback and where playback stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitResult {
    /// The DTMF digit, or `""` if none was pressed
    pub digit: String,
    /// Sample offset where playback ended
    pub endpos: i64,
}

/// Reply of `GET DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataResult {
    pub digits: String,
    /// Input ended because the timeout elapsed
    pub timeout: bool,
}

/// Reply of `RECEIVE CHAR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveCharResult {
    pub character: String,
    pub timeout: bool,
}

/// Reply of `RECORD FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordResult {
    pub digit: String,
    pub endpos: i64,
    pub timeout: bool,
}

/// Outcome of `CONTROL STREAM FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStreamResult {
    pub digit: String,
    /// From `CPLAYBACKSTATUS`
    pub playback_status: PlaybackStatus,
    /// From `CPLAYBACKOFFSET`, in milliseconds
    pub playback_offset: i64,
}

/// Optional controls for `CONTROL STREAM FILE`.
///
/// The options are positional on the wire; when a later one is set, unset
/// earlier ones are sent with Asterisk's defaults.
#[derive(Debug, Clone, Default)]
pub struct ControlStreamOptions {
    pub skip_ms: Option<u32>,
    pub fast_forward: Option<char>,
    pub rewind: Option<char>,
    pub pause: Option<char>,
}

impl ControlStreamOptions {
    fn wire_args(&self) -> Vec<String> {
        let mut args = vec![
            self.skip_ms
                .map(|v| v.to_string()),
            self.fast_forward
                .map(String::from),
            self.rewind
                .map(String::from),
            self.pause
                .map(String::from),
        ];
        while matches!(args.last(), Some(None)) {
            args.pop();
        }
        let defaults = [
            DEFAULT_SKIP_MS.to_string(),
            DEFAULT_FAST_FORWARD.to_string(),
            DEFAULT_REWIND.to_string(),
        ];
        args.into_iter()
            .enumerate()
            .map(|(i, arg)| {
                arg.unwrap_or_else(|| {
                    defaults
                        .get(i)
                        .cloned()
                        .unwrap_or_default()
                })
            })
            .collect()
    }
}

/// Optional controls for `RECORD FILE`.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Resume recording at this sample offset
    pub offset_samples: Option<u64>,
    /// Play a beep before recording
    pub beep: bool,
    /// Stop after this many seconds of silence
    pub silence_secs: Option<u32>,
}

fn secs_to_ms(secs: u32) -> u64 {
    u64::from(secs) * 1000
}

impl AgiChannel {
    async fn run(&self, command: CommandBuilder) -> AgiResult<AgiResponse> {
        self.send_command(&command.into_command())
            .await
    }

    /// Answer the channel if it is not already up.
    pub async fn answer(&self) -> AgiResult<()> {
        self.run(CommandBuilder::new("ANSWER"))
            .await?
            .require_result(0, "Could not answer call")?;
        Ok(())
    }

    /// `ASYNCAGI BREAK`: return control to the dialplan, then close the channel.
    pub async fn async_break(&self) -> AgiResult<()> {
        self.run(CommandBuilder::new("ASYNCAGI BREAK"))
            .await?
            .require_result(0, "Could not interrupt processing")?;
        self.close()
            .await;
        Ok(())
    }

    /// State of this channel, or of `channel` when given.
    pub async fn channel_status(&self, channel: Option<&str>) -> AgiResult<ChannelState> {
        let response = self
            .run(CommandBuilder::new("CHANNEL STATUS").opt_arg(channel)?)
            .await?
            .reject_result(-1, "Could not get channel status")?;
        ChannelState::from_number(response.result()).ok_or_else(|| AgiError::UnknownStatus {
            kind: "channel state",
            value: response
                .result()
                .to_string(),
        })
    }

    /// Play a file the caller can fast-forward, rewind and pause.
    pub async fn control_stream_file(
        &self,
        filename: &str,
        escape_digits: &str,
        options: &ControlStreamOptions,
    ) -> AgiResult<ControlStreamResult> {
        let mut command = CommandBuilder::new("CONTROL STREAM FILE")
            .arg(filename)?
            .quoted(escape_digits)?;
        for arg in options.wire_args() {
            command = command.arg(arg)?;
        }
        let response = self
            .run(command)
            .await?
            .reject_result(-1, "Could not control stream file")?;

        let status = self
            .get_variable("CPLAYBACKSTATUS")
            .await?;
        let offset = self
            .get_variable("CPLAYBACKOFFSET")
            .await?;
        let playback_offset = offset
            .trim()
            .parse::<i64>()
            .map_err(|_| {
                AgiError::protocol_error(format!("invalid CPLAYBACKOFFSET: {}", offset))
            })?;

        Ok(ControlStreamResult {
            digit: response
                .arguments()
                .char("result"),
            playback_status: PlaybackStatus::from_variable(&status),
            playback_offset,
        })
    }

    /// Delete `key` from `family` in the Asterisk database.
    pub async fn database_del(&self, family: &str, key: &str) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("DATABASE DEL")
                .arg(family)?
                .arg(key)?,
        )
        .await?
        .reject_result(0, "Could not delete from the database")?;
        Ok(())
    }

    /// Delete a family, or a key tree within it. Returns `true` when
    /// Asterisk reports result 0.
    pub async fn database_del_tree(&self, family: &str, key_tree: Option<&str>) -> AgiResult<bool> {
        let response = self
            .run(
                CommandBuilder::new("DATABASE DELTREE")
                    .arg(family)?
                    .opt_arg(key_tree)?,
            )
            .await?
            .require_success("Could not delete tree from database")?;
        Ok(response.result() == 0)
    }

    pub async fn database_get(&self, family: &str, key: &str) -> AgiResult<String> {
        let response = self
            .run(
                CommandBuilder::new("DATABASE GET")
                    .arg(family)?
                    .arg(key)?,
            )
            .await?
            .reject_result(0, "Database key not set")?;
        Ok(response
            .arguments()
            .nokey()
            .to_string())
    }

    pub async fn database_put(&self, family: &str, key: &str, value: &str) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("DATABASE PUT")
                .arg(family)?
                .arg(key)?
                .arg(value)?,
        )
        .await?
        .reject_result(0, "Database key not set")?;
        Ok(())
    }

    /// Dial `target` via `EXEC Dial` and report `DIALSTATUS`.
    pub async fn dial(
        &self,
        target: &str,
        timeout_secs: u32,
        params: Option<&str>,
    ) -> AgiResult<DialStatus> {
        let args = format!("{},{},{}", target, timeout_secs, params.unwrap_or(""));
        self.exec("Dial", &args)
            .await?;

        let status = self
            .get_variable("DIALSTATUS")
            .await?;
        debug!("DIALSTATUS for {}: {}", target, status);
        status
            .trim()
            .to_uppercase()
            .parse::<DialStatus>()
            .map_err(|_| AgiError::UnknownStatus {
                kind: "dial status",
                value: status,
            })
    }

    /// Run a dialplan application. Returns the application's result; -2
    /// (application not found) is an error.
    pub async fn exec(&self, application: &str, args: &str) -> AgiResult<i64> {
        let args = Some(args).filter(|a| !a.is_empty());
        let response = self
            .run(
                CommandBuilder::new("EXEC")
                    .arg(application)?
                    .opt_arg(args)?,
            )
            .await?
            .reject_result(-2, "Could not execute application")?;
        Ok(response.result())
    }

    /// Play `sound_file` and collect up to `max_digits` DTMF digits.
    pub async fn get_data(
        &self,
        sound_file: &str,
        timeout_secs: u32,
        max_digits: Option<u32>,
    ) -> AgiResult<GetDataResult> {
        let response = self
            .run(
                CommandBuilder::new("GET DATA")
                    .arg(sound_file)?
                    .arg(secs_to_ms(timeout_secs))?
                    .opt_arg(max_digits)?,
            )
            .await?
            .reject_result(-1, "Could not get data from channel")?;
        Ok(GetDataResult {
            digits: response
                .arguments()
                .string("result")
                .to_string(),
            timeout: response
                .arguments()
                .boolean("timeout"),
        })
    }

    /// Evaluate a variable expression such as `CALLERID(num)`, optionally on
    /// another channel.
    pub async fn get_full_variable(&self, name: &str, channel: Option<&str>) -> AgiResult<String> {
        let response = self
            .run(
                CommandBuilder::new("GET FULL VARIABLE")
                    .arg(name.to_uppercase())?
                    .opt_arg(channel)?,
            )
            .await?
            .reject_result(0, "Variable not set")?;
        Ok(response
            .arguments()
            .nokey()
            .to_string())
    }

    /// `STREAM FILE` with a timeout for the digit. An `endpos` of 0 means the
    /// file did not play and is reported as an error.
    pub async fn get_option(
        &self,
        sound_file: &str,
        escape_digits: &str,
        timeout_secs: u32,
    ) -> AgiResult<DigitResult> {
        let response = self
            .run(
                CommandBuilder::new("GET OPTION")
                    .arg(sound_file)?
                    .quoted(escape_digits)?
                    .arg(secs_to_ms(timeout_secs))?,
            )
            .await?
            .reject_result(-1, "Could not get option")?;

        let endpos = response
            .arguments()
            .number("endpos");
        if endpos == 0 {
            return Err(AgiError::command_failed(
                "Could not play file",
                response.code(),
                response.result(),
            ));
        }
        Ok(DigitResult {
            digit: response
                .arguments()
                .char("result"),
            endpos,
        })
    }

    /// Read a channel variable. The name is upper-cased.
    pub async fn get_variable(&self, name: &str) -> AgiResult<String> {
        let response = self
            .run(CommandBuilder::new("GET VARIABLE").arg(name.to_uppercase())?)
            .await?
            .reject_result(0, "Variable not set")?;
        Ok(response
            .arguments()
            .nokey()
            .to_string())
    }

    pub async fn go_sub(
        &self,
        context: &str,
        extension: &str,
        priority: u32,
        argument: Option<&str>,
    ) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("GOSUB")
                .arg(context)?
                .arg(extension)?
                .arg(priority)?
                .opt_arg(argument)?,
        )
        .await?
        .require_result(0, "Could not execute gosub")?;
        Ok(())
    }

    /// Hang up this channel, or `channel` when given.
    pub async fn hangup(&self, channel: Option<&str>) -> AgiResult<()> {
        self.run(CommandBuilder::new("HANGUP").opt_arg(channel)?)
            .await?
            .require_result(1, "Could not hang up call")?;
        Ok(())
    }

    pub async fn noop(&self) -> AgiResult<()> {
        self.run(CommandBuilder::new("NOOP"))
            .await?
            .require_result(0, "Could not NOOP")?;
        Ok(())
    }

    pub async fn receive_char(&self, timeout_secs: u32) -> AgiResult<ReceiveCharResult> {
        let response = self
            .run(CommandBuilder::new("RECEIVE CHAR").arg(secs_to_ms(timeout_secs))?)
            .await?
            .reject_result(-1, "Could not get data from channel")?;
        Ok(ReceiveCharResult {
            character: response
                .arguments()
                .char("result"),
            timeout: response
                .arguments()
                .boolean("timeout"),
        })
    }

    pub async fn receive_text(&self, timeout_secs: u32) -> AgiResult<String> {
        let response = self
            .run(CommandBuilder::new("RECEIVE TEXT").arg(secs_to_ms(timeout_secs))?)
            .await?
            .reject_result(-1, "Could not get data from channel")?;
        Ok(response
            .arguments()
            .string("result")
            .to_string())
    }

    /// Record audio to `filename.<format>` until an escape digit, the
    /// timeout, or the configured silence.
    pub async fn record_file(
        &self,
        filename: &str,
        format: &str,
        escape_digits: &str,
        timeout_secs: u32,
        options: &RecordOptions,
    ) -> AgiResult<RecordResult> {
        let response = self
            .run(
                CommandBuilder::new("RECORD FILE")
                    .arg(filename)?
                    .arg(format)?
                    .quoted(escape_digits)?
                    .arg(secs_to_ms(timeout_secs))?
                    .opt_arg(options.offset_samples)?
                    .opt_arg(options.beep.then_some("BEEP"))?
                    .opt_arg(
                        options
                            .silence_secs
                            .map(|s| format!("s={}", s)),
                    )?,
            )
            .await?
            .reject_result(-1, "Could not record file")?;
        Ok(RecordResult {
            digit: response
                .arguments()
                .char("result"),
            endpos: response
                .arguments()
                .number("endpos"),
            timeout: response
                .arguments()
                .boolean("timeout"),
        })
    }

    async fn say(
        &self,
        command: CommandBuilder,
        failure: &str,
    ) -> AgiResult<String> {
        let response = self
            .run(command)
            .await?
            .reject_result(-1, failure)?;
        Ok(response
            .arguments()
            .char("result"))
    }

    /// Spell out `value` character by character. Returns the escape digit
    /// pressed, or `""`.
    pub async fn say_alpha(&self, value: &str, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY ALPHA")
                .arg(value)?
                .quoted(escape_digits)?,
            "Could not say alpha",
        )
        .await
    }

    /// Say the date of a Unix timestamp (seconds).
    pub async fn say_date(&self, epoch_secs: i64, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY DATE")
                .arg(epoch_secs)?
                .quoted(escape_digits)?,
            "Could not say date",
        )
        .await
    }

    /// Say a Unix timestamp using an optional format and timezone.
    pub async fn say_datetime(
        &self,
        epoch_secs: i64,
        escape_digits: &str,
        format: Option<&str>,
        timezone: Option<&str>,
    ) -> AgiResult<String> {
        let mut command = CommandBuilder::new("SAY DATETIME")
            .arg(epoch_secs)?
            .quoted(escape_digits)?;
        match (format, timezone) {
            (format, Some(timezone)) => {
                // Format is positional; an empty one selects the default.
                command = command
                    .quoted(format.unwrap_or(""))?
                    .arg(timezone)?;
            }
            (Some(format), None) => command = command.quoted(format)?,
            (None, None) => {}
        }
        self.say(command, "Could not say date time")
            .await
    }

    pub async fn say_digits(&self, digits: &str, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY DIGITS")
                .arg(digits)?
                .quoted(escape_digits)?,
            "Could not say digits",
        )
        .await
    }

    pub async fn say_number(&self, number: i64, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY NUMBER")
                .arg(number)?
                .quoted(escape_digits)?,
            "Could not say number",
        )
        .await
    }

    pub async fn say_phonetic(&self, value: &str, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY PHONETIC")
                .arg(value)?
                .quoted(escape_digits)?,
            "Could not say phonetic",
        )
        .await
    }

    /// Say the time of day of a Unix timestamp (seconds).
    pub async fn say_time(&self, epoch_secs: i64, escape_digits: &str) -> AgiResult<String> {
        self.say(
            CommandBuilder::new("SAY TIME")
                .arg(epoch_secs)?
                .quoted(escape_digits)?,
            "Could not say time",
        )
        .await
    }

    pub async fn send_image(&self, image: &str) -> AgiResult<()> {
        self.run(CommandBuilder::new("SEND IMAGE").arg(image)?)
            .await?
            .require_result(0, "Could not send image")?;
        Ok(())
    }

    pub async fn send_text(&self, text: &str) -> AgiResult<()> {
        self.run(CommandBuilder::new("SEND TEXT").quoted(text)?)
            .await?
            .require_result(0, "Could not send text")?;
        Ok(())
    }

    /// Hang the channel up automatically after `secs` seconds (0 disables).
    pub async fn set_auto_hangup(&self, secs: u32) -> AgiResult<()> {
        self.run(CommandBuilder::new("SET AUTOHANGUP").arg(secs)?)
            .await?
            .require_result(0, "Could not set auto hangup")?;
        Ok(())
    }

    /// Set caller ID to `number`, or `"name"<number>` when a name is given.
    pub async fn set_caller_id(&self, number: &str, name: Option<&str>) -> AgiResult<()> {
        let caller_id = match name {
            Some(name) => format!("\"{}\"<{}>", name.replace('"', ""), number),
            None => number.to_string(),
        };
        self.run(CommandBuilder::new("SET CALLERID").arg(caller_id)?)
            .await?
            .require_result(1, "Could not set caller id")?;
        Ok(())
    }

    pub async fn set_context(&self, context: &str) -> AgiResult<()> {
        self.run(CommandBuilder::new("SET CONTEXT").arg(context)?)
            .await?
            .require_result(0, "Could not set context")?;
        Ok(())
    }

    pub async fn set_extension(&self, extension: &str) -> AgiResult<()> {
        self.run(CommandBuilder::new("SET EXTENSION").arg(extension)?)
            .await?
            .require_result(0, "Could not set extension")?;
        Ok(())
    }

    /// Toggle music on hold, optionally with a specific class.
    pub async fn set_music(&self, on: bool, class: Option<&str>) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("SET MUSIC")
                .arg(if on { "ON" } else { "OFF" })?
                .opt_arg(class)?,
        )
        .await?
        .require_result(0, "Could not set music")?;
        Ok(())
    }

    /// Set the dialplan priority (number or label).
    pub async fn set_priority(&self, priority: &str) -> AgiResult<()> {
        self.run(CommandBuilder::new("SET PRIORITY").arg(priority)?)
            .await?
            .require_result(0, "Could not set priority")?;
        Ok(())
    }

    /// Set a channel variable. The name is upper-cased.
    pub async fn set_variable(&self, name: &str, value: &str) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("SET VARIABLE")
                .arg(name.to_uppercase())?
                .quoted(value)?,
        )
        .await?
        .require_result(1, "Could not set variable")?;
        Ok(())
    }

    pub async fn speech_activate_grammar(&self, grammar: &str) -> AgiResult<AgiResponse> {
        self.run(CommandBuilder::new("SPEECH ACTIVATE GRAMMAR").arg(grammar)?)
            .await
    }

    pub async fn speech_create(&self, engine: &str) -> AgiResult<AgiResponse> {
        self.run(CommandBuilder::new("SPEECH CREATE").arg(engine)?)
            .await
    }

    pub async fn speech_deactivate_grammar(&self, grammar: &str) -> AgiResult<AgiResponse> {
        self.run(CommandBuilder::new("SPEECH DEACTIVATE GRAMMAR").arg(grammar)?)
            .await
    }

    pub async fn speech_destroy(&self) -> AgiResult<AgiResponse> {
        self.run(CommandBuilder::new("SPEECH DESTROY"))
            .await
    }

    pub async fn speech_load_grammar(&self, grammar: &str, path: &str) -> AgiResult<AgiResponse> {
        self.run(
            CommandBuilder::new("SPEECH LOAD GRAMMAR")
                .arg(grammar)?
                .arg(path)?,
        )
        .await
    }

    pub async fn speech_recognize(
        &self,
        sound_file: &str,
        timeout_secs: u32,
        offset: Option<u64>,
    ) -> AgiResult<AgiResponse> {
        self.run(
            CommandBuilder::new("SPEECH RECOGNIZE")
                .arg(sound_file)?
                .arg(secs_to_ms(timeout_secs))?
                .opt_arg(offset)?,
        )
        .await
    }

    pub async fn speech_set(&self, key: &str, value: &str) -> AgiResult<AgiResponse> {
        self.run(
            CommandBuilder::new("SPEECH SET")
                .arg(key)?
                .arg(value)?,
        )
        .await
    }

    pub async fn speech_unload_grammar(&self, grammar: &str) -> AgiResult<AgiResponse> {
        self.run(CommandBuilder::new("SPEECH UNLOAD GRAMMAR").arg(grammar)?)
            .await
    }

    /// Play a file, interruptible by `escape_digits`.
    ///
    /// Besides the reply, `PLAYBACKSTATUS` must read `SUCCESS`; a missing or
    /// unplayable file is reported as an error.
    pub async fn stream_file(
        &self,
        filename: &str,
        escape_digits: &str,
        offset: Option<u64>,
    ) -> AgiResult<DigitResult> {
        let response = self
            .run(
                CommandBuilder::new("STREAM FILE")
                    .arg(filename)?
                    .quoted(escape_digits)?
                    .opt_arg(offset)?,
            )
            .await?
            .reject_result(-1, "Could not stream file")?;

        let status = self
            .get_variable("PLAYBACKSTATUS")
            .await?;
        if PlaybackStatus::from_variable(&status) != PlaybackStatus::Success {
            return Err(AgiError::command_failed(
                "Could not stream file",
                response.code(),
                response.result(),
            ));
        }

        Ok(DigitResult {
            digit: response
                .arguments()
                .char("result"),
            endpos: response
                .arguments()
                .number("endpos"),
        })
    }

    pub async fn tdd_mode(&self, on: bool) -> AgiResult<()> {
        self.run(CommandBuilder::new("TDD MODE").arg(if on { "ON" } else { "OFF" })?)
            .await?
            .require_result(1, "Could not set TDD mode")?;
        Ok(())
    }

    /// Log `message` to the Asterisk verbose log at `level` (1-4).
    pub async fn verbose(&self, message: &str, level: Option<u8>) -> AgiResult<()> {
        self.run(
            CommandBuilder::new("VERBOSE")
                .quoted(message)?
                .opt_arg(level)?,
        )
        .await?
        .require_result(1, "Could not send logging message")?;
        Ok(())
    }

    /// Wait up to `timeout_secs` for a DTMF digit; `""` if none came.
    pub async fn wait_for_digit(&self, timeout_secs: u32) -> AgiResult<String> {
        let response = self
            .run(CommandBuilder::new("WAIT FOR DIGIT").arg(secs_to_ms(timeout_secs))?)
            .await?
            .reject_result(-1, "Could not wait for digit")?;
        Ok(response
            .arguments()
            .char("result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    type Switch = BufReader<TcpStream>;

    async fn pair() -> (AgiChannel, Switch) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener
            .local_addr()
            .unwrap();
        let mut switch = TcpStream::connect(addr)
            .await
            .unwrap();
        switch
            .write_all(b"agi_channel: SIP/1000-00000001\n\n")
            .await
            .unwrap();
        let channel = AgiChannel::accept(&listener)
            .await
            .unwrap();
        (channel, BufReader::new(switch))
    }

    /// Read one command line, check it, send `reply`.
    async fn expect(switch: &mut Switch, command: &str, reply: &str) {
        let mut line = String::new();
        switch
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line.trim_end_matches('\n'), command);
        switch
            .get_mut()
            .write_all(format!("{}\n", reply).as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_answer() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.answer().await });
        expect(&mut switch, "ANSWER", "200 result=0").await;
        assert!(task
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_answer_failure_message() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.answer().await });
        expect(&mut switch, "ANSWER", "200 result=-1").await;
        let err = task
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "Could not answer call");
    }

    #[tokio::test]
    async fn test_get_variable_uppercases_and_reads_nokey() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.get_variable("foo").await });
        expect(&mut switch, "GET VARIABLE FOO", "200 result=1 (bar)").await;
        assert_eq!(
            task.await
                .unwrap()
                .unwrap(),
            "bar"
        );
    }

    #[tokio::test]
    async fn test_get_variable_unset() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.get_variable("NOPE").await });
        expect(&mut switch, "GET VARIABLE NOPE", "200 result=0").await;
        assert!(matches!(
            task.await
                .unwrap(),
            Err(AgiError::CommandFailed { result: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_dial_reads_dialstatus() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.dial("SIP/2000", 30, None).await });
        expect(&mut switch, "EXEC Dial SIP/2000,30,", "200 result=0").await;
        expect(&mut switch, "GET VARIABLE DIALSTATUS", "200 result=1 (noanswer)").await;
        assert_eq!(
            task.await
                .unwrap()
                .unwrap(),
            DialStatus::NoAnswer
        );
    }

    #[tokio::test]
    async fn test_dial_unknown_status() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.dial("SIP/2000", 30, Some("tT")).await });
        expect(&mut switch, "EXEC Dial SIP/2000,30,tT", "200 result=0").await;
        expect(&mut switch, "GET VARIABLE DIALSTATUS", "200 result=1 (RINGING)").await;
        assert!(matches!(
            task.await
                .unwrap(),
            Err(AgiError::UnknownStatus { kind: "dial status", .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_file_checks_playback_status() {
        let (channel, mut switch) = pair().await;
        let task =
            tokio::spawn(async move { channel.stream_file("demo-congrats", "#", None).await });
        expect(&mut switch, "STREAM FILE demo-congrats \"#\"", "200 result=0 endpos=8000").await;
        expect(&mut switch, "GET VARIABLE PLAYBACKSTATUS", "200 result=1 (SUCCESS)").await;
        let result = task
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.digit, "");
        assert_eq!(result.endpos, 8000);
    }

    #[tokio::test]
    async fn test_stream_file_failed_playback() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.stream_file("missing", "", None).await });
        expect(&mut switch, "STREAM FILE missing \"\"", "200 result=0 endpos=0").await;
        expect(&mut switch, "GET VARIABLE PLAYBACKSTATUS", "200 result=1 (FAILED)").await;
        assert!(task
            .await
            .unwrap()
            .is_err());
    }

    #[tokio::test]
    async fn test_wait_for_digit_converts_seconds() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.wait_for_digit(5).await });
        expect(&mut switch, "WAIT FOR DIGIT 5000", "200 result=49").await;
        assert_eq!(
            task.await
                .unwrap()
                .unwrap(),
            "1"
        );
    }

    #[tokio::test]
    async fn test_get_data_timeout_flag() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.get_data("enter-pin", 3, Some(4)).await });
        expect(&mut switch, "GET DATA enter-pin 3000 4", "200 result=12 (timeout)").await;
        let result = task
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.digits, "12");
        assert!(result.timeout);
    }

    #[tokio::test]
    async fn test_get_option_endpos_zero_fails() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.get_option("menu", "123", 5).await });
        expect(&mut switch, "GET OPTION menu \"123\" 5000", "200 result=0 endpos=0").await;
        let err = task
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "Could not play file");
    }

    #[tokio::test]
    async fn test_channel_status() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.channel_status(None).await });
        expect(&mut switch, "CHANNEL STATUS", "200 result=6").await;
        assert_eq!(
            task.await
                .unwrap()
                .unwrap(),
            ChannelState::Up
        );
    }

    #[tokio::test]
    async fn test_database_del_tree_reports_result() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.database_del_tree("cidname", None).await });
        expect(&mut switch, "DATABASE DELTREE cidname", "200 result=1").await;
        assert!(!task
            .await
            .unwrap()
            .unwrap());
    }

    #[tokio::test]
    async fn test_exec_not_found() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.exec("NoSuchApp", "").await });
        expect(&mut switch, "EXEC NoSuchApp", "200 result=-2").await;
        assert!(task
            .await
            .unwrap()
            .is_err());
    }

    #[tokio::test]
    async fn test_set_variable_quotes_value() {
        let (channel, mut switch) = pair().await;
        let task =
            tokio::spawn(async move { channel.set_variable("greeting", "hello world").await });
        expect(&mut switch, "SET VARIABLE GREETING \"hello world\"", "200 result=1").await;
        assert!(task
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_set_caller_id_with_name() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.set_caller_id("1000", Some("Alice")).await });
        expect(&mut switch, "SET CALLERID \"Alice\"<1000>", "200 result=1").await;
        assert!(task
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_record_file_options() {
        let (channel, mut switch) = pair().await;
        let options = RecordOptions {
            beep: true,
            silence_secs: Some(2),
            ..Default::default()
        };
        let task = tokio::spawn(async move {
            channel
                .record_file("/tmp/msg", "wav", "#", 10, &options)
                .await
        });
        expect(
            &mut switch,
            "RECORD FILE /tmp/msg wav \"#\" 10000 BEEP s=2",
            "200 result=0 (timeout) endpos=16000",
        )
        .await;
        let result = task
            .await
            .unwrap()
            .unwrap();
        assert!(result.timeout);
        assert_eq!(result.endpos, 16000);
    }

    #[tokio::test]
    async fn test_control_stream_file_reads_status_and_offset() {
        let (channel, mut switch) = pair().await;
        let options = ControlStreamOptions {
            rewind: Some('4'),
            ..Default::default()
        };
        let task = tokio::spawn(async move {
            channel
                .control_stream_file("story", "#", &options)
                .await
        });
        expect(
            &mut switch,
            "CONTROL STREAM FILE story \"#\" 3000 # 4",
            "200 result=35",
        )
        .await;
        expect(&mut switch, "GET VARIABLE CPLAYBACKSTATUS", "200 result=1 (USERSTOPPED)").await;
        expect(&mut switch, "GET VARIABLE CPLAYBACKOFFSET", "200 result=1 (4200)").await;
        let result = task
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.digit, "#");
        assert_eq!(result.playback_status, PlaybackStatus::UserStopped);
        assert_eq!(result.playback_offset, 4200);
    }

    #[tokio::test]
    async fn test_speech_passthrough() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move { channel.speech_create("lumenvox").await });
        expect(&mut switch, "SPEECH CREATE lumenvox", "510 result=-1").await;
        let response = task
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.code(), Some(510));
    }

    #[tokio::test]
    async fn test_verbose_and_say_datetime() {
        let (channel, mut switch) = pair().await;
        let task = tokio::spawn(async move {
            channel
                .verbose("started", Some(3))
                .await?;
            channel
                .say_datetime(1700000000, "#", None, Some("UTC"))
                .await
        });
        expect(&mut switch, "VERBOSE \"started\" 3", "200 result=1").await;
        expect(&mut switch, "SAY DATETIME 1700000000 \"#\" \"\" UTC", "200 result=0").await;
        assert_eq!(
            task.await
                .unwrap()
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_control_stream_defaults_fill_gaps() {
        assert!(ControlStreamOptions::default()
            .wire_args()
            .is_empty());
        let options = ControlStreamOptions {
            pause: Some('5'),
            ..Default::default()
        };
        assert_eq!(options.wire_args(), vec!["3000", "#", "*", "5"]);
    }
}
