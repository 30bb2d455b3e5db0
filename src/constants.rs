//! Protocol constants and configuration values

/// Default FastAGI listening port
pub const DEFAULT_AGI_PORT: u16 = 3000;

/// Default bind address for the FastAGI listener
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Socket buffer size for reading from the TCP stream (16KB)
/// AGI traffic is a handful of short lines per command
pub const SOCKET_BUF_SIZE: usize = 16 * 1024;

/// Initial receive buffer allocation (4KB) - a full metadata block fits without growth
pub const BUF_CHUNK: usize = 4 * 1024;

/// Maximum total buffer size (1MB) - no legitimate metadata block or reply line
/// comes close; exceeding it means the peer is not speaking AGI
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Protocol terminators
pub const BLOCK_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Namespace prefix carried by every metadata attribute name (`agi_channel: ...`)
pub const VARIABLE_PREFIX: &str = "agi_";

/// First token of the line Asterisk sends when the call is hung up
pub const HANGUP_SENTINEL: &str = "HANGUP";

/// Argument key holding the numeric result of a reply (`200 result=1`)
pub const RESULT_KEY: &str = "result";

/// Argument key used for bare tokens that carry no `=`
pub const VALUE_KEY: &str = "value";

/// Status code of a successfully executed command
pub const STATUS_OK: u16 = 200;

/// Time allowed for the metadata block after accept (milliseconds)
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 5000;

/// Delay between a hangup notification and socket teardown (milliseconds)
pub const DEFAULT_HANGUP_GRACE_MS: u64 = 1000;

/// Maximum number of queued channel events per subscriber before lagging
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;

/// Maximum number of established channels queued for the application
pub const MAX_CHANNEL_QUEUE_SIZE: usize = 1000;
