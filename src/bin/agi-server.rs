use std::time::Duration;

use asterisk_agi_tokio::{
    AgiChannel, AgiChannelOptions, AgiError, AgiServer, AgiServerOptions, ServerEvent,
    DEFAULT_AGI_PORT,
};
use clap::Parser;
use tracing::{info, warn};

/// FastAGI demo server: answers each call, optionally plays a file, hangs up.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TCP port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_AGI_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Delay between a hangup notice and closing the socket.
    #[arg(long, default_value_t = 1000)]
    hangup_grace_ms: u64,

    /// Keep the socket open after Asterisk reports a hangup.
    #[arg(long)]
    no_auto_close: bool,

    /// Sound file to play after answering.
    #[arg(long)]
    playback: Option<String>,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn handle_call(channel: AgiChannel, playback: Option<String>) -> Result<(), AgiError> {
    match serde_json::to_string(channel.variables()) {
        Ok(json) => info!("Channel variables: {}", json),
        Err(e) => warn!("Could not serialize channel variables: {}", e),
    }

    channel
        .answer()
        .await?;
    if let Some(file) = playback.as_deref() {
        let played = channel
            .stream_file(file, "#", None)
            .await?;
        if !played
            .digit
            .is_empty()
        {
            info!("Caller pressed {}", played.digit);
        }
    }
    channel
        .hangup(None)
        .await
}

#[tokio::main]
async fn main() -> Result<(), AgiError> {
    init_tracing();

    let cli = Cli::parse();
    let options = AgiServerOptions {
        port: cli.port,
        bind_address: cli.bind,
        channel: AgiChannelOptions {
            auto_close_on_hangup: !cli.no_auto_close,
            hangup_grace: Duration::from_millis(cli.hangup_grace_ms),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut server = AgiServer::new(options);
    let mut events = server
        .start()
        .await?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = ?err, "failed to install ctrl-c handler");
                }
                break;
            }
            event = events.recv() => match event {
                Some(ServerEvent::Channel(channel)) => {
                    let playback = cli.playback.clone();
                    tokio::spawn(async move {
                        let name = channel.variables().channel().to_string();
                        if let Err(e) = handle_call(channel, playback).await {
                            warn!("Call {} ended with error: {}", name, e);
                        }
                    });
                }
                Some(ServerEvent::Error(message)) => warn!("Listener error: {}", message),
                Some(ServerEvent::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    server
        .stop()
        .await;
    info!("AGI server stopped");
    Ok(())
}
