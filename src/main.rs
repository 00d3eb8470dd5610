//! webrtc-content - WebRTC session client for JSON-RPC signaling servers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use webrtc_content::media::DisplayRegistry;
use webrtc_content::peer::webrtc::WebRtcPlatform;
use webrtc_content::peer::IceServer;
use webrtc_content::signaling::JsonRpcClient;
use webrtc_content::{Notification, Platform, SessionConfig, SessionController, SessionOptions};

#[derive(Parser)]
#[command(name = "webrtc-content")]
#[command(about = "WebRTC session client for JSON-RPC signaling servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against a signaling server
    Connect {
        #[command(flatten)]
        session: SessionArgs,

        /// Display target to register (repeatable)
        #[arg(long = "display")]
        displays: Vec<String>,

        /// Terminate after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Validate the options and print the resolved configuration
    Check {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Signaling server URL (ws:// or wss://)
    #[arg(env = "WEBRTC_CONTENT_ENDPOINT")]
    endpoint: String,

    /// JSON options file (camelCase keys)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Audio mode: inactive, sendonly, recvonly or sendrecv
    #[arg(long, env = "WEBRTC_CONTENT_AUDIO")]
    audio: Option<String>,

    /// Video mode: inactive, sendonly, recvonly or sendrecv
    #[arg(long, env = "WEBRTC_CONTENT_VIDEO")]
    video: Option<String>,

    /// ICE server URL (repeatable, replaces the file's list)
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,

    /// Display target for the local stream
    #[arg(long)]
    local_video_tag: Option<String>,

    /// Display target for the remote stream
    #[arg(long)]
    remote_video_tag: Option<String>,

    /// Consecutive poll failures tolerated before giving up
    #[arg(long)]
    poll_max_error_tries: Option<u32>,
}

impl SessionArgs {
    /// File options with command line values on top
    fn to_options(&self) -> Result<SessionOptions> {
        let mut options = match self.options {
            Some(ref path) => SessionOptions::load(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => SessionOptions::default(),
        };

        if self.audio.is_some() {
            options.audio = self.audio.clone();
        }
        if self.video.is_some() {
            options.video = self.video.clone();
        }
        if !self.ice_servers.is_empty() {
            options.ice_servers = Some(self.ice_servers.iter().map(IceServer::new).collect());
        }
        if self.local_video_tag.is_some() {
            options.local_video_tag = self.local_video_tag.clone();
        }
        if self.remote_video_tag.is_some() {
            options.remote_video_tag = self.remote_video_tag.clone();
        }
        if self.poll_max_error_tries.is_some() {
            options.poll_max_error_tries = self.poll_max_error_tries;
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Connect {
            session,
            displays,
            duration,
        } => {
            connect(&session, displays, duration.map(Duration::from_secs)).await?;
        }
        Commands::Check { session } => {
            check(&session)?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let builder = FmtSubscriber::builder().with_target(false);

    if verbose {
        let subscriber = builder.with_max_level(Level::DEBUG).finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = builder.with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}

fn check(args: &SessionArgs) -> Result<()> {
    let config = SessionConfig::new(&args.endpoint, args.to_options()?)?;
    let audio = config.audio();
    let video = config.video();

    println!("Endpoint: {}", config.endpoint());
    println!(
        "Audio: {} (local: {}, remote: {})",
        config.audio_mode(),
        audio.local,
        audio.remote
    );
    println!(
        "Video: {} (local: {}, remote: {})",
        config.video_mode(),
        video.local,
        video.remote
    );
    println!("ICE servers:");
    for server in config.ice_servers() {
        println!("  - {}", server.urls.join(", "));
    }
    if let Some(tag) = config.local_video_tag() {
        println!("Local video tag: {}", tag);
    }
    if let Some(tag) = config.remote_video_tag() {
        println!("Remote video tag: {}", tag);
    }
    let policy = config.poll_policy();
    println!(
        "Poll retries: {} (backoff unit {:?})",
        policy.max_error_tries, policy.backoff_unit
    );

    Ok(())
}

async fn connect(
    args: &SessionArgs,
    displays: Vec<String>,
    duration: Option<Duration>,
) -> Result<()> {
    let options = args.to_options()?;

    let client = JsonRpcClient::connect(&args.endpoint)
        .await
        .with_context(|| format!("Failed to connect to {}", args.endpoint))?;
    info!("Connected to {}", client.endpoint());

    let webrtc = WebRtcPlatform::new();
    let display = Arc::new(DisplayRegistry::with_targets(displays));
    let platform = Platform {
        signaling: Arc::new(client),
        peers: webrtc.connector(),
        media: webrtc.media_source(),
        display,
    };

    let mut controller = SessionController::new(&args.endpoint, options, platform)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.set_notification_callback(move |notification| {
        let _ = tx.send(notification);
    });

    let config = controller.config();
    println!(
        "Starting session (audio: {}, video: {}). Press Ctrl+C to terminate.",
        config.audio_mode(),
        config.video_mode()
    );
    let handle = controller.start();

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut terminating = false;
    loop {
        tokio::select! {
            notification = rx.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                let terminal = notification.is_terminal();
                print_notification(&notification);
                if terminal {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !terminating => {
                info!("Interrupted, terminating session");
                terminating = true;
                handle.terminate();
            }
            _ = &mut deadline, if !terminating => {
                info!("Duration elapsed, terminating session");
                terminating = true;
                handle.terminate();
            }
        }
    }

    handle.closed().await;
    Ok(())
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::Start => println!("[start] session established"),
        Notification::Terminate => println!("[terminate] session closed"),
        Notification::Error(e) => println!("[error] {}", e),
        Notification::LocalStream(stream) => println!(
            "[localstream] {} (audio: {}, video: {})",
            stream.id(),
            stream.has_audio(),
            stream.has_video()
        ),
        Notification::RemoteStream(stream) => println!(
            "[remotestream] {} (audio: {}, video: {})",
            stream.id(),
            stream.has_audio(),
            stream.has_video()
        ),
        Notification::MediaEvent(event) => println!("[mediaevent] {}", event),
    }
}
