use clap::Parser;
use colored::Colorize;
use discjockey::api::api_types::{ChannelRef, GenerationRequest, QueueView};
use discjockey::config::JukeboxConfig;
use discjockey::Jukebox;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn print_queue(view: &QueueView) {
    println!("Session: {}", format!("{:?}", view.state).bright_purple());
    match &view.current {
        Some(track) => println!(
            "Now playing: {} ({})",
            track.title.bold(),
            track.generation_id.bright_green()
        ),
        None => println!("Nothing playing"),
    }
    for (i, track) in view.pending.iter().enumerate() {
        println!("\t{}. {}", i + 1, track.title);
    }
}

#[tokio::main]
async fn tokio_main(cli: Cli) {
    let config = match JukeboxConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("{}: {}", "Configuration error".bright_red(), e);
            return;
        }
    };
    let jukebox = Jukebox::new(config);
    let channel = ChannelRef {
        channel_id: cli.channel_id,
        guild_id: cli.guild_id,
        user_id: cli.user_id,
        endpoint: cli.endpoint,
        session_id: cli.session_id,
        voice_token: cli.voice_token,
    };
    let mut request = GenerationRequest::new(cli.prompt);
    if let Some(style) = cli.style {
        request = request.with_style(style);
    }

    let cancel = CancellationToken::new();
    println!("Generating: {}", request.prompt.bold());
    tokio::select! {
        result = jukebox.submit_and_enqueue(cli.guild_id, &channel, &request, &cancel) => {
            match result {
                Ok(track) => println!("Queued {}", track.title.bright_green()),
                Err(e) => println!("{}: {}", "Generation failed".bright_red(), e),
            }
        }
        _ = signal::ctrl_c() => {
            cancel.cancel();
            jukebox.shutdown().await;
            return;
        }
    }

    print_queue(&jukebox.current_queue_view(cli.guild_id).await);

    signal::ctrl_c().await.ok();
    jukebox.shutdown().await;
}

/// Generate a song and play it in a discord voice channel
#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// What the song should be about
    prompt: String,

    /// Musical style, e.g. "lo-fi hip hop"
    #[arg(long)]
    style: Option<String>,

    /// Channel ID to connect to
    #[arg(short, long)]
    channel_id: u64,
    /// Discord voice endpoint, hostname
    #[arg(short, long)]
    endpoint: String,
    /// Guild ID to connect to
    #[arg(short, long)]
    guild_id: u64,
    /// Discord voice session ID
    #[arg(short, long)]
    session_id: String,
    /// Discord user ID
    #[arg(short, long)]
    user_id: u64,
    /// Discord voice token (NOT bot token)
    #[arg(short, long)]
    voice_token: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Cli::parse();
    tokio_main(args);
}
