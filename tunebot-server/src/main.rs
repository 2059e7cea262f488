use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "tunebot")]
#[command(author, version, about = "TuneBot - announces what the streamer is listening to in Twitch chat")]
pub struct Args {
    /// Twitch login the bot chats as
    #[arg(long)]
    pub bot_username: String,

    /// Channel to join, with or without the leading '#'
    #[arg(long)]
    pub channel: String,

    /// Discord user id whose listening activity is tracked
    #[arg(long)]
    pub observe_user_id: String,

    #[arg(long, default_value = "twitch_token.json")]
    pub token_file: String,

    #[arg(long, default_value = "latestSongInfo.json")]
    pub now_playing_file: String,

    /// Activity name that counts as music
    #[arg(long, default_value = "Spotify")]
    pub tracked_source: String,

    /// Run without the Discord gateway (no presence input, display is logged only)
    #[arg(long, default_value = "false")]
    pub no_discord: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tunebot=info,tunebot_core=info,tunebot_server=info"));
    fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!(
        "TuneBot starting. channel={}, bot={}, discord={}",
        args.channel, args.bot_username, !args.no_discord
    );

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
