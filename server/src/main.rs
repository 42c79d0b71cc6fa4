use clap::Parser;
use log::info;
use server::config::{ReplayScope, SessionConfig, TieBreak, DEFAULT_WORDS_PER_ROUND};
use server::network::Server;
use server::words::WordBank;
use shared::{DEFAULT_GROUP_SIZE, DEFAULT_PORT};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Players per group
    #[clap(short, long, default_value_t = DEFAULT_GROUP_SIZE as u16,
           value_parser = clap::value_parser!(u16).range(1..))]
    group_size: u16,
    /// Who must agree before a new round starts
    #[clap(long, value_enum, default_value_t = ReplayScope::Global)]
    replay_scope: ReplayScope,
    /// How tied top scores are resolved
    #[clap(long, value_enum, default_value_t = TieBreak::FirstReported)]
    tie_break: TieBreak,
    /// Word list file, one word per line. Uses the built-in list if omitted
    #[clap(short, long)]
    words: Option<PathBuf>,
    /// Words drawn for each round
    #[clap(long, default_value_t = DEFAULT_WORDS_PER_ROUND)]
    words_per_round: usize,
}

/// Parses command-line arguments, then runs the accept loop until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let words = match &args.words {
        Some(path) => WordBank::from_file(path)?,
        None => WordBank::builtin(),
    };
    info!("Loaded {} words", words.len());

    let config = SessionConfig {
        group_size: usize::from(args.group_size),
        replay_scope: args.replay_scope,
        tie_break: args.tie_break,
        words_per_round: args.words_per_round,
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, config, words).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
