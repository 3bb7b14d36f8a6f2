//! Switchboard CLI - run a room server or an interactive client.
//!
//! # Commands
//!
//! - `switchboard serve` - Run the socket server with its HTTP routes
//! - `switchboard client` - Connect to a server and send messages from stdin
//!
//! Settings come from `--config`, `.env` and `SWITCHBOARD_*` variables;
//! flags override all of them.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

mod commands;
mod error;
mod settings;

use commands::{client, serve};
use error::CliResult;

/// Switchboard - real-time rooms over WebSocket
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the socket server
    #[command(alias = "s")]
    Serve(ServeArgs),

    /// Connect to a server and send messages typed on stdin
    #[command(alias = "c")]
    Client(ClientArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Config file (toml, json or .env)
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<String>,

    /// Interface to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket endpoint path
    #[arg(long)]
    path: Option<String>,

    /// Runtime worker threads
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct ClientArgs {
    /// Config file (toml, json or .env)
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    config: Option<String>,

    /// Server URL
    #[arg(short, long)]
    url: Option<String>,

    /// Bearer token sent with the handshake
    #[arg(short, long)]
    token: Option<String>,

    /// WebSocket endpoint path
    #[arg(long)]
    path: Option<String>,

    /// Total connection attempts
    #[arg(long)]
    attempts: Option<u32>,

    /// Seconds before the first retry
    #[arg(long)]
    delay: Option<f64>,

    /// Do not retry failed or dropped connections
    #[arg(long)]
    no_reconnect: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result: CliResult<()> = match cli.command {
        Commands::Serve(args) => serve::execute(
            serve::Overrides {
                config: args.config,
                host: args.host,
                port: args.port,
                path: args.path,
                workers: args.workers,
            },
            cli.verbose,
        ),
        Commands::Client(args) => client::execute(
            client::Overrides {
                config: args.config,
                url: args.url,
                token: args.token,
                path: args.path,
                attempts: args.attempts,
                delay: args.delay,
                no_reconnect: args.no_reconnect,
            },
            cli.verbose,
        ),
    };

    if let Err(e) = result {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

fn info(msg: &str) {
    println!("  {} {}", "→".cyan(), msg);
}
