//! Pairchat CLI
//!
//! Command-line tools for pairchat.
//!
//! # Commands
//!
//! - `token` - Mint or verify a bearer token
//! - `simulate` - Run a server and two polling clients in one process
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pairchat command-line tools.
#[derive(Parser)]
#[command(name = "pairchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a bearer token, or verify one with --verify
    Token {
        /// User the token is issued to
        #[arg(short, long)]
        user: Option<String>,

        /// HMAC secret shared with the server
        #[arg(short, long, env = "PAIRCHAT_SECRET")]
        secret: String,

        /// Token lifetime in hours
        #[arg(short, long, default_value = "24")]
        expiry_hours: u64,

        /// Verify this token instead of minting one
        #[arg(long)]
        verify: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run an in-process server with two polling clients
    Simulate {
        /// First participant
        #[arg(long, default_value = "alice")]
        alice: String,

        /// Second participant
        #[arg(long, default_value = "bob")]
        bob: String,

        /// Number of messages, alternating senders
        #[arg(short, long, default_value = "10")]
        messages: usize,

        /// Client poll interval in milliseconds
        #[arg(short, long, default_value = "200")]
        interval_ms: u64,

        /// Pause between sends in milliseconds
        #[arg(long, default_value = "50")]
        gap_ms: u64,

        /// Cut the first participant off the network for this long, halfway through
        #[arg(long)]
        outage_ms: Option<u64>,

        /// Fail if the clients have not converged after this many seconds
        #[arg(long, default_value = "30")]
        deadline_secs: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Token {
            user,
            secret,
            expiry_hours,
            verify,
            format,
        } => {
            commands::token::run(
                user.as_deref(),
                &secret,
                expiry_hours,
                verify.as_deref(),
                &format,
            )?;
        }
        Commands::Simulate {
            alice,
            bob,
            messages,
            interval_ms,
            gap_ms,
            outage_ms,
            deadline_secs,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                alice,
                bob,
                messages,
                poll_interval: Duration::from_millis(interval_ms),
                send_gap: Duration::from_millis(gap_ms),
                outage: outage_ms.map(Duration::from_millis),
                deadline: Duration::from_secs(deadline_secs),
            };
            commands::simulate::run(options, &format)?;
        }
        Commands::Version => {
            println!("pairchat CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Protocol v{}", pairchat_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
