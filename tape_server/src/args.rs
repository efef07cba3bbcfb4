//! Command-line arguments for the tape server.
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tape_server::market::MarketMode;

/// Which price oracle answers lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OracleKind {
    /// Random-walk prices for the known ticker list.
    Simulated,
    /// HTTP GET against `--oracle-url`.
    Http,
}

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Price oracle to query.
    #[arg(long, value_enum, default_value_t = OracleKind::Simulated)]
    pub oracle: OracleKind,

    /// URL template for the HTTP oracle; `{symbol}` is replaced with the ticker.
    #[arg(long)]
    pub oracle_url: Option<String>,

    /// How the trading session is decided.
    #[arg(long, value_enum, default_value_t = MarketMode::Calendar)]
    pub market: MarketMode,

    /// Only track symbols on the well-known ticker list.
    #[arg(long)]
    pub known_only: bool,

    /// File with symbols to track from startup.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[arg(long)]
    pub watchlist: Option<PathBuf>,

    /// Do not open the TCP/UDP ports for remote tapes.
    #[arg(long)]
    pub no_network: bool,

    /// Address the remote tape ports bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_ip: String,
}
