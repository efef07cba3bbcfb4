//! Ticker tape server.
//!
//! Reads stock questions from stdin, one per line, and starts tracking every ticker
//! mentioned in them. Each new ticker is priced right away; afterwards the scheduler keeps
//! the whole set fresh: one symbol every few seconds while the market is open, one full
//! sweep per minute while it is closed. Every new price is written to the local tape log
//! and streamed to remote tapes (see `tape_client`).
//!
//! Usage example (CLI):
//! ```bash
//! tape_server --market open --watchlist ./tickers.txt
//! ```
//!
//! Typing `prices` prints the last known prices; `quit` or end of input stops the server.
#![warn(missing_docs)]
mod args;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::Sender;
use log::{error, info};
use tape_common::tickers::{SymbolFilter, WatchlistParser};
use tape_common::{Symbol, TapeError};
use tape_server::distribution::{self, DistributionConfig};
use tape_server::market::MarketCalendar;
use tape_server::oracle::{HttpOracle, PriceClient, PriceOracle, SimulatedOracle};
use tape_server::tracking::{spawn_reporter, track_query};
use tape_server::{FirstFetch, FirstFetchOutcome, Scheduler, Timing, UpdateEvent, UpdatePublisher};

use crate::args::{Args, OracleKind};

fn main() -> Result<(), TapeError> {
    init_logger();
    let args = Args::parse();
    let timing = Timing::default();

    let oracle = build_oracle(&args, &timing)?;
    let publisher = Arc::new(UpdatePublisher::new());
    let scheduler = Arc::new(Scheduler::new(
        PriceClient::new(oracle, timing.fetch_timeout),
        Arc::clone(&publisher),
        MarketCalendar::new(args.market),
        timing,
    ));
    let filter = if args.known_only {
        SymbolFilter::Known
    } else {
        SymbolFilter::Any
    };

    let tape_log = start_tape_log(&publisher)?;
    let (reporter, report_thread) = spawn_reporter(print_outcome)?;

    if !args.no_network {
        let config = DistributionConfig {
            bind_ip: args.bind_ip.clone(),
            ..DistributionConfig::default()
        };
        distribution::start(Arc::clone(&publisher), &config)?;
    }

    if let Some(path) = &args.watchlist {
        let file = File::open(path)?;
        let symbols = Symbol::parse_from_file(BufReader::new(file))?;
        info!("Watchlist: {:?}", symbols);
        for symbol in symbols.into_iter().filter(|symbol| filter.accepts(symbol)) {
            if let Some(first) = scheduler.begin_tracking(symbol.clone()) {
                report(&reporter, symbol, first);
            }
        }
    }

    let tick = Arc::clone(&scheduler).run()?;
    info!(
        "Market is {}. Ask about a ticker, `prices` for the tape, `quit` to exit.",
        if scheduler.is_market_open() { "open" } else { "closed" }
    );

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let query = line.trim();
        match query {
            "" => continue,
            "quit" | "exit" => break,
            "prices" => print_prices(&scheduler),
            _ => {
                let tracked = track_query(&scheduler, query, filter);
                if tracked.is_empty() {
                    println!("No new symbols in that question.");
                }
                for (symbol, first) in tracked {
                    report(&reporter, symbol, first);
                }
            }
        }
    }

    info!("Shutting down...");
    scheduler.stop();
    drop(reporter);
    if report_thread.join().is_err() {
        error!("Report thread panicked");
    }
    publisher.shutdown();
    if tick.join().is_err() {
        error!("Scheduler thread panicked");
    }
    if tape_log.join().is_err() {
        error!("Tape log thread panicked");
    }
    Ok(())
}

fn build_oracle(args: &Args, timing: &Timing) -> Result<Arc<dyn PriceOracle>, TapeError> {
    match args.oracle {
        OracleKind::Simulated => Ok(Arc::new(SimulatedOracle::new())),
        OracleKind::Http => {
            let url = args.oracle_url.as_deref().ok_or_else(|| {
                TapeError::Format("--oracle-url is required with --oracle http".to_string())
            })?;
            Ok(Arc::new(HttpOracle::new(url, timing.fetch_timeout)?))
        }
    }
}

/// Logs every published price until the publisher shuts down.
fn start_tape_log(publisher: &UpdatePublisher) -> Result<thread::JoinHandle<()>, TapeError> {
    let updates = publisher.subscribe();
    let handle = thread::Builder::new()
        .name("tape-log".to_string())
        .spawn(move || {
            for event in updates {
                match event {
                    UpdateEvent::Price(update) => {
                        info!("TAPE: {} {:.2}", update.symbol, update.price)
                    }
                    UpdateEvent::Shutdown => break,
                }
            }
        })?;
    Ok(handle)
}

/// Hands a pending first lookup to the report thread.
fn report(reporter: &Sender<(Symbol, FirstFetch)>, symbol: Symbol, first: FirstFetch) {
    if let Err(e) = reporter.send((symbol, first)) {
        error!("Report thread is gone: {}", e);
    }
}

fn print_outcome(symbol: Symbol, outcome: FirstFetchOutcome) {
    match outcome {
        FirstFetchOutcome::Resolved(price) => println!("{}: {:.2}", symbol, price),
        FirstFetchOutcome::Unavailable(reason) => {
            println!("{}: unavailable ({})", symbol, reason)
        }
    }
}

fn print_prices(scheduler: &Scheduler) {
    let registry = scheduler.registry();
    let prices = registry.lock().unwrap_or_else(|e| e.into_inner()).prices();
    if prices.is_empty() {
        println!("Nothing priced yet.");
    }
    for (symbol, price) in prices {
        println!("{:<6} {:>10.2}", symbol.as_str(), price);
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
