//! Entry point from user queries into the scheduler.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use log::{debug, info};
use tape_common::Symbol;
use tape_common::tickers::{SymbolFilter, extract_symbols};

use crate::scheduler::{FirstFetch, FirstFetchOutcome, Scheduler};

/// Extracts ticker-like tokens from `text` and starts tracking the ones not yet tracked.
///
/// Returns a handle per newly tracked symbol so the caller can wait for its first price.
pub fn track_query(
    scheduler: &Arc<Scheduler>,
    text: &str,
    filter: SymbolFilter,
) -> Vec<(Symbol, FirstFetch)> {
    let candidates = extract_symbols(text, filter);
    debug!("Query {:?} yielded candidates {:?}", text, candidates);

    candidates
        .into_iter()
        .filter_map(|symbol| {
            let first = scheduler.begin_tracking(symbol.clone())?;
            info!("Tracking {}", symbol);
            Some((symbol, first))
        })
        .collect()
}

/// Starts a thread that waits on first lookups sent to it and passes each outcome to
/// `on_outcome`, in the order the handles were sent.
///
/// The thread ends once every sender is dropped and the queued handles are resolved.
pub fn spawn_reporter<F>(
    mut on_outcome: F,
) -> std::io::Result<(Sender<(Symbol, FirstFetch)>, JoinHandle<()>)>
where
    F: FnMut(Symbol, FirstFetchOutcome) + Send + 'static,
{
    let (tx, rx) = unbounded::<(Symbol, FirstFetch)>();
    let handle = thread::Builder::new()
        .name("first-fetch-report".to_string())
        .spawn(move || {
            for (symbol, first) in rx {
                let outcome = first.wait();
                on_outcome(symbol, outcome);
            }
        })?;
    Ok((tx, handle))
}
