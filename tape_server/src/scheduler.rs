//! Price update scheduler.
//!
//! Decides when each tracked symbol is looked up and feeds the results to the registry
//! and the publisher.
//!
//! - A periodic tick (`Timing::tick_interval`) calls `manage`, which re-reads the market
//!   session. Open: make sure the drain loop is running. Closed: run one `sweep`.
//! - The drain loop pops one symbol from the work queue per step, waiting
//!   `Timing::open_pacing` before every step, and refills the queue from the registry when
//!   it runs dry. It stops when the market closes or there is nothing left to track.
//! - `sweep` looks up every tracked symbol once, `Timing::sweep_pacing` apart.
//! - `begin_tracking` looks a brand-new symbol up immediately on its own thread. A symbol
//!   whose first lookup fails is dropped; later failures only leave the price stale.
//!
//! At most one drain step is in flight at a time (`RunGuard`) and at most one drain loop
//! is armed. Locks are never held across an oracle call.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, error, info, warn};
use tape_common::{PriceUpdate, Symbol};

use crate::market::{Clock, MarketCalendar, SystemClock};
use crate::oracle::{LookupFailure, PriceClient};
use crate::publisher::UpdatePublisher;
use crate::registry::TickerRegistry;

/// Fixed scheduling intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How often the market session is re-evaluated.
    pub tick_interval: Duration,
    /// Gap between consecutive drain lookups while the market is open.
    pub open_pacing: Duration,
    /// Gap between lookups of a closed-market sweep.
    pub sweep_pacing: Duration,
    /// Longest a single oracle lookup may take.
    pub fetch_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            open_pacing: Duration::from_secs(5),
            sweep_pacing: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(20),
        }
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// Another step was already in flight; nothing was done.
    Busy,
    /// Nothing to fetch.
    Idle,
    /// The symbol was looked up and its price recorded and published.
    Fetched(Symbol, f64),
    /// The lookup failed; the symbol keeps whatever state it had.
    Failed(Symbol),
}

/// Totals of one closed-market sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub failed: usize,
}

/// How the first lookup of a newly tracked symbol ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FirstFetchOutcome {
    /// Priced; the symbol stays tracked.
    Resolved(f64),
    /// The lookup failed and the symbol is no longer tracked.
    Unavailable(LookupFailure),
}

/// Handle on an in-flight first lookup.
#[derive(Debug)]
pub struct FirstFetch {
    symbol: Symbol,
    rx: Receiver<FirstFetchOutcome>,
}

impl FirstFetch {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Blocks until the first lookup finishes.
    pub fn wait(self) -> FirstFetchOutcome {
        self.rx
            .recv()
            .unwrap_or(FirstFetchOutcome::Unavailable(LookupFailure::Disconnected))
    }
}

/// FIFO of symbols awaiting their next drain lookup. Holds each symbol at most once.
#[derive(Debug, Default)]
struct WorkQueue {
    order: VecDeque<Symbol>,
    members: HashSet<Symbol>,
}

impl WorkQueue {
    fn refill(&mut self, symbols: Vec<Symbol>) {
        for symbol in symbols {
            self.push_if_absent(symbol);
        }
    }

    fn push_if_absent(&mut self, symbol: Symbol) -> bool {
        if !self.members.insert(symbol.clone()) {
            return false;
        }
        self.order.push_back(symbol);
        true
    }

    fn pop(&mut self) -> Option<Symbol> {
        let symbol = self.order.pop_front()?;
        self.members.remove(&symbol);
        Some(symbol)
    }

    fn remove(&mut self, symbol: &Symbol) -> bool {
        if !self.members.remove(symbol) {
            return false;
        }
        self.order.retain(|queued| queued != symbol);
        true
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn snapshot(&self) -> Vec<Symbol> {
        self.order.iter().cloned().collect()
    }
}

/// Single-flight flag for drain steps, cleared on drop.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owner of the tracking state and the polling loops.
pub struct Scheduler {
    registry: Arc<Mutex<TickerRegistry>>,
    client: PriceClient,
    publisher: Arc<UpdatePublisher>,
    calendar: MarketCalendar,
    clock: Arc<dyn Clock>,
    timing: Timing,
    queue: Mutex<WorkQueue>,
    running: AtomicBool,
    drain_armed: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
}

impl Scheduler {
    pub fn new(
        client: PriceClient,
        publisher: Arc<UpdatePublisher>,
        calendar: MarketCalendar,
        timing: Timing,
    ) -> Self {
        Self::with_clock(client, publisher, calendar, timing, Arc::new(SystemClock))
    }

    pub fn with_clock(
        client: PriceClient,
        publisher: Arc<UpdatePublisher>,
        calendar: MarketCalendar,
        timing: Timing,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(0);
        Self {
            registry: Arc::new(Mutex::new(TickerRegistry::new())),
            client,
            publisher,
            calendar,
            clock,
            timing,
            queue: Mutex::new(WorkQueue::default()),
            running: AtomicBool::new(false),
            drain_armed: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
        }
    }

    /// Shared registry handle for readers such as renderers.
    pub fn registry(&self) -> Arc<Mutex<TickerRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn publisher(&self) -> Arc<UpdatePublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn is_tracked(&self, symbol: &Symbol) -> bool {
        self.lock_registry().has(symbol)
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<f64> {
        self.lock_registry().last_price(symbol)
    }

    /// Symbols waiting in the work queue, next first.
    pub fn queued_symbols(&self) -> Vec<Symbol> {
        self.lock_queue().snapshot()
    }

    /// Whether a drain loop is currently armed.
    pub fn is_draining(&self) -> bool {
        self.drain_armed.load(Ordering::Acquire)
    }

    /// Session state right now. Never cached.
    pub fn is_market_open(&self) -> bool {
        self.calendar.is_open(self.clock.now())
    }

    /// Starts the periodic tick on its own thread.
    pub fn run(self: Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tape-tick".to_string())
            .spawn(move || {
                info!(
                    "Scheduler started: tick every {:?}, open pacing {:?}, sweep pacing {:?}",
                    self.timing.tick_interval, self.timing.open_pacing, self.timing.sweep_pacing
                );
                loop {
                    self.manage();
                    if !self.pause(self.timing.tick_interval) {
                        break;
                    }
                }
                info!("Scheduler stopped");
            })
    }

    /// Stops the tick and drain loops at their next pause.
    pub fn stop(&self) {
        let sender = self
            .stop_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self.stop_rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }

    /// One periodic tick: drain while open, sweep while closed.
    pub fn manage(self: &Arc<Self>) {
        if self.is_market_open() {
            debug!("Tick: market open");
            self.kick_drain();
        } else {
            debug!("Tick: market closed, sweeping");
            let report = self.sweep();
            if report.fetched + report.failed > 0 {
                info!(
                    "Sweep finished: {} updated, {} failed",
                    report.fetched, report.failed
                );
            }
        }
    }

    /// Looks up the next queued symbol, refilling the queue from the registry (in symbol
    /// order) first if it is empty. Queued symbols that are no longer tracked are skipped.
    pub fn drain_step(&self) -> DrainOutcome {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            debug!("Drain step skipped: lookup already in flight");
            return DrainOutcome::Busy;
        };

        let Some(symbol) = self.next_queued() else {
            return DrainOutcome::Idle;
        };

        match self.fetch_and_record(&symbol) {
            Ok(price) => DrainOutcome::Fetched(symbol, price),
            Err(_) => DrainOutcome::Failed(symbol),
        }
    }

    fn next_queued(&self) -> Option<Symbol> {
        let mut queue = self.lock_queue();
        let registry = self.lock_registry();
        let mut refilled = false;
        loop {
            match queue.pop() {
                Some(symbol) if registry.has(&symbol) => return Some(symbol),
                Some(symbol) => debug!("Skipping {}: no longer tracked", symbol),
                None if refilled => return None,
                None => {
                    let mut keys = registry.snapshot_keys();
                    keys.sort();
                    if !keys.is_empty() {
                        debug!("Refilling work queue with {} symbol(s)", keys.len());
                    }
                    queue.refill(keys);
                    refilled = true;
                }
            }
        }
    }

    /// Looks up every tracked symbol once, in symbol order, pausing between lookups.
    /// Leaves the work queue alone.
    pub fn sweep(&self) -> SweepReport {
        let mut symbols = self.lock_registry().snapshot_keys();
        symbols.sort();

        let mut report = SweepReport::default();
        for (index, symbol) in symbols.iter().enumerate() {
            if index > 0 && !self.pause(self.timing.sweep_pacing) {
                break;
            }
            match self.fetch_and_record(symbol) {
                Ok(_) => report.fetched += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Starts tracking `symbol` and looks it up right away.
    ///
    /// Returns `None` if it was already tracked. On success the symbol is queued for the
    /// drain loop when the market is open; on failure it is dropped again.
    pub fn begin_tracking(self: &Arc<Self>, symbol: Symbol) -> Option<FirstFetch> {
        if !self.lock_registry().begin_tracking(&symbol) {
            return None;
        }

        let (tx, rx) = bounded(1);
        let this = Arc::clone(self);
        let worker_symbol = symbol.clone();
        let spawned = thread::Builder::new()
            .name(format!("first-{}", symbol))
            .spawn(move || {
                let outcome = this.first_fetch(&worker_symbol);
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            error!("Failed to start first lookup for {}: {}", symbol, e);
            self.evict_unresolved(&symbol);
        }

        Some(FirstFetch { symbol, rx })
    }

    fn first_fetch(self: &Arc<Self>, symbol: &Symbol) -> FirstFetchOutcome {
        match self.fetch_and_record(symbol) {
            Ok(price) => {
                if self.is_market_open() {
                    if self.lock_queue().push_if_absent(symbol.clone()) {
                        debug!("Queued {} for draining", symbol);
                    }
                    self.kick_drain();
                }
                FirstFetchOutcome::Resolved(price)
            }
            Err(failure) => {
                if self.evict_unresolved(symbol) {
                    info!("{} unavailable: {}", symbol, failure);
                }
                FirstFetchOutcome::Unavailable(failure)
            }
        }
    }

    /// Drops a never-priced symbol from the registry and the work queue.
    fn evict_unresolved(&self, symbol: &Symbol) -> bool {
        if !self.lock_registry().drop_if_never_resolved(symbol) {
            return false;
        }
        if self.lock_queue().remove(symbol) {
            debug!("Removed {} from the work queue", symbol);
        }
        true
    }

    fn fetch_and_record(&self, symbol: &Symbol) -> Result<f64, LookupFailure> {
        match self.client.fetch_price(symbol) {
            Ok(price) => {
                // Record and publish under one lock so per-symbol order holds.
                let mut registry = self.lock_registry();
                if !registry.record_price(symbol, price) {
                    return Err(LookupFailure::Untracked);
                }
                self.publisher
                    .publish(PriceUpdate::now(symbol.clone(), price));
                Ok(price)
            }
            Err(failure) => {
                warn!("Lookup for {} failed: {}", symbol, failure);
                Err(failure)
            }
        }
    }

    fn kick_drain(self: &Arc<Self>) {
        if self
            .drain_armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("tape-drain".to_string())
            .spawn(move || this.drain_loop());
        if let Err(e) = spawned {
            error!("Failed to start drain loop: {}", e);
            self.drain_armed.store(false, Ordering::Release);
        }
    }

    fn drain_loop(self: Arc<Self>) {
        debug!("Drain loop armed");
        loop {
            if !self.pause(self.timing.open_pacing) {
                break;
            }
            if !self.is_market_open() {
                debug!("Drain loop: market closed");
                break;
            }
            match self.drain_step() {
                DrainOutcome::Idle => break,
                DrainOutcome::Fetched(symbol, price) => {
                    debug!("Drained {} at {:.2}", symbol, price)
                }
                DrainOutcome::Failed(_) | DrainOutcome::Busy => {}
            }
        }
        self.drain_armed.store(false, Ordering::Release);
        debug!("Drain loop disarmed");

        // A fast-path push may have landed after the last step.
        if !self.is_stopped() && self.is_market_open() && !self.lock_queue().is_empty() {
            self.kick_drain();
        }
    }

    /// Sleeps for `duration`; returns `false` if the scheduler was stopped meanwhile.
    fn pause(&self, duration: Duration) -> bool {
        matches!(
            self.stop_rx.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }

    fn lock_registry(&self) -> MutexGuard<'_, TickerRegistry> {
        self.registry.lock().unwrap_or_else(|e| {
            warn!("Registry lock was poisoned; continuing with inner state");
            e.into_inner()
        })
    }

    fn lock_queue(&self) -> MutexGuard<'_, WorkQueue> {
        self.queue.lock().unwrap_or_else(|e| {
            warn!("Work queue lock was poisoned; continuing with inner state");
            e.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use tape_common::{Result, TapeError};

    use super::*;
    use crate::market::{ManualClock, MarketMode};
    use crate::oracle::{PriceOracle, SimulatedOracle};
    use crate::publisher::UpdateEvent;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn quick_timing() -> Timing {
        Timing {
            tick_interval: Duration::from_secs(3600),
            open_pacing: Duration::from_secs(3600),
            sweep_pacing: Duration::from_millis(1),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    fn scheduler(oracle: Arc<dyn PriceOracle>, mode: MarketMode) -> Arc<Scheduler> {
        scheduler_with_timing(oracle, mode, quick_timing())
    }

    fn scheduler_with_timing(
        oracle: Arc<dyn PriceOracle>,
        mode: MarketMode,
        timing: Timing,
    ) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            PriceClient::new(oracle, timing.fetch_timeout),
            Arc::new(UpdatePublisher::new()),
            MarketCalendar::new(mode),
            timing,
        ))
    }

    /// Tracks `symbols` with a price already set, skipping the first-lookup path.
    fn seed(scheduler: &Scheduler, symbols: &[(&str, f64)]) {
        let registry = scheduler.registry();
        let mut registry = registry.lock().unwrap();
        for (symbol, price) in symbols {
            registry.begin_tracking(&sym(symbol));
            registry.record_price(&sym(symbol), *price);
        }
    }

    fn published(rx: &Receiver<UpdateEvent>) -> Vec<(String, f64)> {
        rx.try_iter()
            .filter_map(|event| match event {
                UpdateEvent::Price(u) => Some((u.symbol.to_string(), u.price)),
                UpdateEvent::Shutdown => None,
            })
            .collect()
    }

    /// Answers `$<n>.00` where n counts lookups per symbol, and records every call.
    /// The `refused` symbol gets an answer without a price.
    #[derive(Default)]
    struct CountingOracle {
        calls: Mutex<Vec<(Symbol, Instant)>>,
        refused: Option<Symbol>,
    }

    impl CountingOracle {
        fn refusing(symbol: &str) -> Self {
            Self {
                refused: Some(sym(symbol)),
                ..Self::default()
            }
        }

        fn calls_for(&self, symbol: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s.as_str() == symbol)
                .count()
        }

        fn total(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }
    }

    impl PriceOracle for CountingOracle {
        fn lookup(&self, symbol: &Symbol) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((symbol.clone(), Instant::now()));
            if self.refused.as_ref() == Some(symbol) {
                return Ok("no quote for that one".to_string());
            }
            let n = calls.iter().filter(|(s, _)| s == symbol).count();
            Ok(format!("${}.00", n))
        }
    }

    fn wait_until(what: &str, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Replays scripted answers per symbol; `None` is an oracle error.
    struct ScriptedOracle {
        answers: Mutex<HashMap<Symbol, VecDeque<Option<&'static str>>>>,
    }

    impl ScriptedOracle {
        fn new(symbol: &str, answers: &[Option<&'static str>]) -> Self {
            let answers = HashMap::from([(sym(symbol), answers.iter().copied().collect())]);
            Self {
                answers: Mutex::new(answers),
            }
        }
    }

    impl PriceOracle for ScriptedOracle {
        fn lookup(&self, symbol: &Symbol) -> Result<String> {
            let next = self
                .answers
                .lock()
                .unwrap()
                .get_mut(symbol)
                .and_then(|answers| answers.pop_front())
                .flatten();
            next.map(str::to_string)
                .ok_or_else(|| TapeError::oracle(symbol.as_str(), "scripted failure"))
        }
    }

    /// Blocks every lookup until released; tracks how many run at once.
    struct GatedOracle {
        started: Sender<()>,
        gate: Receiver<()>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl PriceOracle for GatedOracle {
        fn lookup(&self, _symbol: &Symbol) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _ = self.started.send(());
            let _ = self.gate.recv();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("$50".to_string())
        }
    }

    #[test]
    fn new_symbol_is_fetched_immediately_and_published() {
        let scheduler = scheduler(Arc::new(SimulatedOracle::new()), MarketMode::Open);
        let rx = scheduler.publisher().subscribe();

        let first = scheduler.begin_tracking(sym("AAPL")).expect("new symbol");
        let FirstFetchOutcome::Resolved(price) = first.wait() else {
            panic!("AAPL should resolve");
        };

        assert_eq!(published(&rx), vec![("AAPL".to_string(), price)]);
        assert_eq!(scheduler.last_price(&sym("AAPL")), Some(price));
        assert_eq!(scheduler.queued_symbols(), vec![sym("AAPL")]);
        assert!(scheduler.is_draining());
        scheduler.stop();
    }

    #[test]
    fn unknown_symbol_is_dropped_without_notification() {
        let scheduler = scheduler(Arc::new(SimulatedOracle::new()), MarketMode::Open);
        let rx = scheduler.publisher().subscribe();

        let outcome = scheduler.begin_tracking(sym("ZZZZZ")).unwrap().wait();

        assert!(matches!(
            outcome,
            FirstFetchOutcome::Unavailable(LookupFailure::Unparseable(_))
        ));
        assert!(!scheduler.is_tracked(&sym("ZZZZZ")));
        assert!(published(&rx).is_empty());
        assert!(scheduler.queued_symbols().is_empty());
    }

    #[test]
    fn tracking_twice_issues_one_lookup() {
        let oracle = Arc::new(CountingOracle::default());
        let scheduler = scheduler(oracle.clone(), MarketMode::Closed);

        let first = scheduler.begin_tracking(sym("MSFT")).unwrap();
        assert!(scheduler.begin_tracking(sym("MSFT")).is_none());
        assert_eq!(first.wait(), FirstFetchOutcome::Resolved(1.0));
        assert!(scheduler.begin_tracking(sym("MSFT")).is_none());
        assert_eq!(oracle.total(), 1);
    }

    #[test]
    fn closed_market_does_not_queue_new_symbols() {
        let scheduler = scheduler(Arc::new(SimulatedOracle::new()), MarketMode::Closed);
        let outcome = scheduler.begin_tracking(sym("NVDA")).unwrap().wait();
        assert!(matches!(outcome, FirstFetchOutcome::Resolved(_)));
        assert!(scheduler.queued_symbols().is_empty());
        assert!(!scheduler.is_draining());
    }

    #[test]
    fn first_lookup_timeout_drops_the_symbol() {
        let (started_tx, _started_rx) = crossbeam_channel::unbounded();
        let (_gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
        let oracle = Arc::new(GatedOracle {
            started: started_tx,
            gate: gate_rx,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let timing = Timing {
            fetch_timeout: Duration::from_millis(30),
            ..quick_timing()
        };
        let scheduler = scheduler_with_timing(oracle, MarketMode::Closed, timing);

        let outcome = scheduler.begin_tracking(sym("SLOW")).unwrap().wait();
        assert_eq!(
            outcome,
            FirstFetchOutcome::Unavailable(LookupFailure::TimedOut(Duration::from_millis(30)))
        );
        assert!(!scheduler.is_tracked(&sym("SLOW")));
    }

    #[test]
    fn priced_symbol_survives_later_failures() {
        let oracle = Arc::new(ScriptedOracle::new(
            "AAPL",
            &[Some("$10.00"), Some("no idea"), None, Some("$0"), Some("$12.50")],
        ));
        let scheduler = scheduler(oracle, MarketMode::Closed);
        let rx = scheduler.publisher().subscribe();

        assert_eq!(
            scheduler.begin_tracking(sym("AAPL")).unwrap().wait(),
            FirstFetchOutcome::Resolved(10.0)
        );
        assert_eq!(scheduler.drain_step(), DrainOutcome::Failed(sym("AAPL")));
        assert_eq!(scheduler.drain_step(), DrainOutcome::Failed(sym("AAPL")));
        assert_eq!(scheduler.sweep(), SweepReport { fetched: 0, failed: 1 });
        assert!(scheduler.is_tracked(&sym("AAPL")));
        assert_eq!(scheduler.last_price(&sym("AAPL")), Some(10.0));

        assert_eq!(scheduler.drain_step(), DrainOutcome::Fetched(sym("AAPL"), 12.5));
        assert_eq!(scheduler.last_price(&sym("AAPL")), Some(12.5));
        assert_eq!(
            published(&rx),
            vec![("AAPL".to_string(), 10.0), ("AAPL".to_string(), 12.5)]
        );
    }

    #[test]
    fn drain_visits_each_symbol_once_before_refilling() {
        let oracle = Arc::new(CountingOracle::default());
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0), ("MSFT", 1.0)]);

        let first = scheduler.drain_step();
        let second = scheduler.drain_step();
        assert!(matches!(first, DrainOutcome::Fetched(..)));
        assert!(matches!(second, DrainOutcome::Fetched(..)));
        assert_eq!(oracle.calls_for("AAPL"), 1);
        assert_eq!(oracle.calls_for("MSFT"), 1);
        assert!(scheduler.queued_symbols().is_empty());

        let third = scheduler.drain_step();
        assert!(matches!(third, DrainOutcome::Fetched(..)));
        assert_eq!(oracle.total(), 3);
        assert_eq!(scheduler.queued_symbols().len(), 1);
    }

    #[test]
    fn refill_matches_registry_without_duplicates() {
        let oracle = Arc::new(CountingOracle::default());
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0), ("MSFT", 1.0), ("TSLA", 1.0)]);

        let DrainOutcome::Fetched(popped, _) = scheduler.drain_step() else {
            panic!("expected a lookup");
        };
        let mut refilled = scheduler.queued_symbols();
        refilled.push(popped);
        refilled.sort();
        assert_eq!(refilled, vec![sym("AAPL"), sym("MSFT"), sym("TSLA")]);
    }

    #[test]
    fn empty_registry_is_idle() {
        let scheduler = scheduler(Arc::new(CountingOracle::default()), MarketMode::Open);
        assert_eq!(scheduler.drain_step(), DrainOutcome::Idle);
        assert_eq!(scheduler.sweep(), SweepReport::default());
    }

    #[test]
    fn at_most_one_drain_lookup_in_flight() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let oracle = Arc::new(GatedOracle {
            started: started_tx,
            gate: gate_rx,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0), ("MSFT", 1.0)]);

        let busy_step = {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.drain_step())
        };
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first lookup should start");

        let contenders: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || scheduler.drain_step())
            })
            .collect();
        for contender in contenders {
            assert_eq!(contender.join().unwrap(), DrainOutcome::Busy);
        }

        gate_tx.send(()).unwrap();
        assert!(matches!(
            busy_step.join().unwrap(),
            DrainOutcome::Fetched(_, price) if price == 50.0
        ));

        gate_tx.send(()).unwrap();
        assert!(matches!(scheduler.drain_step(), DrainOutcome::Fetched(..)));
        assert_eq!(oracle.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sweep_fetches_every_symbol_and_leaves_queue_alone() {
        let oracle = Arc::new(CountingOracle::default());
        let scheduler = scheduler(oracle.clone(), MarketMode::Closed);
        seed(&scheduler, &[("TSLA", 1.0), ("AAPL", 1.0), ("MSFT", 1.0)]);
        let rx = scheduler.publisher().subscribe();

        assert_eq!(scheduler.sweep(), SweepReport { fetched: 3, failed: 0 });
        let symbols: Vec<String> = published(&rx).into_iter().map(|(s, _)| s).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "TSLA"]);
        assert!(scheduler.queued_symbols().is_empty());
    }

    #[test]
    fn manage_sweeps_when_closed_and_drains_when_open() {
        let clock = Arc::new(ManualClock::new(
            New_York
                .with_ymd_and_hms(2024, 7, 6, 12, 0, 0)
                .unwrap()
                .with_timezone(&chrono::Utc),
        ));
        let oracle = Arc::new(CountingOracle::default());
        let timing = quick_timing();
        let scheduler = Arc::new(Scheduler::with_clock(
            PriceClient::new(oracle.clone(), timing.fetch_timeout),
            Arc::new(UpdatePublisher::new()),
            MarketCalendar::default(),
            timing,
            clock.clone(),
        ));
        seed(&scheduler, &[("AAPL", 1.0), ("MSFT", 1.0)]);

        // Saturday: one sweep over both symbols, no drain loop.
        scheduler.manage();
        assert_eq!(oracle.total(), 2);
        assert!(!scheduler.is_draining());

        // Monday morning: the drain loop is armed and waits out its pacing first.
        clock.set(
            New_York
                .with_ymd_and_hms(2024, 7, 8, 10, 0, 0)
                .unwrap()
                .with_timezone(&chrono::Utc),
        );
        scheduler.manage();
        assert!(scheduler.is_draining());
        assert_eq!(oracle.total(), 2);
        scheduler.stop();
    }

    #[test]
    fn drain_loop_paces_lookups_and_stops_on_request() {
        let pacing = Duration::from_millis(100);
        let oracle = Arc::new(CountingOracle::default());
        let timing = Timing {
            open_pacing: pacing,
            ..quick_timing()
        };
        let scheduler = scheduler_with_timing(oracle.clone(), MarketMode::Open, timing);
        seed(&scheduler, &[("AAPL", 1.0), ("MSFT", 1.0)]);

        let armed_at = Instant::now();
        scheduler.manage();
        wait_until("three drain lookups", || oracle.total() >= 3);
        scheduler.stop();
        wait_until("the drain loop to disarm", || !scheduler.is_draining());

        let times = oracle.call_times();
        assert!(times[0].duration_since(armed_at) >= pacing);
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= pacing);
        }

        let total = oracle.total();
        thread::sleep(pacing * 2);
        assert_eq!(oracle.total(), total);
        assert!(scheduler.is_stopped());
    }

    #[test]
    fn evicted_symbol_leaves_the_work_queue() {
        let oracle = Arc::new(CountingOracle::refusing("ZZZZZ"));
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0)]);
        scheduler.registry().lock().unwrap().begin_tracking(&sym("ZZZZZ"));

        assert_eq!(scheduler.drain_step(), DrainOutcome::Fetched(sym("AAPL"), 1.0));
        assert_eq!(scheduler.queued_symbols(), vec![sym("ZZZZZ")]);

        assert!(scheduler.evict_unresolved(&sym("ZZZZZ")));
        assert!(scheduler.queued_symbols().is_empty());
        assert!(!scheduler.is_tracked(&sym("ZZZZZ")));

        for _ in 0..3 {
            assert!(matches!(
                scheduler.drain_step(),
                DrainOutcome::Fetched(symbol, _) if symbol == sym("AAPL")
            ));
        }
        assert_eq!(oracle.calls_for("ZZZZZ"), 0);
    }

    #[test]
    fn drain_skips_queued_symbols_that_are_no_longer_tracked() {
        let oracle = Arc::new(CountingOracle::refusing("ZZZZZ"));
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0)]);
        scheduler.registry().lock().unwrap().begin_tracking(&sym("ZZZZZ"));

        scheduler.drain_step();
        assert_eq!(scheduler.queued_symbols(), vec![sym("ZZZZZ")]);
        scheduler
            .registry()
            .lock()
            .unwrap()
            .drop_if_never_resolved(&sym("ZZZZZ"));

        assert_eq!(scheduler.drain_step(), DrainOutcome::Fetched(sym("AAPL"), 2.0));
        assert_eq!(oracle.calls_for("ZZZZZ"), 0);
    }

    #[test]
    fn failed_first_lookup_is_not_retried_by_the_drain() {
        let oracle = Arc::new(CountingOracle::refusing("ZZZZZ"));
        let scheduler = scheduler(oracle.clone(), MarketMode::Open);
        seed(&scheduler, &[("AAPL", 1.0)]);

        let outcome = scheduler.begin_tracking(sym("ZZZZZ")).unwrap().wait();
        assert!(matches!(outcome, FirstFetchOutcome::Unavailable(_)));
        assert_eq!(scheduler.drain_step(), DrainOutcome::Fetched(sym("AAPL"), 1.0));
        assert_eq!(scheduler.drain_step(), DrainOutcome::Fetched(sym("AAPL"), 2.0));
        assert_eq!(oracle.calls_for("ZZZZZ"), 1);
    }

    #[test]
    fn work_queue_holds_each_symbol_once() {
        let mut queue = WorkQueue::default();
        queue.refill(vec![sym("AAPL"), sym("MSFT"), sym("AAPL")]);
        assert!(!queue.push_if_absent(sym("MSFT")));
        assert_eq!(queue.snapshot(), vec![sym("AAPL"), sym("MSFT")]);

        assert_eq!(queue.pop(), Some(sym("AAPL")));
        assert!(queue.push_if_absent(sym("AAPL")));
        assert_eq!(queue.snapshot(), vec![sym("MSFT"), sym("AAPL")]);
    }

    #[test]
    fn run_guard_clears_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = RunGuard::try_acquire(&flag).expect("free");
            assert!(RunGuard::try_acquire(&flag).is_none());
        }
        assert!(RunGuard::try_acquire(&flag).is_some());
    }
}
