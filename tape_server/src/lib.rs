//! Ticker tape server library.
//!
//! Keeps a working set of stock symbols priced while the market trades and publishes
//! every new price to local and remote tapes.
//!
//! - `market`: trading session calendar (America/New_York) and clocks.
//! - `registry`: the tracked symbols and their last known prices.
//! - `oracle`: price lookups with timeout and answer validation.
//! - `scheduler`: tick, drain loop, sweeps and the new-symbol fast path.
//! - `publisher`: fan-out of price updates to subscribers.
//! - `tracking`: turns free-text queries into tracked symbols.
//! - `distribution`: TCP subscriptions and UDP streaming to remote tapes.
pub mod distribution;
pub mod market;
pub mod oracle;
pub mod publisher;
pub mod registry;
pub mod scheduler;
pub mod tracking;

pub use publisher::{UpdateEvent, UpdatePublisher};
pub use scheduler::{DrainOutcome, FirstFetch, FirstFetchOutcome, Scheduler, Timing};
