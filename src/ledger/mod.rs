pub mod replayer;
pub mod snapshot;

pub use replayer::{Applied, DuplicatePolicy, LedgerReplayer, ReplayStats, Sentinels};
pub use snapshot::LedgerSnapshot;
