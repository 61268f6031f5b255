pub mod aggregate;
pub mod cache;
pub mod chain;
pub mod extract;
pub mod fetchers;
pub mod harvester;
pub mod strategies;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod upstream;

pub use aggregate::{aggregate, DEFAULT_LIMIT};
pub use cache::{CacheBackend, CacheEntry, CacheStats, CacheStore, MemoryBackend};
pub use chain::{ChainOutcome, StrategyChain};
pub use extract::{Extractor, PatternSet, TextDoc};
pub use fetchers::{SearchHit, SerperFetcher};
pub use harvester::{Harvester, HarvesterBuilder};
pub use strategies::{default_strategies, Strategy, StrategyRequest, TableStrategy, DEFAULT_STRATEGIES};
pub use upstream::{HttpUpstream, Upstream};
