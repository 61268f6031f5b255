// Strategy chain: run strategies one at a time in priority order until enough
// unique records have accumulated. A failing, empty or timed-out strategy is a
// zero-yield step, never a chain failure. Time spent queued on the rate limiter
// is not a timeout; only an upstream call that exceeds its own deadline is.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use creatorsignal_common::{
    ChainConfig, ChainState, HarvestError, RawRecord, StrategyOutcome, StrategyReport,
};
use tracing::{info, warn};

use crate::strategies::{Strategy, StrategyRequest};

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// `Sufficient` or `Exhausted`.
    pub state: ChainState,
    /// Unique records in arrival order.
    pub records: Vec<RawRecord>,
    pub reports: Vec<StrategyReport>,
}

pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
    config: ChainConfig,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, config: ChainConfig) -> Self {
        Self { strategies, config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub async fn run(&self, request: &StrategyRequest) -> ChainOutcome {
        let mut state = ChainState::Idle;
        let mut seen = HashSet::new();
        let mut records: Vec<RawRecord> = Vec::new();
        let mut reports = Vec::with_capacity(self.strategies.len());
        let mut backoff: Option<Duration> = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                let delay = backoff
                    .take()
                    .map_or(self.config.inter_strategy_delay, |hint| {
                        hint.min(self.config.max_retry_after)
                            .max(self.config.inter_strategy_delay)
                    });
                tokio::time::sleep(delay).await;
            }

            state = ChainState::Running(index);
            info!(
                resource = %request.resource,
                strategy = strategy.name(),
                kind = strategy.kind().as_str(),
                index,
                "chain: running strategy"
            );

            let (fetched, failure) = match strategy.fetch(request).await {
                Ok(fetched) => (fetched, None),
                Err(e @ HarvestError::Timeout { .. }) => {
                    warn!(strategy = strategy.name(), error = %e, "chain: strategy timed out");
                    (Vec::new(), Some(StrategyOutcome::TimedOut))
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "chain: strategy failed");
                    if let Some(hint) = e.retry_after() {
                        backoff = Some(hint);
                    }
                    (Vec::new(), Some(StrategyOutcome::Failed(e.to_string())))
                }
            };

            let mut yielded = 0;
            for record in fetched {
                if record.score < self.config.min_record_score {
                    continue;
                }
                if seen.insert(record.dedup_key()) {
                    records.push(record);
                    yielded += 1;
                }
            }

            let outcome = failure.unwrap_or(if yielded == 0 {
                StrategyOutcome::Empty
            } else {
                StrategyOutcome::Ok
            });
            info!(
                strategy = strategy.name(),
                yielded,
                accumulated = records.len(),
                "chain: strategy complete"
            );
            reports.push(StrategyReport {
                name: strategy.name().to_string(),
                kind: strategy.kind(),
                yielded,
                outcome,
            });

            if records.len() >= self.config.sufficiency_threshold {
                state = ChainState::Sufficient;
                break;
            }
        }

        if state == ChainState::Sufficient {
            for strategy in self.strategies.iter().skip(reports.len()) {
                reports.push(StrategyReport {
                    name: strategy.name().to_string(),
                    kind: strategy.kind(),
                    yielded: 0,
                    outcome: StrategyOutcome::Skipped,
                });
            }
        } else {
            state = ChainState::Exhausted;
        }

        info!(
            resource = %request.resource,
            state = ?state,
            records = records.len(),
            "chain: finished"
        );
        ChainOutcome {
            state,
            records,
            reports,
        }
    }
}
