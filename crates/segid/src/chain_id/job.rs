use alloc::{string::String, sync::Arc};

use crate::{
    chain_id::ChainState,
    concurrent::{Affinity, AffinityJob},
    distributor::SegmentDistributor,
    error::Result,
    mutex::{Mutex, lock},
    segment::{IdSegment, SegmentChain},
};

/// Upper bound on how many segments one hungry prefetch may append.
pub const MAX_PREFETCH_DISTANCE: u32 = 100_000_000;

struct PrefetchState {
    prefetch_distance: u32,
    tail: Arc<SegmentChain>,
}

/// Keeps a namespace's chain `safe_distance` segments ahead of its head.
///
/// While consumers keep signalling hunger the prefetch distance doubles on
/// every round; once they calm down it halves back towards the safe
/// distance.
pub(crate) struct PrefetchJob<D> {
    job_id: String,
    chain: Arc<ChainState<D>>,
    affinity: Affinity,
    state: Mutex<PrefetchState>,
}

impl<D> PrefetchJob<D>
where
    D: SegmentDistributor,
{
    pub(crate) fn new(chain: Arc<ChainState<D>>) -> Self {
        let tail = chain.head();
        let prefetch_distance = chain.safe_distance();
        Self {
            job_id: chain.distributor().namespace().into(),
            chain,
            affinity: Affinity::new(),
            state: Mutex::new(PrefetchState {
                prefetch_distance,
                tail,
            }),
        }
    }

    pub(crate) fn prefetch_distance(&self) -> u32 {
        lock(&self.state).map_or(0, |state| state.prefetch_distance)
    }

    pub(crate) fn tail(&self) -> Option<Arc<SegmentChain>> {
        lock(&self.state)
            .ok()
            .map(|state| Arc::clone(&state.tail))
    }

    pub(crate) fn prefetch(&self, hungry: bool) -> Result<()> {
        let mut state = lock(&self.state)?;
        let safe_distance = self.chain.safe_distance();

        let previous = state.prefetch_distance;
        state.prefetch_distance = if hungry {
            previous.saturating_mul(2).min(MAX_PREFETCH_DISTANCE)
        } else {
            (previous / 2).max(safe_distance)
        };
        #[cfg(feature = "tracing")]
        if previous != state.prefetch_distance {
            tracing::debug!(
                job = %self.job_id,
                hungry,
                from = previous,
                to = state.prefetch_distance,
                "prefetch distance adjusted"
            );
        }

        // The first node that can still hand out ids, or the tail.
        let mut available = self.chain.head();
        while !available.is_available() {
            match available.next() {
                Some(next) => available = Arc::clone(next),
                None => {
                    available = Arc::clone(&state.tail);
                    break;
                }
            }
        }
        self.chain.forward(&available);

        let step = self.chain.distributor().step();
        let head_to_tail = available.gap(&state.tail, step);
        let safe_gap = i64::from(safe_distance) - head_to_tail;
        if safe_gap <= 0 && !hungry {
            return Ok(());
        }

        let segments = if hungry {
            state.prefetch_distance
        } else {
            u32::try_from(safe_gap).unwrap_or(safe_distance)
        };
        let linked = state
            .tail
            .ensure_set_next(|previous| self.chain.next_segment_chain(previous, segments))?;
        let tail = linked.next().map_or(linked.clone(), Arc::clone).last();

        #[cfg(feature = "tracing")]
        tracing::debug!(job = %self.job_id, segments, tail = %tail, "prefetched");
        state.tail = tail;
        Ok(())
    }
}

impl<D> AffinityJob for PrefetchJob<D>
where
    D: SegmentDistributor,
{
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn run(&self) -> Result<()> {
        self.prefetch(self.affinity.is_hungry())
    }

    fn affinity(&self) -> &Affinity {
        &self.affinity
    }
}
