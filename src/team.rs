//! Thread team: a fixed-size rayon pool on which every worker runs a
//! construct exactly once, sharing one team-wide barrier.

use crate::error::{Result, ScanError};
use log::trace;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};

/// A team of `size` workers.
///
/// `run` is serialized per team so two constructs never share a barrier.
pub struct ThreadTeam {
    pool: ThreadPool,
    size: usize,
    run_lock: Mutex<()>,
    barrier_episodes: AtomicUsize,
}

impl ThreadTeam {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ScanError::InvalidTeamSize(size));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("inscan-worker-{}", index))
            .build()?;
        Ok(Self {
            pool,
            size,
            run_lock: Mutex::new(()),
            barrier_episodes: AtomicUsize::new(0),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Completed team-wide barrier episodes since the team was built.
    pub fn barrier_episodes(&self) -> usize {
        self.barrier_episodes.load(Ordering::Acquire)
    }

    /// Runs `op` once on every worker and returns the results in thread order.
    pub fn run<OP, R>(&self, op: OP) -> Vec<R>
    where
        OP: Fn(&TeamContext<'_>) -> R + Sync,
        R: Send,
    {
        // A poisoned lock only means an earlier construct panicked.
        let _guard = self
            .run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let barrier = Barrier::new(self.size);
        let episodes = &self.barrier_episodes;
        self.pool.broadcast(|broadcast| {
            let ctx = TeamContext {
                thread_id: broadcast.index(),
                team_size: broadcast.num_threads(),
                barrier: &barrier,
                episodes,
            };
            op(&ctx)
        })
    }
}

impl std::fmt::Debug for ThreadTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTeam")
            .field("size", &self.size)
            .field("barrier_episodes", &self.barrier_episodes())
            .finish()
    }
}

/// What a worker knows about its team while running a construct.
pub struct TeamContext<'a> {
    pub thread_id: usize,
    pub team_size: usize,
    barrier: &'a Barrier,
    episodes: &'a AtomicUsize,
}

impl TeamContext<'_> {
    /// Blocks until every worker of the team reaches the barrier.
    pub fn barrier(&self) {
        let result = self.barrier.wait();
        if result.is_leader() {
            let episode = self.episodes.fetch_add(1, Ordering::AcqRel) + 1;
            trace!("team of {} passed barrier episode {}", self.team_size, episode);
        }
    }
}
