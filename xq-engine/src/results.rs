//! Result iteration

use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Instant;

use xq_engine_traits::{QueryResult, QueryResults, Result, RunInfo};

use crate::query::QueryInner;

/// Forward-only cursor over the items of one run.
///
/// Each step pulls from the native query and may block, so drive it from a
/// worker (for example inside [`Pending::then`](crate::Pending::then)) when
/// the engine evaluates lazily. The cursor cannot be restarted; once a newer
/// run of the same query starts, it yields nothing more.
pub struct ResultIterator {
    query: Arc<QueryInner>,
    generation: u64,
    position: usize,
    started: Instant,
    done: bool,
}

impl ResultIterator {
    pub(crate) fn new(query: Arc<QueryInner>, generation: u64, started: Instant) -> Self {
        Self {
            query,
            generation,
            position: 0,
            started,
            done: false,
        }
    }

    /// Number of items produced so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Timing and plan the engine reported for this run
    pub fn info(&self) -> Result<RunInfo> {
        self.query.info(self.generation)
    }

    /// Drain the remaining items.
    ///
    /// The elapsed time is the engine's own figure when it reports one,
    /// otherwise the wall time since the run was dispatched to a worker.
    pub fn into_results(mut self) -> Result<QueryResults> {
        let items = self.by_ref().collect::<Result<Vec<_>>>()?;
        let info = self.info()?;
        Ok(QueryResults {
            items,
            elapsed: info.elapsed.unwrap_or_else(|| self.started.elapsed()),
            plan: info.plan,
        })
    }
}

impl Iterator for ResultIterator {
    type Item = Result<QueryResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.query.pull(self.generation) {
            Ok(Some(item)) => {
                let item = item.at(self.position);
                self.position += 1;
                Some(Ok(item))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for ResultIterator {}

impl std::fmt::Debug for ResultIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIterator")
            .field("position", &self.position)
            .field("done", &self.done)
            .finish()
    }
}
