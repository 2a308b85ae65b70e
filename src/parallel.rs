//! Distributes the independent work of each tile in a batch over a thread pool.
//! Without the `rayon` feature, all work happens on the calling thread.

use crate::error::{Result, UnitResult};


/// Runs per-tile work of a file handle, either on the calling thread or on a thread pool
/// that is owned by the handle.
#[derive(Debug)]
pub(crate) struct TileWorkers {

    #[cfg(feature = "rayon")]
    pool: Option<rayon_core::ThreadPool>,
}


impl TileWorkers {

    /// Build a pool with the specified number of threads.
    /// Zero or one thread means the calling thread does all the work.
    pub fn new(thread_count: usize, purpose: &'static str) -> Self {
        #[cfg(feature = "rayon")] {
            if thread_count <= 1 {
                return TileWorkers { pool: None };
            }

            let maybe_pool = rayon_core::ThreadPoolBuilder::new()
                .num_threads(thread_count)
                .thread_name(move |index| format!("{} #{}", purpose, index))
                .build();

            // in case thread pool creation fails (for example on WASM currently),
            // we revert to sequential work
            match maybe_pool {
                Ok(pool) => TileWorkers { pool: Some(pool) },
                Err(error) => {
                    tracing::warn!(%error, purpose, "cannot create thread pool, processing tiles sequentially");
                    TileWorkers { pool: None }
                }
            }
        }

        #[cfg(not(feature = "rayon"))] {
            let _ = (thread_count, purpose);
            TileWorkers {}
        }
    }

    /// Number of threads that process tiles simultaneously.
    pub fn thread_count(&self) -> usize {
        #[cfg(feature = "rayon")] {
            self.pool.as_ref().map_or(1, |pool| pool.current_num_threads())
        }

        #[cfg(not(feature = "rayon"))] {
            1
        }
    }

    /// Process every item and block until all of them are done.
    /// The results are in the same order as the items,
    /// regardless of the order in which the work was completed.
    pub fn map<T, O, F>(&self, items: &[T], task: F) -> Vec<Result<O>>
        where T: Sync, O: Send, F: Fn(&T) -> Result<O> + Sync
    {
        #[cfg(feature = "rayon")] {
            if let Some(pool) = &self.pool {
                if items.len() > 1 {
                    let mut results: Vec<Option<Result<O>>> = items.iter().map(|_| None).collect();
                    let task = &task;

                    pool.scope(|scope| {
                        for (item, result) in items.iter().zip(results.iter_mut()) {
                            scope.spawn(move |_| *result = Some(task(item)));
                        }
                    });

                    // a panicking task propagates out of the scope, so every result is present
                    return results.into_iter()
                        .map(|result| result.unwrap_or_else(|| Err(crate::error::Error::invalid("tile task did not run"))))
                        .collect();
                }
            }
        }

        items.iter().map(task).collect()
    }
}

/// The number of threads that options use when not specified otherwise.
/// Falls back to a single thread if the parallelism of the machine cannot be determined.
pub(crate) fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// The error of the earliest failed item, if any.
pub(crate) fn first_error(results: impl IntoIterator<Item = UnitResult>) -> UnitResult {
    results.into_iter().collect()
}
