//! Dispatch of independent per-channel work.
//!
//! Work items are split into disjoint contiguous partitions, one per worker.
//! Each worker owns its partition, runs it to completion and sends the
//! results back to the coordinator over a channel. The coordinator
//! reassembles partitions in their original order, so the output of
//! [`Dispatcher::dispatch`] never depends on the worker count.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bevy::prelude::Resource;
use crossbeam_channel::bounded;
use serde::Deserialize;
use tracing::debug;

use crate::error::SimError;

/// Where per-channel work runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Fixed-size worker pool. `workers == 0` picks rayon's default size.
    Parallel {
        #[serde(default)]
        workers: usize,
    },
}

#[derive(Resource)]
pub enum Dispatcher {
    Sequential,
    Pool(WorkerPool),
}

impl Dispatcher {
    pub fn from_mode(mode: ExecutionMode) -> Result<Self, SimError> {
        match mode {
            ExecutionMode::Sequential => Ok(Dispatcher::Sequential),
            ExecutionMode::Parallel { workers } => Ok(Dispatcher::Pool(WorkerPool::new(workers)?)),
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            Dispatcher::Sequential => 1,
            Dispatcher::Pool(pool) => pool.workers(),
        }
    }

    /// Apply `work` to every item, returning results in item order. The first
    /// failing item aborts the whole dispatch.
    pub fn dispatch<I, T, F>(&self, items: Vec<I>, work: F) -> Result<Vec<T>, SimError>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T, SimError> + Sync,
    {
        match self {
            Dispatcher::Sequential => items.into_iter().map(work).collect(),
            Dispatcher::Pool(pool) => pool.dispatch(items, work),
        }
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, SimError> {
        let workers = if workers == 0 {
            rayon::current_num_threads()
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("opinion-worker-{index}"))
            .build()
            .map_err(|err| SimError::PoolBuild(err.to_string()))?;
        debug!(target: "opinion_sim::workers", workers, "worker_pool.started");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn dispatch<I, T, F>(&self, items: Vec<I>, work: F) -> Result<Vec<T>, SimError>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T, SimError> + Sync,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let total = items.len();
        let partitions = partition(items, self.workers);
        let expected = partitions.len();
        let (sender, receiver) = bounded::<(usize, Result<Vec<T>, SimError>)>(expected);
        let work = &work;

        self.pool.scope(|scope| {
            for (index, partition) in partitions.into_iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        partition.into_iter().map(work).collect::<Result<Vec<T>, _>>()
                    }))
                    .unwrap_or_else(|payload| {
                        Err(SimError::WorkerFailed {
                            partition: index,
                            reason: panic_reason(payload.as_ref()),
                        })
                    });
                    // The receiver outlives the scope; a failed send can only
                    // mean the coordinator is already unwinding.
                    let _ = sender.send((index, outcome));
                });
            }
        });
        drop(sender);

        let mut slots: Vec<Option<Vec<T>>> = (0..expected).map(|_| None).collect();
        let mut received = 0;
        for (index, outcome) in receiver.iter() {
            slots[index] = Some(outcome?);
            received += 1;
        }
        if received != expected {
            return Err(SimError::MissingResults { expected, received });
        }

        let mut results = Vec::with_capacity(total);
        for slot in slots {
            results.extend(slot.ok_or(SimError::MissingResults { expected, received })?);
        }
        Ok(results)
    }
}

fn partition<I>(items: Vec<I>, workers: usize) -> Vec<Vec<I>> {
    let chunk = items.len().div_ceil(workers.max(1));
    let mut partitions = Vec::with_capacity(workers);
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        partitions.push(iter.by_ref().take(chunk).collect());
    }
    partitions
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_disjoint_and_cover_all_items() {
        let partitions = partition((0..10).collect::<Vec<_>>(), 4);
        assert_eq!(partitions.len(), 4);
        assert_eq!(partitions[0], vec![0, 1, 2]);
        assert_eq!(partitions[3], vec![9]);
        let flattened: Vec<i32> = partitions.into_iter().flatten().collect();
        assert_eq!(flattened, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn fewer_items_than_workers() {
        let partitions = partition(vec![1, 2], 8);
        assert_eq!(partitions, vec![vec![1], vec![2]]);
    }

    #[test]
    fn pool_preserves_item_order() {
        let dispatcher = Dispatcher::from_mode(ExecutionMode::Parallel { workers: 3 })
            .expect("pool builds");
        assert_eq!(dispatcher.workers(), 3);
        let results = dispatcher
            .dispatch((0..1000u64).collect(), |value| Ok(value * 2))
            .expect("dispatch succeeds");
        assert_eq!(results, (0..1000u64).map(|value| value * 2).collect::<Vec<_>>());
    }

    #[test]
    fn sequential_and_pool_agree() {
        let sequential = Dispatcher::Sequential
            .dispatch((0..57u32).collect(), |value| Ok(value.pow(2)))
            .expect("sequential");
        let pooled = Dispatcher::from_mode(ExecutionMode::Parallel { workers: 0 })
            .expect("pool builds")
            .dispatch((0..57u32).collect(), |value| Ok(value.pow(2)))
            .expect("pooled");
        assert_eq!(sequential, pooled);
    }

    #[test]
    fn item_error_fails_the_dispatch() {
        let dispatcher = Dispatcher::from_mode(ExecutionMode::Parallel { workers: 2 })
            .expect("pool builds");
        let result = dispatcher.dispatch((0..20u32).collect(), |value| {
            if value == 13 {
                Err(SimError::InvalidProbability(1.5))
            } else {
                Ok(value)
            }
        });
        assert_eq!(result, Err(SimError::InvalidProbability(1.5)));
    }

    #[test]
    fn worker_panic_surfaces_as_error() {
        let dispatcher = Dispatcher::from_mode(ExecutionMode::Parallel { workers: 2 })
            .expect("pool builds");
        let result = dispatcher.dispatch((0..8u32).collect(), |value| {
            if value == 7 {
                panic!("dialogue worker exploded");
            }
            Ok(value)
        });
        match result {
            Err(SimError::WorkerFailed { partition, reason }) => {
                assert_eq!(partition, 1);
                assert!(reason.contains("exploded"));
            }
            other => panic!("expected worker failure, got {other:?}"),
        }
    }

    #[test]
    fn empty_dispatch_is_empty() {
        let dispatcher = Dispatcher::from_mode(ExecutionMode::Parallel { workers: 2 })
            .expect("pool builds");
        let results: Vec<u32> = dispatcher
            .dispatch(Vec::<u32>::new(), Ok)
            .expect("empty dispatch");
        assert!(results.is_empty());
    }
}
