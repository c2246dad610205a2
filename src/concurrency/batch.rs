//! Batch progress executor
//!
//! [`run_batch`] turns a list of work items and a per-item async operation into a
//! lazy stream of [`BatchEvent`]s. Nothing is dispatched until the stream is
//! polled, and a consumer that stops polling stops the batch: no further items
//! start, and dropping the stream drops whatever was still in flight.

use crate::error::{RegistryError, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;

/// Cumulative progress of a batch.
///
/// `completed` counts settled items whether they succeeded or not; `failed`
/// is the subset that failed. Normalizing to a percentage is left to the
/// caller because several batches may feed one progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            failed: 0,
            total,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.completed - self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Re-express this progress as a continuation of `earlier`, counting
    /// toward `total` items overall.
    pub fn after(self, earlier: BatchProgress, total: usize) -> Self {
        Self {
            completed: earlier.completed + self.completed,
            failed: earlier.failed + self.failed,
            total,
        }
    }
}

/// Terminal result for one work item
#[derive(Debug)]
pub struct ItemOutcome<T, R> {
    /// Position of the item in the submitted batch
    pub index: usize,
    pub item: T,
    pub result: Result<R>,
}

impl<T, R> ItemOutcome<T, R> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug)]
pub enum BatchEvent<T, R> {
    /// One item settled; always followed by a `Progress` event
    Settled(ItemOutcome<T, R>),
    Progress(BatchProgress),
}

type ItemOp<'a, T, R> = Box<dyn FnMut(T) -> BoxFuture<'a, Result<R>> + Send + 'a>;

struct BatchState<'a, T, R> {
    pending: VecDeque<(usize, T)>,
    in_flight: FuturesUnordered<BoxFuture<'a, (usize, T, Result<R>)>>,
    op: ItemOp<'a, T, R>,
    group_size: usize,
    progress: BatchProgress,
    ready: VecDeque<BatchEvent<T, R>>,
}

impl<'a, T, R> BatchState<'a, T, R>
where
    T: Clone + Send + 'a,
    R: Send + 'a,
{
    /// Start the next group. Only called once the previous group fully settled.
    fn dispatch_group(&mut self) -> bool {
        let mut dispatched = false;
        while self.in_flight.len() < self.group_size {
            let Some((index, item)) = self.pending.pop_front() else {
                break;
            };
            let fut = (self.op)(item.clone());
            self.in_flight
                .push(async move { (index, item, fut.await) }.boxed());
            dispatched = true;
        }
        dispatched
    }

    fn settle(&mut self, index: usize, item: T, result: Result<R>) {
        self.progress.completed += 1;
        if result.is_err() {
            self.progress.failed += 1;
        }
        self.ready
            .push_back(BatchEvent::Settled(ItemOutcome { index, item, result }));
        self.ready.push_back(BatchEvent::Progress(self.progress));
    }
}

/// Run `op` over `items` and stream the outcomes.
///
/// With `concurrency_step = None` every item is dispatched at once. With
/// `Some(k)` items go out in groups of `k` and each group settles completely
/// before the next one starts; `Some(1)` is strictly serial. `Some(0)` is
/// treated as `Some(1)`.
///
/// A failing item never aborts the batch: its error is carried in its
/// [`ItemOutcome`]. Outcomes arrive in completion order, so correlate them by
/// `index` or `item`, not by position in the stream.
pub fn run_batch<'a, T, R, F, Fut>(
    items: Vec<T>,
    mut op: F,
    concurrency_step: Option<usize>,
) -> BoxStream<'a, BatchEvent<T, R>>
where
    T: Clone + Send + 'a,
    R: Send + 'a,
    F: FnMut(T) -> Fut + Send + 'a,
    Fut: Future<Output = Result<R>> + Send + 'a,
{
    let state = BatchState {
        progress: BatchProgress::new(items.len()),
        pending: items.into_iter().enumerate().collect(),
        in_flight: FuturesUnordered::new(),
        op: Box::new(move |item| op(item).boxed()),
        group_size: concurrency_step.map(|step| step.max(1)).unwrap_or(usize::MAX),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((event, state));
            }
            if state.in_flight.is_empty() && !state.dispatch_group() {
                return None;
            }
            if let Some((index, item, result)) = state.in_flight.next().await {
                state.settle(index, item, result);
            }
        }
    })
    .boxed()
}

/// Per-item results of a drained batch, sorted by submission index
#[derive(Debug)]
pub struct BatchReport<T, R> {
    pub succeeded: Vec<(usize, T, R)>,
    pub failed: Vec<(usize, T, RegistryError)>,
    pub progress: BatchProgress,
}

impl<T, R> Default for BatchReport<T, R> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            progress: BatchProgress::default(),
        }
    }
}

impl<T, R> BatchReport<T, R> {
    /// Drain a batch stream
    pub async fn collect<S>(mut events: S) -> Self
    where
        S: Stream<Item = BatchEvent<T, R>> + Unpin,
    {
        let mut report = Self::default();
        while let Some(event) = events.next().await {
            match event {
                BatchEvent::Settled(outcome) => report.record(outcome),
                BatchEvent::Progress(progress) => report.progress = progress,
            }
        }
        report.sort();
        report
    }

    pub fn record(&mut self, outcome: ItemOutcome<T, R>) {
        match outcome.result {
            Ok(value) => self.succeeded.push((outcome.index, outcome.item, value)),
            Err(err) => self.failed.push((outcome.index, outcome.item, err)),
        }
    }

    pub fn sort(&mut self) {
        self.succeeded.sort_by_key(|(index, _, _)| *index);
        self.failed.sort_by_key(|(index, _, _)| *index);
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
