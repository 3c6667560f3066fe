//! Batched fan-out: bound the number of simultaneous per-source actions.
//!
//! Sources are partitioned into fixed-size batches in input order. Each
//! batch runs to completion before the next starts (every action bounds
//! its own time internally, so a batch never waits indefinitely on one
//! slow source), with a short stagger pause between batches - never after
//! the last. This caps outbound concurrency at the batch size regardless
//! of how long the source list is.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;

use docsync_types::SourceId;

/// Run `per_source` against every source, at most `batch_size` at a time,
/// pausing `stagger` between batches.
pub async fn fan_out<F, Fut>(
    sources: &[SourceId],
    batch_size: usize,
    stagger: Duration,
    per_source: F,
) where
    F: Fn(SourceId) -> Fut,
    Fut: Future<Output = ()>,
{
    let batch_size = batch_size.max(1);
    let mut batches = sources.chunks(batch_size).peekable();
    while let Some(batch) = batches.next() {
        join_all(batch.iter().cloned().map(&per_source)).await;
        if batches.peek().is_some() && !stagger.is_zero() {
            tokio::time::sleep(stagger).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn sources(n: usize) -> Vec<SourceId> {
        (0..n)
            .map(|i| SourceId::new(&format!("wss://s{i}.example")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_batch_size() {
        for (n, batch_size) in [(1usize, 1usize), (5, 2), (37, 20), (40, 20)] {
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let sources = sources(n);

            fan_out(&sources, batch_size, Duration::from_millis(300), |_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

            assert!(
                peak.load(Ordering::SeqCst) <= batch_size,
                "peak {} exceeded batch size {} for {} sources",
                peak.load(Ordering::SeqCst),
                batch_size,
                n
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_seven_sources_make_two_batches_with_one_stagger() {
        let starts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let sources = sources(37);
        let begun = Instant::now();

        fan_out(&sources, 20, Duration::from_millis(300), |_| {
            let starts = Arc::clone(&starts);
            async move {
                starts.lock().unwrap().push(Instant::now());
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 37);

        // Two launch waves: 20 actions at t=0, 17 after the first batch
        // (10ms) plus one stagger (300ms).
        let cutoff = begun + Duration::from_millis(150);
        let first_batch = starts.iter().filter(|s| **s < cutoff).count();
        let second_batch = starts.iter().filter(|s| **s >= cutoff).count();
        assert_eq!(first_batch, 20);
        assert_eq!(second_batch, 17);

        // No stagger after the last batch: total is 10 + 300 + 10, well
        // short of the 620ms a trailing stagger would cost.
        let elapsed = begun.elapsed();
        assert!(elapsed >= Duration::from_millis(320));
        assert!(elapsed < Duration::from_millis(620));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_list_is_a_noop() {
        let ran = Arc::new(AtomicUsize::new(0));
        fan_out(&[], 20, Duration::from_millis(300), |_| {
            let ran = Arc::clone(&ran);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_size_zero_is_clamped_to_one() {
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let sources = sources(3);

        fan_out(&sources, 0, Duration::ZERO, |_| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn input_order_is_preserved_across_batches() {
        let seen: Arc<Mutex<Vec<SourceId>>> = Arc::new(Mutex::new(Vec::new()));
        let sources = sources(5);

        fan_out(&sources, 2, Duration::ZERO, |source| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(source);
            }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), sources);
    }
}
