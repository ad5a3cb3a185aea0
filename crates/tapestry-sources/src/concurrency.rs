//! §4.4 concurrency helper: run up to `batch_size` per-item producers in
//! parallel, streaming results into a bounded queue, with early-abort on
//! the first error. Drivers use this to parallelize e.g. per-board or
//! per-list fetches without unbounded fan-out.

use futures::stream::{self, Stream, StreamExt};
use std::future::Future;

pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Ordering mode for the bounded-concurrency driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Results appear in the same order as `items`, buffering early
    /// finishers until it's their turn.
    Preserved,
    /// Results appear as soon as each producer finishes.
    Arrival,
}

/// Runs `produce` over every item in `items` with at most `batch_size`
/// concurrent in-flight producers, stopping as soon as one yields an
/// `Err` (the stream ends after emitting that error; later in-flight
/// producers are dropped).
pub fn bounded_concurrent<I, T, Fut, R, E>(
    items: I,
    batch_size: usize,
    order: Order,
    produce: impl Fn(T) -> Fut + Send + 'static,
) -> impl Stream<Item = Result<R, E>>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    let mapped = stream::iter(items).map(move |item| produce(item));
    let buffered: std::pin::Pin<Box<dyn Stream<Item = Result<R, E>> + Send>> = match order {
        Order::Preserved => Box::pin(mapped.buffered(batch_size.max(1))),
        Order::Arrival => Box::pin(mapped.buffer_unordered(batch_size.max(1))),
    };

    // take_while_inclusive isn't in the futures crate; scan emulates
    // "stop after the first error" by flipping a latch.
    let mut stopped = false;
    buffered.take_while(move |result| {
        let keep_going = !stopped;
        if result.is_err() {
            stopped = true;
        }
        futures::future::ready(keep_going)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_input_order() {
        let items = vec![3u64, 1, 2];
        let results: Vec<_> = bounded_concurrent(items, 4, Order::Preserved, |n| async move {
            tokio::time::sleep(std::time::Duration::from_millis(n)).await;
            Ok::<_, anyhow::Error>(n)
        })
        .collect()
        .await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn stops_after_first_error() {
        let items = vec![1u64, 2, 3, 4];
        let results: Vec<Result<u64, anyhow::Error>> =
            bounded_concurrent(items, 1, Order::Preserved, |n| async move {
                if n == 2 {
                    Err(anyhow::anyhow!("boom"))
                } else {
                    Ok(n)
                }
            })
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
