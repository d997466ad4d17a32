//! The linear chain every message-passing rank sits on.

mod latency;
mod link;
mod rank;

use tokio::io::{self, DuplexStream, ReadHalf, WriteHalf};

pub use link::Link;
pub use rank::ChainRank;

use crate::error::{Result, ScanErr};

/// Capacity of each direction of an in-process link, in bytes.
pub const DUPLEX_BUF_SIZE: usize = 1024;

/// A rank whose links are in-memory duplex streams.
pub type DuplexRank = ChainRank<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Builds a whole chain of `workers` ranks connected in-process.
///
/// # Returns
/// The ranks in order, element `r` being rank `r`.
///
/// # Errors
/// `ScanErr::Config` if `workers` is 0.
pub fn duplex_chain(workers: usize) -> Result<Vec<DuplexRank>> {
    if workers == 0 {
        return Err(ScanErr::config("a chain needs at least 1 worker"));
    }

    let mut prevs: Vec<Option<Link<_, _>>> = (0..workers).map(|_| None).collect();
    let mut nexts: Vec<Option<Link<_, _>>> = (0..workers).map(|_| None).collect();

    for rank in 0..workers - 1 {
        let (lo_stream, hi_stream) = io::duplex(DUPLEX_BUF_SIZE);

        let (rx, tx) = io::split(lo_stream);
        let (rx, tx) = comms::channel(rx, tx);
        nexts[rank] = Some(Link::new(rank, rank + 1, rx, tx));

        let (rx, tx) = io::split(hi_stream);
        let (rx, tx) = comms::channel(rx, tx);
        prevs[rank + 1] = Some(Link::new(rank + 1, rank, rx, tx));
    }

    prevs
        .into_iter()
        .zip(nexts)
        .enumerate()
        .map(|(rank, (prev, next))| ChainRank::new(rank, workers, prev, next))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tokio::task::JoinSet;

    use super::*;

    #[test]
    fn chain_shape() {
        let ranks = duplex_chain(3).unwrap();
        assert_eq!(ranks.len(), 3);
        assert!(ranks[0].is_root());
        assert_eq!(ranks[2].rank(), 2);
        assert!(duplex_chain(0).is_err());
    }

    #[tokio::test]
    async fn single_rank_needs_no_messages() {
        let mut ranks = duplex_chain(1).unwrap();
        let rank = &mut ranks[0];

        rank.barrier().await.unwrap();
        assert_eq!(rank.propagate_carry(7).await.unwrap(), 0);
        assert_eq!(rank.combine_sum(7).await.unwrap(), Some(7));
        assert_eq!(rank.carries_sent(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn carries_and_sums_flow_along_the_chain() {
        let totals = [4, 0, 5, 1];
        let mut tasks = JoinSet::new();

        for (mut rank, total) in duplex_chain(totals.len()).unwrap().into_iter().zip(totals) {
            tasks.spawn(async move {
                let incoming = rank.propagate_carry(total).await.unwrap();
                let sum = rank.combine_sum(total).await.unwrap();
                (rank.rank(), incoming, sum, rank.carries_sent())
            });
        }

        let mut results = tasks.join_all().await;
        results.sort();

        assert_eq!(
            results,
            [
                (0, 0, Some(10), 1),
                (1, 4, None, 1),
                (2, 4, None, 1),
                (3, 9, None, 0)
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn round_trip_samples_every_round() {
        let mut ranks = duplex_chain(3).unwrap();
        let mut last = ranks.pop().unwrap();
        let mut second = ranks.pop().unwrap();
        let mut root = ranks.pop().unwrap();
        let rounds = NonZeroUsize::new(5).unwrap();

        let (root, second, last) = tokio::join!(
            root.round_trip(rounds),
            second.round_trip(rounds),
            last.round_trip(rounds)
        );

        assert_eq!(root.unwrap().len(), 5);
        assert!(second.unwrap().is_empty());
        assert!(last.unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_trip_needs_two_ranks() {
        let mut ranks = duplex_chain(1).unwrap();
        let err = ranks[0]
            .round_trip(NonZeroUsize::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanErr::Config(_)));
    }
}
