use std::{num::NonZeroUsize, time::Instant};

use comms::{Msg, Payload};
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use super::ChainRank;
use crate::{
    error::{Result, ScanErr},
    timing::{IterationStats, TimingHarness},
};

impl<R, W> ChainRank<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Measures the round trip time of the link between ranks 0 and 1.
    ///
    /// Rank 0 sends `rounds` echo requests one at a time and times each one
    /// until rank 1 sends it back. Other ranks return immediately.
    ///
    /// # Returns
    /// One sample per round on rank 0, nothing elsewhere.
    ///
    /// # Errors
    /// `ScanErr::Config` if the chain has fewer than two ranks.
    pub async fn round_trip(&mut self, rounds: NonZeroUsize) -> Result<Vec<IterationStats>> {
        if self.workers() < 2 {
            return Err(ScanErr::config(
                "measuring latency needs at least 2 workers",
            ));
        }

        match self.rank() {
            0 => self.ping(rounds).await,
            1 => {
                self.pong(rounds).await?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn ping(&mut self, rounds: NonZeroUsize) -> Result<Vec<IterationStats>> {
        let rank = self.rank();
        let Some(next) = self.next_mut() else {
            return Err(ScanErr::config("rank 0 has no link to rank 1"));
        };

        let mut harness = TimingHarness::new();
        for seq in 0..rounds.get() as u64 {
            let start = Instant::now();
            next.send(&Msg::Data(Payload::Echo(seq))).await?;
            let echoed = next.recv_echo().await?;
            harness.record(start.elapsed());

            if echoed != seq {
                return Err(ScanErr::UnexpectedMessage {
                    rank,
                    peer: next.peer(),
                    expected: "data/echo",
                    got: format!("echo {echoed} instead of {seq}"),
                });
            }
        }

        info!(rounds = rounds.get(); "latency round trips finished");
        Ok(harness.into_stats())
    }

    async fn pong(&mut self, rounds: NonZeroUsize) -> Result<()> {
        let Some(prev) = self.prev_mut() else {
            return Err(ScanErr::config("rank 1 has no link to rank 0"));
        };

        for _ in 0..rounds.get() {
            let seq = prev.recv_echo().await?;
            prev.send(&Msg::Data(Payload::Echo(seq))).await?;
        }

        Ok(())
    }
}
