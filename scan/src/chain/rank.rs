use comms::{Command, Msg};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Link;
use crate::error::{Result, ScanErr};

/// One participant of the linear chain `0 -> 1 -> ... -> W-1`.
///
/// Holds the link to the predecessor (absent on rank 0) and to the successor
/// (absent on the last rank). These two links are the only way ranks talk.
#[derive(Debug)]
pub struct ChainRank<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rank: usize,
    workers: usize,
    prev: Option<Link<R, W>>,
    next: Option<Link<R, W>>,
    carries_sent: usize,
}

impl<R, W> ChainRank<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `ChainRank`.
    ///
    /// # Errors
    /// `ScanErr::Config` if `rank` is out of range, or if the links present
    /// do not match the rank's position in the chain.
    pub fn new(
        rank: usize,
        workers: usize,
        prev: Option<Link<R, W>>,
        next: Option<Link<R, W>>,
    ) -> Result<Self> {
        if rank >= workers {
            return Err(ScanErr::config(format!(
                "rank {rank} is outside [0, {workers})"
            )));
        }

        let is_first = rank == 0;
        let is_last = rank + 1 == workers;

        if prev.is_some() == is_first || next.is_some() == is_last {
            return Err(ScanErr::config(format!(
                "rank {rank} of {workers} needs a predecessor link iff rank > 0 \
                 and a successor link iff rank < {}",
                workers - 1
            )));
        }

        if prev.as_ref().is_some_and(|l| l.peer() + 1 != rank)
            || next.as_ref().is_some_and(|l| l.peer() != rank + 1)
        {
            return Err(ScanErr::config(format!(
                "rank {rank} must only be linked to its direct neighbours"
            )));
        }

        Ok(Self {
            rank,
            workers,
            prev,
            next,
            carries_sent: 0,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Total carry messages this rank has sent so far.
    pub fn carries_sent(&self) -> usize {
        self.carries_sent
    }

    pub(super) fn next_mut(&mut self) -> Option<&mut Link<R, W>> {
        self.next.as_mut()
    }

    pub(super) fn prev_mut(&mut self) -> Option<&mut Link<R, W>> {
        self.prev.as_mut()
    }

    /// Returns once every rank of the chain has called `barrier`.
    ///
    /// An arrive token travels up to the last rank, which then sends a
    /// release token back down. No rank can see the release before the last
    /// rank, and so every rank, has arrived.
    pub async fn barrier(&mut self) -> Result<()> {
        let rank = self.rank;

        if let Some(prev) = &mut self.prev {
            prev.recv_arrive().await?;
        }

        match &mut self.next {
            Some(next) => {
                next.send(&Msg::Control(Command::Arrive { rank })).await?;
                next.recv_release().await?;
            }
            None => debug!(rank = rank; "barrier complete, releasing"),
        }

        if let Some(prev) = &mut self.prev {
            prev.send(&Msg::Control(Command::Release)).await?;
        }

        Ok(())
    }

    /// Runs this rank's step of the carry pipeline.
    ///
    /// Waits for the predecessor's carry (rank 0 uses 0), forwards
    /// `incoming + local_total` to the successor, then returns `incoming`,
    /// the sum of everything owned by lower ranks. The caller applies it
    /// only after this returns, so the send never waits on the apply.
    ///
    /// # Arguments
    /// * `local_total` - Last value of the local scan, 0 if the rank owns nothing.
    pub async fn propagate_carry(&mut self, local_total: i64) -> Result<i64> {
        let incoming = match &mut self.prev {
            Some(prev) => prev.recv_carry().await?,
            None => 0,
        };

        if let Some(next) = &mut self.next {
            let outgoing = incoming + local_total;
            next.send_carry(outgoing).await?;
            self.carries_sent += 1;
            debug!(rank = self.rank, incoming = incoming, outgoing = outgoing; "carry forwarded");
        }

        Ok(incoming)
    }

    /// Folds `local_sum` into the chain wide sum, which travels from the
    /// last rank down to the root.
    ///
    /// # Returns
    /// `Some(total)` on the root, `None` on every other rank.
    pub async fn combine_sum(&mut self, local_sum: i64) -> Result<Option<i64>> {
        let upstream = match &mut self.next {
            Some(next) => next.recv_sum().await?,
            None => 0,
        };

        let partial = upstream + local_sum;

        match &mut self.prev {
            Some(prev) => {
                prev.send_sum(partial).await?;
                Ok(None)
            }
            None => Ok(Some(partial)),
        }
    }

    /// Tells both neighbours this rank is leaving because of `err`.
    pub async fn notify_failure(&mut self, err: &ScanErr) {
        let detail = err.to_string();

        for link in [self.prev.as_mut(), self.next.as_mut()].into_iter().flatten() {
            link.notify_failure(&detail).await;
        }
    }
}
