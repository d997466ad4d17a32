use comms::{CarryMessage, Command, Msg, OnoReceiver, OnoSender, Payload};
use log::warn;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, ScanErr};

/// One bidirectional point-to-point channel between neighbouring ranks.
#[derive(Debug)]
pub struct Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rank: usize,
    peer: usize,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    buf: Vec<u8>,
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `Link` from `rank` to `peer`.
    ///
    /// # Arguments
    /// * `rank` - The rank owning this end.
    /// * `peer` - The rank on the other end.
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    pub fn new(rank: usize, peer: usize, rx: OnoReceiver<R>, tx: OnoSender<W>) -> Self {
        Self {
            rank,
            peer,
            rx,
            tx,
            buf: Vec::new(),
        }
    }

    pub fn peer(&self) -> usize {
        self.peer
    }

    pub async fn send(&mut self, msg: &Msg<'_>) -> Result<()> {
        self.tx.send(msg).await.map_err(|source| ScanErr::Comm {
            rank: self.rank,
            peer: self.peer,
            source,
        })
    }

    pub async fn send_carry(&mut self, value: i64) -> Result<()> {
        let msg = Msg::Data(Payload::Carry(CarryMessage::new(value, self.rank)));
        self.send(&msg).await
    }

    pub async fn send_sum(&mut self, value: i64) -> Result<()> {
        let msg = Msg::Data(Payload::Sum(CarryMessage::new(value, self.rank)));
        self.send(&msg).await
    }

    /// Blocks until the peer's carry arrives.
    pub async fn recv_carry(&mut self) -> Result<i64> {
        let carry = self
            .expect("data/carry", |msg| match msg {
                Msg::Data(Payload::Carry(carry)) => Some(*carry),
                _ => None,
            })
            .await?;

        self.check_origin("data/carry", carry)
    }

    /// Blocks until the peer's partial sum arrives.
    pub async fn recv_sum(&mut self) -> Result<i64> {
        let sum = self
            .expect("data/sum", |msg| match msg {
                Msg::Data(Payload::Sum(sum)) => Some(*sum),
                _ => None,
            })
            .await?;

        self.check_origin("data/sum", sum)
    }

    pub async fn recv_arrive(&mut self) -> Result<()> {
        let peer = self.peer;
        self.expect("control/arrive", |msg| match msg {
            Msg::Control(Command::Arrive { rank }) if *rank == peer => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn recv_release(&mut self) -> Result<()> {
        self.expect("control/release", |msg| match msg {
            Msg::Control(Command::Release) => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn recv_echo(&mut self) -> Result<u64> {
        self.expect("data/echo", |msg| match msg {
            Msg::Data(Payload::Echo(seq)) => Some(*seq),
            _ => None,
        })
        .await
    }

    /// Tells the peer this rank is leaving because of `detail`. Failures to
    /// deliver are ignored, the peer will see the link close anyway.
    pub async fn notify_failure(&mut self, detail: &str) {
        let msg = Msg::Err(detail.into());
        let _ = self.tx.send(&msg).await;
        let _ = self.tx.shutdown().await;
    }

    /// Receives the next message and keeps it if `pick` accepts it.
    async fn expect<T>(
        &mut self,
        expected: &'static str,
        pick: impl FnOnce(&Msg<'_>) -> Option<T>,
    ) -> Result<T> {
        let Self {
            rank,
            peer,
            rx,
            buf,
            ..
        } = self;
        let (rank, peer) = (*rank, *peer);

        let msg: Msg = rx
            .recv_into(buf)
            .await
            .map_err(|source| ScanErr::Comm { rank, peer, source })?;

        if let Some(value) = pick(&msg) {
            return Ok(value);
        }

        match msg {
            Msg::Err(detail) => Err(ScanErr::PeerFailed {
                rank,
                peer,
                detail: detail.into_owned(),
            }),
            other => {
                warn!(
                    "unexpected message: rank={rank} peer={peer} expected={expected} \
                     got={other:?}"
                );
                Err(ScanErr::UnexpectedMessage {
                    rank,
                    peer,
                    expected,
                    got: other.kind().to_string(),
                })
            }
        }
    }

    fn check_origin(&self, expected: &'static str, msg: CarryMessage) -> Result<i64> {
        if msg.origin() == self.peer {
            return Ok(msg.value);
        }

        Err(ScanErr::UnexpectedMessage {
            rank: self.rank,
            peer: self.peer,
            expected,
            got: format!("{expected} from rank {}", msg.origin()),
        })
    }
}
