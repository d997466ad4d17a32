//! Forms the chain over TCP.
//!
//! Rank `r` listens on `base_port + r` for its predecessor and connects to
//! its successor on `base_port + r + 1`, retrying until it is listening.

use std::{io, time::Duration};

use comms::channel;
use log::{debug, info};
use scan::{
    ScanErr,
    chain::{ChainRank, Link},
};
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time,
};

const CONNECT_RETRY: Duration = Duration::from_millis(100);

pub type TcpRank = ChainRank<OwnedReadHalf, OwnedWriteHalf>;
pub type TcpLink = Link<OwnedReadHalf, OwnedWriteHalf>;

fn port_of(base_port: u16, rank: usize) -> scan::Result<u16> {
    u16::try_from(usize::from(base_port) + rank)
        .map_err(|_| ScanErr::Config(format!("no port left for rank {rank}")))
}

async fn accept_prev(rank: usize, listener: Option<TcpListener>) -> scan::Result<Option<TcpLink>> {
    let Some(listener) = listener else {
        return Ok(None);
    };

    let (stream, addr) = listener.accept().await.map_err(|source| ScanErr::Comm {
        rank,
        peer: rank - 1,
        source,
    })?;
    info!("rank {} connected from {addr}", rank - 1);

    let (rx, tx) = stream.into_split();
    let (rx, tx) = channel(rx, tx);
    Ok(Some(Link::new(rank, rank - 1, rx, tx)))
}

async fn connect_next(rank: usize, addr: Option<String>) -> scan::Result<Option<TcpLink>> {
    let Some(addr) = addr else {
        return Ok(None);
    };

    let stream = loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => break stream,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!("rank {} not listening at {addr} yet", rank + 1);
                time::sleep(CONNECT_RETRY).await;
            }
            Err(source) => {
                return Err(ScanErr::Comm {
                    rank,
                    peer: rank + 1,
                    source,
                });
            }
        }
    };
    stream.set_nodelay(true).map_err(|source| ScanErr::Comm {
        rank,
        peer: rank + 1,
        source,
    })?;
    info!("connected to rank {} at {addr}", rank + 1);

    let (rx, tx) = stream.into_split();
    let (rx, tx) = channel(rx, tx);
    Ok(Some(Link::new(rank, rank + 1, rx, tx)))
}

/// Joins the chain from an already bound listener: waits for the
/// predecessor on `listener` while connecting to the successor at
/// `next_addr`.
///
/// # Errors
/// `ScanErr::Comm` if a link can't be set up, `ScanErr::Config` if the
/// links given do not match `rank`'s position in the chain.
pub async fn link_up(
    rank: usize,
    workers: usize,
    listener: Option<TcpListener>,
    next_addr: Option<String>,
) -> scan::Result<TcpRank> {
    if rank == 0 && listener.is_some() {
        return Err(ScanErr::Config("rank 0 has no predecessor".to_string()));
    }

    let (prev, next) = tokio::try_join!(
        accept_prev(rank, listener),
        connect_next(rank, next_addr)
    )?;

    ChainRank::new(rank, workers, prev, next)
}

/// Binds this rank's port and joins the chain.
pub async fn join_chain(
    host: &str,
    base_port: u16,
    rank: usize,
    workers: usize,
) -> scan::Result<TcpRank> {
    let listener = match rank {
        0 => None,
        _ => {
            let addr = format!("{host}:{}", port_of(base_port, rank)?);
            let listener = TcpListener::bind(&addr).await.map_err(|source| ScanErr::Comm {
                rank,
                peer: rank - 1,
                source,
            })?;
            info!("listening at {addr}");
            Some(listener)
        }
    };

    let next_addr = if rank + 1 < workers {
        Some(format!("{host}:{}", port_of(base_port, rank + 1)?))
    } else {
        None
    };

    link_up(rank, workers, listener, next_addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_follow_ranks() {
        assert_eq!(port_of(5000, 3).unwrap(), 5003);
        assert!(matches!(port_of(u16::MAX, 1), Err(ScanErr::Config(_))));
    }
}
