use std::borrow::Cow;

use comms::{CarryMessage, Command, Msg, Payload};
use tokio::io::{self, AsyncWriteExt};

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 128;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let (two_rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(two_rx, two_tx);

    let sent = [
        Msg::Control(Command::Arrive { rank: 2 }),
        Msg::Data(Payload::Carry(CarryMessage::new(55, 2))),
        Msg::Data(Payload::Sum(CarryMessage::new(-1, 0))),
        Msg::Data(Payload::Echo(9)),
        Msg::Control(Command::Release),
        Msg::Err(Cow::Borrowed("rank 3 failed")),
    ];

    let writer = tokio::spawn(async move {
        for msg in &sent {
            tx.send(msg).await.unwrap();
        }
        sent
    });

    let mut buf = Vec::new();
    let mut received = Vec::new();
    for _ in 0..6 {
        let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
        received.push(format!("{msg:?}"));
    }

    let sent = writer.await.unwrap();
    let sent: Vec<_> = sent.iter().map(|msg| format!("{msg:?}")).collect();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn truncated_frame_is_an_error() {
    let (one, two) = io::duplex(64);
    let (_, mut raw_tx) = io::split(one);

    // Announces 16 bytes but only delivers 4 before closing.
    raw_tx.write_all(&16u64.to_be_bytes()).await.unwrap();
    raw_tx.write_all(&[0, 0, 0, 2]).await.unwrap();
    raw_tx.shutdown().await.unwrap();
    drop(raw_tx);

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    let err = rx.recv_into::<Msg>(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test]
async fn closed_link_is_an_error() {
    let (one, two) = io::duplex(64);
    drop(one);

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = Vec::new();
    assert!(rx.recv_into::<Msg>(&mut buf).await.is_err());
}
