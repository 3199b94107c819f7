//! Integration tests for AntennaCodec over a real async byte stream.
//!
//! These tests push frames through a tokio duplex pipe in arbitrary segment
//! sizes and check that framing and classification survive the split.

use futures::{SinkExt, StreamExt};
use proptest::prelude::*;
use rfgate_protocol::{AntennaCodec, Command, CommandSet, InboundFrame};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, Framed, FramedRead};

const HEALTHCHECK_ACK: &[u8] = &[0xCF, 0x00, 0x00, 0x70, 0x04, 0x00, 0x02, 0x01, 0x07, 0xCA, 0x4A];
const TAG_READ: &[u8] = &[
    0xCF, 0x00, 0x00, 0x01, 0x12, 0x00, 0x01, 0xC5, 0x30, 0x00, 0x0C, 0xE2, 0x00, 0x00, 0x17,
    0x22, 0x0A, 0x00, 0x01, 0x23, 0x45, 0x67, 0x89, 0x79, 0x11,
];
const OPENED_ACK: &[u8] = &[0xCF, 0x00, 0x00, 0x77, 0x02, 0x00, 0x01, 0x82, 0x35];

fn stream_bytes() -> Vec<u8> {
    [HEALTHCHECK_ACK, TAG_READ, OPENED_ACK].concat()
}

fn expected_frames() -> Vec<InboundFrame> {
    vec![
        InboundFrame::HealthcheckAck,
        InboundFrame::TagRead {
            tag: "0123456789".to_string(),
        },
        InboundFrame::GateOpenedAck,
    ]
}

/// A tag report split across three writes is reassembled into one frame
#[tokio::test]
async fn test_reassembles_tag_read_split_across_writes() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let mut reader = FramedRead::new(rx, AntennaCodec::new());

    tokio::spawn(async move {
        tx.write_all(&TAG_READ[..3]).await.unwrap();
        tx.flush().await.unwrap();
        tokio::task::yield_now().await;
        tx.write_all(&TAG_READ[3..17]).await.unwrap();
        tx.flush().await.unwrap();
        tokio::task::yield_now().await;
        tx.write_all(&TAG_READ[17..]).await.unwrap();
    });

    let frame = reader.next().await.unwrap().unwrap();
    assert_eq!(
        frame,
        InboundFrame::TagRead {
            tag: "0123456789".to_string()
        }
    );
}

/// Several frames in one write come out as several items
#[tokio::test]
async fn test_splits_coalesced_frames() {
    let (mut tx, rx) = tokio::io::duplex(256);
    let mut reader = FramedRead::new(rx, AntennaCodec::new());

    tx.write_all(&stream_bytes()).await.unwrap();
    drop(tx);

    let mut frames = Vec::new();
    while let Some(frame) = reader.next().await {
        frames.push(frame.unwrap());
    }
    assert_eq!(frames, expected_frames());
}

/// Commands written through the sink arrive byte-for-byte
#[tokio::test]
async fn test_sink_writes_command_bytes() {
    let (client, mut server) = tokio::io::duplex(64);
    let mut framed = Framed::new(client, AntennaCodec::new());
    let commands = CommandSet::default();

    framed.send(commands.frame(Command::RelayClose)).await.unwrap();

    let mut received = vec![0u8; commands.frame(Command::RelayClose).len()];
    tokio::io::AsyncReadExt::read_exact(&mut server, &mut received)
        .await
        .unwrap();
    assert_eq!(received, commands.frame(Command::RelayClose).as_bytes());
}

proptest! {
    /// However the byte stream is segmented, the decoded frames are the same
    #[test]
    fn prop_segmentation_does_not_change_frames(cuts in proptest::collection::vec(1usize..8, 1..20)) {
        let bytes = stream_bytes();
        let mut codec = AntennaCodec::new();
        let mut buffer = bytes::BytesMut::new();
        let mut frames = Vec::new();

        let mut offset = 0;
        let mut cut_iter = cuts.iter().cycle();
        while offset < bytes.len() {
            let step = (*cut_iter.next().unwrap()).min(bytes.len() - offset);
            buffer.extend_from_slice(&bytes[offset..offset + step]);
            offset += step;
            while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                frames.push(frame);
            }
        }

        prop_assert_eq!(frames, expected_frames());
    }
}
