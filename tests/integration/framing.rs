//! Packet-session framing: round trips, boundaries, and large transfers.

use crate::{patterned_bytes, session_pair};
use oganesson_session::SessionConfig;

fn config(max_packet_size: usize) -> SessionConfig {
    SessionConfig {
        max_packet_size,
        ..SessionConfig::default()
    }
}

/// Send and receive concurrently so payloads larger than the stream
/// buffer cannot deadlock the test.
async fn round_trip(max_packet_size: usize, payload: &[u8]) -> Vec<u8> {
    let (mut sender, mut receiver) = session_pair(config(max_packet_size));
    let owned = payload.to_vec();
    let writer = tokio::spawn(async move {
        sender.write_packet(&owned).await.unwrap();
        sender
    });
    let packet = receiver.read_packet().await.unwrap();
    writer.await.unwrap();
    packet.into_raw()
}

#[tokio::test]
async fn payloads_round_trip_at_every_packet_size() {
    for len in [1usize, 9, 100, 4096, 100_000] {
        let payload = patterned_bytes(len);
        for max in [10usize, 16384, len + 3] {
            let echoed = round_trip(max, &payload).await;
            assert_eq!(echoed, payload, "len {len} max {max}");
        }
    }
}

#[tokio::test]
async fn boundary_payload_lengths_round_trip() {
    // Around the single/multipart switch at max_packet_size - 3, plus
    // exact multiples of the chunk size.
    let max = 64usize;
    for len in [1, max - 4, max - 3, max - 2, (max - 3) * 2, (max - 3) * 5] {
        let payload = patterned_bytes(len);
        let echoed = round_trip(max, &payload).await;
        assert_eq!(echoed, payload, "len {len}");
    }
}

#[tokio::test]
async fn megabyte_payload_survives_default_framing() {
    let payload = patterned_bytes(1 << 20);
    let echoed = round_trip(16384, &payload).await;
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn mixed_sizes_arrive_in_order() {
    let (mut sender, mut receiver) = session_pair(config(256));
    let payloads: Vec<Vec<u8>> = [3usize, 1000, 5, 253, 4096]
        .iter()
        .map(|&len| patterned_bytes(len))
        .collect();

    let to_send = payloads.clone();
    let writer = tokio::spawn(async move {
        for payload in &to_send {
            sender.write_packet(payload).await.unwrap();
        }
    });

    for expected in &payloads {
        let packet = receiver.read_packet().await.unwrap();
        assert_eq!(packet.raw_value(), expected.as_slice());
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn bytes_sent_includes_unit_headers() {
    let (mut sender, mut receiver) = session_pair(config(10));

    // 19 bytes with chunk size 7: u64 header unit (11) + two full chunks
    // (10 each) + final (8).
    let sent = sender.write_packet(b"ABCDEFGHIJKLMNOPQRS").await.unwrap();
    assert_eq!(sent, 11 + 10 + 10 + 8);

    let packet = receiver.read_packet().await.unwrap();
    assert_eq!(packet.raw_value(), b"ABCDEFGHIJKLMNOPQRS");
}
