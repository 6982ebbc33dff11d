//! Wire messages over packet sessions.

use std::collections::BTreeMap;

use oganesson_core::{DataField, FieldType, OgError, Value, WireMsg};
use oganesson_session::SessionConfig;

use crate::{patterned_bytes, session_pair};

#[tokio::test]
async fn empty_message_round_trips_over_a_session() {
    let (mut sender, mut receiver) = session_pair(SessionConfig::default());

    let msg = WireMsg::new("test");
    sender.write_message(&msg).await.unwrap();

    let received = receiver.read_message().await.unwrap();
    assert_eq!(received, msg);
    assert_eq!(received.code, "test");
    assert!(received.attachments.is_empty());
}

#[tokio::test]
async fn typed_attachments_survive_the_wire() {
    let (mut sender, mut receiver) = session_pair(SessionConfig::default());

    let mut msg = WireMsg::new("Inventory");
    msg.add_field("Name", &Value::from("element 118")).unwrap();
    msg.add_field("Count", &Value::Int64(294)).unwrap();
    msg.add_field_as("Mass", FieldType::Float64, &Value::Float64(294.214))
        .unwrap();
    msg.add_field("Stable", &Value::Bool(false)).unwrap();
    msg.add_field("Raw", &Value::Bytes(vec![0xA5, 0x5A])).unwrap();

    sender.write_message(&msg).await.unwrap();
    let received = receiver.read_message().await.unwrap();
    assert_eq!(received, msg);

    assert_eq!(
        received.get_field("Count").unwrap(),
        (FieldType::Int16, Value::Int16(294))
    );
    assert_eq!(
        received.get_string_field("Name").as_deref(),
        Some("element 118")
    );
}

#[tokio::test]
async fn large_message_is_fragmented_and_reassembled() {
    // A 30000-byte attachment cannot fit one default-size packet, so the
    // flattened message crosses the multipart path.
    let (mut sender, mut receiver) = session_pair(SessionConfig::default());

    let mut msg = WireMsg::new("Upload");
    msg.add_field("Chunk", &Value::Bytes(patterned_bytes(30_000)))
        .unwrap();

    let writer = tokio::spawn(async move {
        sender.write_message(&msg).await.unwrap();
        msg
    });
    let received = receiver.read_message().await.unwrap();
    let sent = writer.await.unwrap();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn message_with_map_attachment_round_trips() {
    let (mut sender, mut receiver) = session_pair(SessionConfig::default());

    let mut inner = BTreeMap::new();
    inner.insert(
        "host".to_string(),
        DataField::new(FieldType::String, &Value::from("localhost")).unwrap(),
    );
    inner.insert(
        "port".to_string(),
        DataField::new(FieldType::UInt16, &Value::UInt16(2001)).unwrap(),
    );

    let mut msg = WireMsg::new("Connect");
    msg.add_field_as("Target", FieldType::Map, &Value::Map(inner))
        .unwrap();

    sender.write_message(&msg).await.unwrap();
    let received = receiver.read_message().await.unwrap();
    assert_eq!(received, msg);

    let (ftype, value) = received.get_field("Target").unwrap();
    assert_eq!(ftype, FieldType::Map);
    let map = match value {
        Value::Map(map) => map,
        other => panic!("expected map, got {other:?}"),
    };
    assert_eq!(
        map.get("port").unwrap().get().unwrap(),
        Value::UInt16(2001)
    );
}

#[tokio::test]
async fn writing_a_codeless_message_is_rejected() {
    let (mut sender, _receiver) = session_pair(SessionConfig::default());
    let msg = WireMsg::new("");
    assert!(matches!(
        sender.write_message(&msg).await,
        Err(OgError::EmptyData)
    ));
}

#[tokio::test]
async fn non_message_packet_is_bad_data() {
    // A packet holding one lone unit cannot be a wire message, which is
    // always exactly two.
    let (mut sender, mut receiver) = session_pair(SessionConfig::default());
    let unit = DataField::new(FieldType::UInt16, &Value::UInt16(42)).unwrap();
    sender.write_packet(&unit.flatten()).await.unwrap();
    assert!(matches!(
        receiver.read_message().await,
        Err(OgError::BadData)
    ));
}
