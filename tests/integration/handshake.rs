//! Encrypted sessions: handshake, key rotation, and failure handling.
//!
//! Scripted-peer tests drive a real client with hand-built protocol
//! messages so each failure path is exercised exactly.

use oganesson_core::crypto::{PublicEncryptionKey, SecretKey, PUBLIC_KEY_PREFIX};
use oganesson_core::{FieldType, OgError, Value, WireMsg};
use oganesson_session::{OgClient, OgServer, PacketSession};
use tokio::io::DuplexStream;
use tokio::net::{TcpListener, TcpStream};

fn duplex_pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(1 << 18)
}

// ── Happy paths ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_session_over_duplex() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "123456789", Some("abcdef".to_string()));
    let mut server = OgServer::new(server_stream, "abcdef");

    let server_task = tokio::spawn(async move {
        server.setup().await.unwrap();
        let data = server.read_data().await.unwrap();
        (server, data)
    });

    client.setup().await.unwrap();
    client.write_data(b"0000000000").await.unwrap();

    let (server, data) = server_task.await.unwrap();
    assert_eq!(data, b"0000000000");
    assert_eq!(client.peer_fingerprint(), Some("abcdef"));
    assert_eq!(server.peer_fingerprint(), Some("123456789"));
    assert_eq!(client.current_key(), server.current_key());
}

#[tokio::test]
async fn keys_stay_in_step_across_both_directions() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "client-fp", None);
    let mut server = OgServer::new(server_stream, "server-fp");

    let server_task = tokio::spawn(async move {
        server.setup().await.unwrap();
        for i in 0..5u8 {
            let data = server.read_data().await.unwrap();
            assert_eq!(data, format!("ping {i}").as_bytes());
            server.write_data(format!("pong {i}").as_bytes()).await.unwrap();
        }
        server.current_key().cloned()
    });

    client.setup().await.unwrap();
    let handshake_key = client.current_key().cloned().unwrap();

    let mut previous = handshake_key;
    for i in 0..5u8 {
        client.write_data(format!("ping {i}").as_bytes()).await.unwrap();
        let reply = client.read_data().await.unwrap();
        assert_eq!(reply, format!("pong {i}").as_bytes());

        // Every message rotates the chain onward.
        let current = client.current_key().cloned().unwrap();
        assert_ne!(current, previous);
        previous = current;
    }

    let server_key = server_task.await.unwrap();
    assert_eq!(client.current_key(), server_key.as_ref());
}

#[tokio::test]
async fn full_session_over_tcp() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut server = OgServer::new(stream, "tcp-server");
        server.setup().await?;
        let data = server.read_data().await?;
        server.write_data(&data).await?;
        anyhow::Ok(())
    });

    let stream = TcpStream::connect(addr).await?;
    let mut client = OgClient::new(stream, "tcp-client", Some("tcp-server".to_string()));
    client.setup().await?;

    client.write_data(b"echo me").await?;
    let echoed = client.read_data().await?;
    assert_eq!(echoed, b"echo me");

    server_task.await??;
    Ok(())
}

// ── Server-side failures ──────────────────────────────────────────────────────

#[tokio::test]
async fn server_rejects_wrong_opening_and_notifies_the_peer() {
    let (client_stream, server_stream) = duplex_pair();
    let mut server = OgServer::new(server_stream, "abcdef");
    let mut raw_client = PacketSession::new(client_stream);

    let server_task = tokio::spawn(async move { server.setup().await });

    raw_client.write_message(&WireMsg::new("Hello")).await.unwrap();
    let reply = raw_client.read_message().await.unwrap();
    assert_eq!(reply.code, "SessionSetup");
    assert_eq!(
        reply.get_string_field("Error").as_deref(),
        Some("ErrSessionSetup")
    );

    assert!(matches!(
        server_task.await.unwrap(),
        Err(OgError::SessionSetup)
    ));
}

#[tokio::test]
async fn server_rejects_missing_public_key() {
    let (client_stream, server_stream) = duplex_pair();
    let mut server = OgServer::new(server_stream, "abcdef");
    let mut raw_client = PacketSession::new(client_stream);

    let server_task = tokio::spawn(async move { server.setup().await });

    raw_client
        .write_message(&WireMsg::new("SessionSetup"))
        .await
        .unwrap();
    let reply = raw_client.read_message().await.unwrap();
    assert_eq!(reply.get_string_field("Session").as_deref(), Some("og"));

    // SessionKey without a PublicKey attachment.
    raw_client
        .write_message(&WireMsg::new("SessionKey"))
        .await
        .unwrap();
    let reply = raw_client.read_message().await.unwrap();
    assert_eq!(
        reply.get_string_field("Error").as_deref(),
        Some("ErrProtocolError")
    );

    assert!(matches!(
        server_task.await.unwrap(),
        Err(OgError::SessionSetup)
    ));
}

#[tokio::test]
async fn server_rejects_unparseable_public_key() {
    let (client_stream, server_stream) = duplex_pair();
    let mut server = OgServer::new(server_stream, "abcdef");
    let mut raw_client = PacketSession::new(client_stream);

    let server_task = tokio::spawn(async move { server.setup().await });

    raw_client
        .write_message(&WireMsg::new("SessionSetup"))
        .await
        .unwrap();
    raw_client.read_message().await.unwrap();

    let mut key_msg = WireMsg::new("SessionKey");
    key_msg
        .add_field("PublicKey", &Value::from("not a key at all"))
        .unwrap();
    raw_client.write_message(&key_msg).await.unwrap();

    let reply = raw_client.read_message().await.unwrap();
    assert_eq!(
        reply.get_string_field("Error").as_deref(),
        Some("ErrBadSessionKey")
    );
    assert!(matches!(
        server_task.await.unwrap(),
        Err(OgError::SessionSetup)
    ));
}

// ── Client-side failures ──────────────────────────────────────────────────────

#[tokio::test]
async fn client_rejects_wrong_session_kind() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", None);
    let mut fake = PacketSession::new(server_stream);

    let fake_task = tokio::spawn(async move {
        fake.read_message().await.unwrap();
        let mut reply = WireMsg::new("SessionSetup");
        reply.add_field("Session", &Value::from("tls")).unwrap();
        fake.write_message(&reply).await.unwrap();
    });

    assert!(matches!(client.setup().await, Err(OgError::SessionSetup)));
    fake_task.await.unwrap();
}

#[tokio::test]
async fn client_surfaces_server_error_attachment() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", None);
    let mut fake = PacketSession::new(server_stream);

    let fake_task = tokio::spawn(async move {
        fake.read_message().await.unwrap();
        let mut reply = WireMsg::new("SessionSetup");
        reply
            .add_field("Error", &Value::from("ErrServerError"))
            .unwrap();
        fake.write_message(&reply).await.unwrap();
    });

    assert!(matches!(client.setup().await, Err(OgError::ServerError)));
    fake_task.await.unwrap();
}

#[tokio::test]
async fn client_rejects_garbage_sealed_key() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", None);
    let mut fake = PacketSession::new(server_stream);

    let fake_task = tokio::spawn(async move {
        fake.read_message().await.unwrap();
        let mut reply = WireMsg::new("SessionSetup");
        reply.add_field("Session", &Value::from("og")).unwrap();
        fake.write_message(&reply).await.unwrap();

        fake.read_message().await.unwrap();
        let mut payload = format!("{PUBLIC_KEY_PREFIX}:").into_bytes();
        payload.extend_from_slice(&[0u8; 80]);
        let mut outer = WireMsg::new("SessionKey");
        outer
            .add_field_as("SessionKey", FieldType::Bytes, &Value::Bytes(payload))
            .unwrap();
        fake.write_message(&outer).await.unwrap();
    });

    assert!(matches!(client.setup().await, Err(OgError::SessionSetup)));
    fake_task.await.unwrap();
}

#[tokio::test]
async fn client_rejects_mismatched_fingerprint() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", Some("abcdef".to_string()));
    let mut server = OgServer::new(server_stream, "stranger");

    let server_task = tokio::spawn(async move { server.setup().await });

    assert!(matches!(
        client.setup().await,
        Err(OgError::SessionMismatch)
    ));
    server_task.await.unwrap().unwrap();
}

// ── Data-phase failures ───────────────────────────────────────────────────────

/// Drive the server half of the handshake by hand, returning the session
/// key that was sealed to the client.
async fn scripted_server_handshake(
    session: &mut PacketSession<DuplexStream>,
    fingerprint: &str,
) -> SecretKey {
    let setup = session.read_message().await.unwrap();
    assert_eq!(setup.code, "SessionSetup");
    let mut reply = WireMsg::new("SessionSetup");
    reply.add_field("Session", &Value::from("og")).unwrap();
    session.write_message(&reply).await.unwrap();

    let key_msg = session.read_message().await.unwrap();
    assert_eq!(key_msg.code, "SessionKey");
    let public_text = key_msg.get_string_field("PublicKey").unwrap();
    let client_public = PublicEncryptionKey::from_text(&public_text).unwrap();

    let session_key = SecretKey::generate();
    let mut inner = WireMsg::new("SessionKey");
    inner
        .add_field("SecretKey", &Value::from(session_key.as_text()))
        .unwrap();
    inner
        .add_field("Fingerprint", &Value::from(fingerprint))
        .unwrap();
    let sealed = client_public.seal(&inner.flatten().unwrap()).unwrap();

    let mut payload = format!("{PUBLIC_KEY_PREFIX}:").into_bytes();
    payload.extend_from_slice(&sealed);
    let mut outer = WireMsg::new("SessionKey");
    outer
        .add_field_as("SessionKey", FieldType::Bytes, &Value::Bytes(payload))
        .unwrap();
    session.write_message(&outer).await.unwrap();

    session_key
}

#[tokio::test]
async fn corrupted_envelope_is_a_key_error() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", None);
    let mut fake = PacketSession::new(server_stream);

    let fake_task = tokio::spawn(async move {
        scripted_server_handshake(&mut fake, "srv").await;
        let mut outer = WireMsg::new("OgMsg");
        outer
            .add_field_as("Payload", FieldType::Bytes, &Value::Bytes(vec![0u8; 64]))
            .unwrap();
        fake.write_message(&outer).await.unwrap();
    });

    client.setup().await.unwrap();
    assert!(matches!(client.read_data().await, Err(OgError::KeyError)));
    fake_task.await.unwrap();
}

#[tokio::test]
async fn unexpected_data_message_code_is_invalid() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", None);
    let mut fake = PacketSession::new(server_stream);

    let fake_task = tokio::spawn(async move {
        scripted_server_handshake(&mut fake, "srv").await;
        let mut outer = WireMsg::new("Telemetry");
        outer
            .add_field_as("Payload", FieldType::Bytes, &Value::Bytes(vec![1, 2, 3]))
            .unwrap();
        fake.write_message(&outer).await.unwrap();
    });

    client.setup().await.unwrap();
    assert!(matches!(
        client.read_data().await,
        Err(OgError::InvalidMsg)
    ));
    fake_task.await.unwrap();
}

#[tokio::test]
async fn scripted_key_delivery_matches_client_state() {
    let (client_stream, server_stream) = duplex_pair();
    let mut client = OgClient::new(client_stream, "fp", Some("srv".to_string()));
    let mut fake = PacketSession::new(server_stream);

    let fake_task =
        tokio::spawn(async move { scripted_server_handshake(&mut fake, "srv").await });

    client.setup().await.unwrap();
    let delivered = fake_task.await.unwrap();
    assert_eq!(client.current_key(), Some(&delivered));
    assert_eq!(client.peer_fingerprint(), Some("srv"));
}
