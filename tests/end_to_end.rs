//! End-to-end request/response scenarios against a scripted loopback
//! peer.

use framelink::{
    Client,
    Compression,
    SendOptions,
    TransportConfig,
    TransportError,
};
use tokio::{io::AsyncWriteExt, net::TcpListener, sync::oneshot};

mod common;
use common::{TestResult, bincode_bytes, read_frame, write_response, write_response_compressed};

async fn bound_listener() -> TestResult<(TcpListener, std::net::SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Scenario: one request, method 42, `"PING"` payload; the server echoes
/// status 0 with `"PONG"`.
#[tokio::test]
async fn ping_pong_round_trip() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        assert_eq!(frame.header.method_id, 42);
        assert_eq!(
            frame.header.compression,
            Compression::None,
            "a four-byte payload sits below every compression threshold"
        );
        assert_eq!(frame.payload, bincode_bytes(&"PING".to_owned()));
        write_response(
            &mut stream,
            frame.header.correlation_id,
            0,
            &bincode_bytes(&"PONG".to_owned()),
        )
        .await
        .expect("write response");
        stream
    });

    let client = Client::new(TransportConfig::new(addr).with_service_name("echo"));
    client.connect().await?;
    let reply: framelink::ClientContext<String> = client
        .send_typed(&"PING".to_owned(), 42, SendOptions::new())
        .await?;
    assert_eq!(reply.data, "PONG");

    let snapshot = client.probe_snapshot();
    assert_eq!(snapshot.requests_sent, 1);
    assert_eq!(snapshot.responses_received, 1);
    assert_eq!(snapshot.in_flight, 0);

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// Scenario: a status-1 reply resolves only that call; the transport
/// stays connected and serves the next request.
#[tokio::test]
async fn method_not_found_leaves_transport_connected() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let first = read_frame(&mut stream).await.expect("first frame");
        write_response(&mut stream, first.header.correlation_id, 1, b"")
            .await
            .expect("status 1");
        let second = read_frame(&mut stream).await.expect("second frame");
        write_response(
            &mut stream,
            second.header.correlation_id,
            0,
            &bincode_bytes(&7u32),
        )
        .await
        .expect("status 0");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;

    let err = client
        .send_typed::<String, u32>(&"nope".to_owned(), 999, SendOptions::new())
        .await
        .expect_err("status 1 must fail the call");
    assert!(matches!(err, TransportError::MethodNotFound));
    assert!(client.is_valid(), "a per-request error must not close the connection");

    let reply: framelink::ClientContext<u32> = client
        .send_typed(&"sum".to_owned(), 3, SendOptions::new())
        .await?;
    assert_eq!(reply.data, 7);

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// Scenario: two in-flight requests answered in reverse order; each
/// caller gets its own response, and the wire saw A before B.
#[tokio::test]
async fn reordered_replies_route_by_correlation_id() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    let (got_first_tx, got_first_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let a = read_frame(&mut stream).await.expect("frame A");
        got_first_tx.send(()).expect("notify test body");
        let b = read_frame(&mut stream).await.expect("frame B");
        assert_eq!(a.header.method_id, 1, "A must reach the wire first");
        assert_eq!(b.header.method_id, 2);
        // Reply B first, then A.
        write_response(
            &mut stream,
            b.header.correlation_id,
            0,
            &bincode_bytes(&"for B".to_owned()),
        )
        .await
        .expect("reply B");
        write_response(
            &mut stream,
            a.header.correlation_id,
            0,
            &bincode_bytes(&"for A".to_owned()),
        )
        .await
        .expect("reply A");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;

    let client_a = client.clone();
    let task_a = tokio::spawn(async move {
        client_a
            .send_typed::<String, String>(&"a".to_owned(), 1, SendOptions::new())
            .await
    });
    got_first_rx.await?;
    let client_b = client.clone();
    let task_b = tokio::spawn(async move {
        client_b
            .send_typed::<String, String>(&"b".to_owned(), 2, SendOptions::new())
            .await
    });

    assert_eq!(task_a.await??.data, "for A");
    assert_eq!(task_b.await??.data, "for B");

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// Scenario: the server disappears mid-request; the outstanding call
/// fails with `disconnected_endpoint` and later sends are rejected.
#[tokio::test]
async fn server_disconnect_fails_outstanding_and_gates_new_sends() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _ = read_frame(&mut stream).await.expect("request frame");
        drop(stream);
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;

    let err = client
        .send_typed::<String, String>(&"doomed".to_owned(), 5, SendOptions::new())
        .await
        .expect_err("connection loss must fail the call");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert!(!client.is_valid());

    client.stop().await;
    let err = client
        .send_typed::<String, String>(&"after stop".to_owned(), 5, SendOptions::new())
        .await
        .expect_err("sends after stop must be rejected");
    assert!(matches!(err, TransportError::ShuttingDown));

    server.await?;
    Ok(())
}

/// A compressed response body is decompressed transparently before
/// parsing.
#[tokio::test]
async fn compressed_response_round_trips() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    let blob = vec![3u8; 96 * 1024];
    let expected = blob.clone();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        assert_eq!(
            frame.header.compression,
            Compression::Zstd,
            "a 96 KiB payload crosses the default threshold"
        );
        let request: Vec<u8> = frame
            .header
            .compression
            .decompress(&frame.payload)
            .map(|raw| {
                bincode::decode_from_slice(&raw, bincode::config::standard())
                    .expect("request decodes")
                    .0
            })
            .expect("request decompresses");
        let reply = Compression::Zstd
            .compress(&bincode_bytes(&request))
            .expect("compress reply");
        write_response_compressed(
            &mut stream,
            frame.header.correlation_id,
            0,
            &reply,
            Compression::Zstd,
        )
        .await
        .expect("write reply");
        stream
    });

    let client = Client::new(
        TransportConfig::new(addr).with_default_compression(Compression::Zstd),
    );
    client.connect().await?;
    let reply: framelink::ClientContext<Vec<u8>> = client
        .send_typed(&blob, 9, SendOptions::new())
        .await?;
    assert_eq!(reply.data, expected);

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// Zero-length payloads are legal in both directions.
#[tokio::test]
async fn zero_length_payload_round_trips() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        assert_eq!(frame.header.payload_size, 0);
        write_response(&mut stream, frame.header.correlation_id, 0, b"")
            .await
            .expect("empty reply");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;
    let reply: framelink::ClientContext<()> = client
        .send_typed(&(), 11, SendOptions::new())
        .await?;
    let () = reply.data;

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// A reply whose header fails its CRC tears the whole connection down.
#[tokio::test]
async fn corrupted_header_fails_the_connection() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        let header = framelink::FrameHeader::for_request(
            Compression::None,
            b"",
            0,
            frame.header.correlation_id,
            0,
        );
        let mut encoded = header.encode();
        encoded[6] ^= 0xff; // mangle the length field under the CRC
        stream.write_all(&encoded).await.expect("write header");
        stream.flush().await.expect("flush");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;
    let err = client
        .send_typed::<String, String>(&"x".to_owned(), 1, SendOptions::new())
        .await
        .expect_err("a corrupt header must fail the request");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert!(!client.is_valid(), "framing loss must close the connection");
    assert_eq!(client.probe_snapshot().connection_resets, 1);

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// A payload that fails its CRC also tears the connection down.
#[tokio::test]
async fn corrupted_payload_fails_the_connection() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        let header = framelink::FrameHeader::for_request(
            Compression::None,
            b"good",
            0,
            frame.header.correlation_id,
            0,
        );
        stream.write_all(&header.encode()).await.expect("header");
        stream.write_all(b"evil").await.expect("payload");
        stream.flush().await.expect("flush");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;
    let err = client
        .send_typed::<String, String>(&"x".to_owned(), 1, SendOptions::new())
        .await
        .expect_err("a corrupt payload must fail the request");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert!(!client.is_valid());

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// A header declaring a payload above the inbound cap fails the
/// connection before any buffer for it is allocated.
#[tokio::test]
async fn oversized_reply_fails_the_connection() -> TestResult {
    let (listener, addr) = bound_listener().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let frame = read_frame(&mut stream).await.expect("request frame");
        // The header CRC is valid; only the declared length is hostile.
        let header = framelink::FrameHeader {
            payload_size: 64 * 1024,
            ..framelink::FrameHeader::for_request(
                Compression::None,
                b"",
                0,
                frame.header.correlation_id,
                0,
            )
        };
        stream.write_all(&header.encode()).await.expect("header");
        stream.flush().await.expect("flush");
        stream
    });

    let client = Client::new(
        TransportConfig::new(addr).with_max_inbound_payload_bytes(16 * 1024),
    );
    client.connect().await?;
    let err = client
        .send_typed::<String, String>(&"x".to_owned(), 1, SendOptions::new())
        .await
        .expect_err("an oversized reply must fail the request");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert!(
        !client.is_valid(),
        "an oversized frame cannot be skipped safely"
    );
    assert_eq!(client.probe_snapshot().connection_resets, 1);

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// Connecting to a closed port surfaces `disconnected_endpoint`.
#[tokio::test]
async fn connect_to_closed_port_fails() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    drop(listener);

    let client = Client::new(TransportConfig::new(addr));
    let err = client.connect().await.expect_err("nothing is listening");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(Some(_))));
    assert!(!client.is_valid());
    Ok(())
}

/// `connect` is single-use per instance.
#[tokio::test]
async fn connect_twice_is_rejected() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        stream
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;
    let err = client.connect().await.expect_err("second connect must fail");
    assert!(matches!(err, TransportError::ShuttingDown));

    client.stop().await;
    drop(server.await?);
    Ok(())
}

/// `shutdown` is immediate: pending calls resolve without waiting for
/// any drain.
#[tokio::test]
async fn shutdown_cancels_pending_requests_without_waiting() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    let (got_frame_tx, got_frame_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _ = read_frame(&mut stream).await.expect("request frame");
        got_frame_tx.send(()).expect("notify");
        let mut buf = [0u8; 1];
        let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_typed::<String, String>(&"held".to_owned(), 4, SendOptions::new())
                .await
        })
    };
    got_frame_rx.await?;
    client.shutdown();

    let err = pending.await?.expect_err("shutdown must fail the pending call");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert!(!client.is_valid());

    // A later graceful stop remains legal and releases the socket.
    client.stop().await;
    server.await?;
    Ok(())
}

/// `stop` resolves every outstanding request exactly once.
#[tokio::test]
async fn stop_fails_outstanding_requests() -> TestResult {
    let (listener, addr) = bound_listener().await?;
    let (got_frame_tx, got_frame_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _ = read_frame(&mut stream).await.expect("request frame");
        got_frame_tx.send(()).expect("notify");
        // Hold the socket open without replying.
        let mut buf = [0u8; 1];
        let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
    });

    let client = Client::new(TransportConfig::new(addr));
    client.connect().await?;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_typed::<String, String>(&"held".to_owned(), 4, SendOptions::new())
                .await
        })
    };
    got_frame_rx.await?;
    client.stop().await;

    let err = pending.await?.expect_err("stop must fail the pending call");
    assert!(matches!(err, TransportError::DisconnectedEndpoint(_)));
    assert_eq!(client.probe_snapshot().in_flight, 0);

    server.await?;
    Ok(())
}
