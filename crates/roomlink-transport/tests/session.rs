//! Integration tests for the TCP transport session.
//!
//! Each test stands up a plain `TcpListener` on an OS-assigned port and
//! plays the server side by hand, writing raw frames so the client's
//! framing is checked against real bytes.

use std::time::Duration;

use roomlink_protocol::{
    encode, AuthenticationReply, AuthenticationRequest, ConnectionTestReply,
    ErrorCode, MessageType, Outbound, PlayerTag, ReplyHeader, SessionKey,
    WireType,
};
use roomlink_transport::{TransportError, TransportSession};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let port = listener.local_addr().expect("should have addr").port();
    (listener, port)
}

async fn connect(port: u16, io_timeout: Duration) -> TransportSession {
    TransportSession::connect("127.0.0.1", port, TIMEOUT, io_timeout)
        .await
        .expect("should connect")
}

fn reply_frame<R: WireType>(
    message_type: MessageType,
    error_code: ErrorCode,
    body: &R,
) -> Vec<u8> {
    let mut frame = encode(&ReplyHeader {
        message_type: message_type as u8,
        error_code,
    })
    .expect("header encodes");
    frame.extend(encode(body).expect("body encodes"));
    frame
}

fn auth_reply() -> AuthenticationReply {
    AuthenticationReply {
        api_version: 1,
        session_key: SessionKey(0xDEAD_BEEF),
        player_tag: PlayerTag(42),
    }
}

#[tokio::test]
async fn test_connect_refused_reports_failed_to_connect() {
    // Grab a free port, then release it so nothing is listening there.
    let (listener, port) = listener().await;
    drop(listener);

    let result =
        TransportSession::connect("127.0.0.1", port, TIMEOUT, TIMEOUT).await;
    assert!(matches!(result, Err(TransportError::FailedToConnect { .. })));
}

#[tokio::test]
async fn test_send_writes_header_and_body_as_one_frame() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("should accept");
        let mut frame = vec![0u8; 5 + AuthenticationRequest::SIZE];
        stream.read_exact(&mut frame).await.expect("should read");
        frame
    });

    let mut session = connect(port, TIMEOUT).await;
    let request = AuthenticationRequest {
        api_version: 1,
        player_name: "alice".into(),
    };
    session
        .send(&Outbound::from(request), SessionKey(7))
        .await
        .expect("send should succeed");

    let frame = server.await.expect("server task");
    assert_eq!(&frame[..5], &[1, 0, 0, 0, 7]);
    assert_eq!(&frame[5..7], &[0, 1]);
    assert_eq!(&frame[7..12], b"alice");
    assert!(frame[12..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_receive_decodes_ok_reply() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("should accept");
        let frame =
            reply_frame(MessageType::Authentication, ErrorCode::Ok, &auth_reply());
        stream.write_all(&frame).await.expect("should write");
        // Hold the socket open until the client is done.
        let _ = stream.read(&mut [0u8; 1]).await;
    });

    let mut session = connect(port, TIMEOUT).await;
    let outcome = session
        .receive::<AuthenticationReply>()
        .await
        .expect("receive should succeed");
    assert_eq!(outcome, Ok(auth_reply()));
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_error_reply_consumes_body_and_keeps_stream_aligned() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("should accept");
        // A rejected reply still carries a full (ignored) body...
        let rejected = reply_frame(
            MessageType::ConnectionTest,
            ErrorCode::RequestParameterWrong,
            &ConnectionTestReply { succeeded: true },
        );
        // ...followed immediately by the next reply.
        let accepted = reply_frame(
            MessageType::ConnectionTest,
            ErrorCode::Ok,
            &ConnectionTestReply { succeeded: true },
        );
        stream.write_all(&rejected).await.expect("should write");
        stream.write_all(&accepted).await.expect("should write");
        let _ = stream.read(&mut [0u8; 1]).await;
    });

    let mut session = connect(port, TIMEOUT).await;
    let first = session
        .receive::<ConnectionTestReply>()
        .await
        .expect("transport ok");
    assert_eq!(first, Err(ErrorCode::RequestParameterWrong));

    let second = session
        .receive::<ConnectionTestReply>()
        .await
        .expect("transport ok");
    assert_eq!(second, Ok(ConnectionTestReply { succeeded: true }));
}

#[tokio::test]
async fn test_unexpected_message_type_tears_session_down() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("should accept");
        let frame = reply_frame(
            MessageType::ConnectionTest,
            ErrorCode::Ok,
            &ConnectionTestReply { succeeded: true },
        );
        stream.write_all(&frame).await.expect("should write");
        let _ = stream.read(&mut [0u8; 1]).await;
    });

    let mut session = connect(port, TIMEOUT).await;
    let result = session.receive::<AuthenticationReply>().await;
    assert!(matches!(
        result,
        Err(TransportError::UnexpectedMessageType {
            expected: MessageType::Authentication,
            actual: 7,
        })
    ));
    assert!(!session.is_connected());

    let again = session.receive::<AuthenticationReply>().await;
    assert!(matches!(again, Err(TransportError::ConnectionClosed)));
}

#[tokio::test]
async fn test_peer_closing_mid_reply_is_an_io_error() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("should accept");
        let frame =
            reply_frame(MessageType::Authentication, ErrorCode::Ok, &auth_reply());
        // Only half the frame, then hang up.
        stream.write_all(&frame[..4]).await.expect("should write");
    });

    let mut session = connect(port, TIMEOUT).await;
    let result = session.receive::<AuthenticationReply>().await;
    assert!(matches!(result, Err(TransportError::Io(_))));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_receive_times_out_when_server_is_silent() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);
    });

    let mut session = connect(port, Duration::from_millis(50)).await;
    let result = session.receive::<AuthenticationReply>().await;
    assert!(matches!(result, Err(TransportError::Timeout("receive"))));
    assert!(!session.is_connected());
    server.abort();
}

#[tokio::test]
async fn test_close_twice_and_use_after_close() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let _held: TcpStream = listener.accept().await.expect("should accept").0;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let mut session = connect(port, TIMEOUT).await;
    assert_eq!(session.peer_addr().port(), port);

    session.close().await.expect("first close succeeds");
    assert!(!session.is_connected());
    assert!(matches!(
        session.close().await,
        Err(TransportError::NotConnected)
    ));

    let send = session
        .send(
            &Outbound::from(roomlink_protocol::KeepAliveNotice {}),
            SessionKey(1),
        )
        .await;
    assert!(matches!(send, Err(TransportError::ConnectionClosed)));
}
