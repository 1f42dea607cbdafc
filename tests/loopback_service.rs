use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::Message;

use crossroad_monitor::{
    ChannelPhase, ChannelSettings, Coordinator, Lane, MonitorConfig, UploadError, UploadTransport,
    VideoPayload,
};
use crossroad_monitor::transport::HttpUploader;

struct UploadRequest {
    request_line: String,
    content_type: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> UploadRequest {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    reader.read_line(&mut request_line).expect("request line");

    let mut content_length = 0usize;
    let mut content_type = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("header line");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().expect("length"),
                "content-type" => content_type = value.trim().to_string(),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("body");
    UploadRequest {
        request_line: request_line.trim_end().to_string(),
        content_type,
        body,
    }
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).expect("write response");
    stream.flush().expect("flush response");
}

/// Serves one upload request, answering `status` with `body`.
fn spawn_upload_server(
    status: &'static str,
    body: &'static str,
) -> (String, thread::JoinHandle<UploadRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind upload");
    let url = format!("http://{}/upload", listener.local_addr().unwrap());
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept upload");
        let request = read_request(&mut stream);
        respond(&mut stream, status, body);
        request
    });
    (url, server)
}

/// Accepts one WebSocket channel, checks the handshake, streams `messages`
/// and then waits for the client to close.
fn spawn_stream_server(messages: Vec<String>) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stream");
    let url = format!("ws://{}/ws/process", listener.local_addr().unwrap());
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept stream");
        let mut socket = tungstenite::accept(stream).expect("ws upgrade");
        let handshake = match socket.read().expect("handshake") {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("unexpected handshake frame: {:?}", other),
        };
        for message in messages {
            socket.send(Message::Text(message.into())).expect("send detection");
        }
        loop {
            match socket.read() {
                Ok(Message::Close(_)) => continue,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        handshake
    });
    (url, server)
}

fn test_config(upload_url: String, stream_url: String) -> MonitorConfig {
    MonitorConfig {
        upload_url,
        stream_url,
        channel: ChannelSettings {
            poll_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(2),
        },
        refresh: Duration::from_millis(50),
    }
}

#[test]
fn http_uploader_posts_multipart_and_reads_token() {
    let (url, server) = spawn_upload_server("200 OK", r#"{"path": "v1"}"#);
    let uploader = HttpUploader::new(url);

    let token = uploader
        .upload(Lane::North, &VideoPayload::new("north.mp4", b"fake video".to_vec()))
        .expect("upload");
    assert_eq!(token.as_str(), "v1");

    let request = server.join().expect("server thread");
    assert_eq!(request.request_line, "POST /upload HTTP/1.1");
    assert!(request.content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"file\"; filename=\"north.mp4\""));
    assert!(body.contains("Content-Type: video/mp4"));
    assert!(body.contains("fake video"));
}

#[test]
fn http_uploader_maps_failures() {
    let (url, server) = spawn_upload_server("500 Internal Server Error", r#"{"detail": "boom"}"#);
    let err = HttpUploader::new(url)
        .upload(Lane::East, &VideoPayload::new("east.mp4", vec![1, 2, 3]))
        .expect_err("server error");
    assert!(matches!(err, UploadError::Status { lane: Lane::East, status: 500 }));
    server.join().expect("server thread");

    let (url, server) = spawn_upload_server("200 OK", r#"{"status": "queued"}"#);
    let err = HttpUploader::new(url)
        .upload(Lane::West, &VideoPayload::new("west.mp4", vec![1, 2, 3]))
        .expect_err("missing path");
    assert!(matches!(err, UploadError::InvalidResponse { lane: Lane::West, .. }));
    server.join().expect("server thread");
}

#[test]
fn north_lane_streams_end_to_end() {
    let (upload_url, upload_server) = spawn_upload_server("200 OK", r#"{"path": "v1"}"#);
    let (stream_url, stream_server) = spawn_stream_server(vec![
        r#"{"counts": {"car": 3, "truck": 1}, "frame": "A"}"#.to_string(),
        r#"{"counts": {"car": 5, "truck": 1}, "frame": "B"}"#.to_string(),
    ]);
    let config = test_config(upload_url, stream_url);
    let mut coordinator = Coordinator::connect(&config).expect("coordinator");

    coordinator
        .submit(Lane::North, VideoPayload::new("north.mp4", b"fake video".to_vec()))
        .expect("submit");
    assert!(coordinator.lane(Lane::North).is_loading());

    let deadline = Instant::now() + Duration::from_secs(10);
    while coordinator.lane(Lane::North).frame.as_str() != "B" {
        assert!(Instant::now() < deadline, "detections never arrived");
        coordinator.wait_event(Duration::from_millis(50));
    }

    assert_eq!(coordinator.phase(Lane::North), ChannelPhase::Streaming);
    assert!(!coordinator.lane(Lane::North).is_loading());
    assert_eq!(coordinator.lane(Lane::North).counts.get("car"), Some(&5));
    assert_eq!(coordinator.lane(Lane::North).counts.get("truck"), Some(&1));
    assert_eq!(coordinator.aggregate().total("car"), 5);
    assert_eq!(coordinator.aggregate().total("truck"), 1);
    assert_eq!(coordinator.aggregate().active_lanes, 1);

    coordinator.shutdown();
    assert_eq!(stream_server.join().expect("stream server"), r#"{"path":"v1"}"#);
    upload_server.join().expect("upload server");
}

#[test]
fn unreachable_stream_closes_lane() {
    let (upload_url, upload_server) = spawn_upload_server("200 OK", r#"{"path": "v1"}"#);
    // Bind then drop to get a port nothing listens on.
    let stream_url = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("ws://{}/ws/process", listener.local_addr().unwrap())
    };
    let mut coordinator = Coordinator::connect(&test_config(upload_url, stream_url)).expect("coordinator");

    coordinator
        .submit(Lane::South, VideoPayload::new("south.mp4", vec![1, 2, 3]))
        .expect("submit");

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        coordinator.wait_event(Duration::from_millis(50));
        if !coordinator.lane(Lane::South).is_loading()
            && coordinator.phase(Lane::South) == ChannelPhase::Closed
        {
            break;
        }
        assert!(Instant::now() < deadline, "channel error never surfaced");
    }
    assert_eq!(coordinator.live_channels(), 0);
    assert!(coordinator.lane(Lane::South).counts.is_empty());
    upload_server.join().expect("upload server");
}
