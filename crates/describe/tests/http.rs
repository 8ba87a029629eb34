use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use camera::VideoFrame;
use describe::{
    send_with_retry, AudioOutput, CapturePipeline, DescribeOutcome, DescriptionTransport,
    HttpTransport, ImagePayload, PipelineSettings, PlaybackError, RetryFailure, RetryPolicy,
    TapOutcome, ToneSpec, TransportError,
};

const AUDIO: &[u8] = b"ID3\x03\x00fake-mpeg-frames";

#[derive(Debug, Clone)]
struct Request {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

enum Reply {
    Status(u16),
    Audio,
    Stall(Duration),
}

/// Minimal HTTP/1.1 server answering each connection from a script.
struct StubServer {
    addr: SocketAddr,
    hits: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl StubServer {
    fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (server_hits, server_requests) = (hits.clone(), requests.clone());
        thread::spawn(move || {
            for reply in script {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                server_hits.fetch_add(1, Ordering::SeqCst);
                if let Some(request) = serve(stream, reply) {
                    server_requests.lock().unwrap().push(request);
                }
            }
        });
        Self {
            addr,
            hits,
            requests,
        }
    }

    fn url(&self) -> String {
        format!("http://{}/describe", self.addr)
    }

    fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, reply: Reply) -> Option<Request> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;

    let mut headers = Vec::new();
    loop {
        line.clear();
        reader.read_line(&mut line).ok()?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;

    let mut stream = stream;
    match reply {
        Reply::Status(code) => {
            let head = format!(
                "HTTP/1.1 {code} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(head.as_bytes()).ok()?;
        }
        Reply::Audio => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                AUDIO.len()
            );
            stream.write_all(head.as_bytes()).ok()?;
            stream.write_all(AUDIO).ok()?;
        }
        Reply::Stall(duration) => thread::sleep(duration),
    }
    let _ = stream.flush();
    Some(Request { headers, body })
}

fn payload() -> ImagePayload {
    ImagePayload::from_frame(&VideoFrame::solid(32, 24, [10, 120, 240, 255]), 85).unwrap()
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        delay: Duration::from_millis(10),
    }
}

#[test]
fn posts_json_data_url_and_returns_audio() {
    let server = StubServer::start(vec![Reply::Audio]);
    let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let payload = payload();

    let audio = transport.post(&payload).unwrap();

    assert_eq!(audio, AUDIO);
    let requests = server.requests.lock().unwrap();
    let request = requests.first().expect("request recorded");
    assert_eq!(request.header("accept"), Some("audio/mpeg"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let url = body["image"].as_str().unwrap();
    assert_eq!(url, payload.data_url());
    let jpeg = STANDARD
        .decode(url.strip_prefix("data:image/jpeg;base64,").unwrap())
        .unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 24));
}

#[test]
fn server_errors_are_retried_until_exhausted() {
    let server = StubServer::start((0..3).map(|_| Reply::Status(503)).collect());
    let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let (_canceller, token) = describe::cancellation();

    let failure = send_with_retry(&transport, &payload(), &fast_policy(2), &token).unwrap_err();

    assert!(matches!(
        failure,
        RetryFailure::Exhausted {
            attempts: 3,
            error: TransportError::Status(503)
        }
    ));
    assert_eq!(server.hits(), 3);
}

#[test]
fn not_found_is_final() {
    let server = StubServer::start(vec![Reply::Status(404), Reply::Audio]);
    let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
    let (_canceller, token) = describe::cancellation();

    let failure = send_with_retry(&transport, &payload(), &fast_policy(3), &token).unwrap_err();

    assert!(matches!(
        failure,
        RetryFailure::Exhausted {
            attempts: 1,
            error: TransportError::Status(404)
        }
    ));
    assert_eq!(server.hits(), 1);
}

#[test]
fn slow_server_times_out() {
    let server = StubServer::start(vec![Reply::Stall(Duration::from_secs(2))]);
    let transport = HttpTransport::new(&server.url(), Duration::from_millis(200)).unwrap();

    let err = transport.post(&payload()).unwrap_err();

    assert!(matches!(err, TransportError::Timeout(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[test]
fn refused_connection_is_retryable() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let transport =
        HttpTransport::new(&format!("http://{addr}/describe"), Duration::from_secs(2)).unwrap();

    let err = transport.post(&payload()).unwrap_err();

    assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
    assert!(err.is_retryable());
}

#[derive(Default)]
struct Recorder {
    played: Mutex<Vec<Vec<u8>>>,
    tones: AtomicU32,
}

impl AudioOutput for Recorder {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        self.played.lock().unwrap().push(audio.to_vec());
        Ok(())
    }

    fn play_tone(&self, _tone: &ToneSpec) -> Result<(), PlaybackError> {
        self.tones.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn pipeline_recovers_after_transient_failure() {
    let server = StubServer::start(vec![Reply::Status(503), Reply::Audio]);
    let transport = Arc::new(HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap());
    let audio = Arc::new(Recorder::default());
    let settings = PipelineSettings {
        retry: fast_policy(3),
        ..PipelineSettings::default()
    };
    let pipeline = CapturePipeline::new(transport, audio.clone(), settings);

    let frame = Arc::new(VideoFrame::solid(64, 48, [90, 60, 30, 255]));
    let TapOutcome::Started(worker) = pipeline.capture_and_describe(Some(frame)) else {
        panic!("tap should start a description");
    };
    let outcome = worker.join().unwrap();

    assert!(matches!(outcome, DescribeOutcome::Spoken { attempts: 2 }));
    assert_eq!(audio.played.lock().unwrap().as_slice(), &[AUDIO.to_vec()]);
    assert_eq!(audio.tones.load(Ordering::SeqCst), 0);
    assert_eq!(server.hits(), 2);
    assert!(!pipeline.is_processing());
}

#[test]
fn pipeline_plays_tone_when_service_is_down() {
    let server = StubServer::start((0..2).map(|_| Reply::Status(500)).collect());
    let transport = Arc::new(HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap());
    let audio = Arc::new(Recorder::default());
    let settings = PipelineSettings {
        retry: fast_policy(1),
        ..PipelineSettings::default()
    };
    let pipeline = CapturePipeline::new(transport, audio.clone(), settings);

    let frame = Arc::new(VideoFrame::solid(16, 16, [1, 2, 3, 255]));
    let TapOutcome::Started(worker) = pipeline.capture_and_describe(Some(frame)) else {
        panic!("tap should start a description");
    };

    assert!(matches!(worker.join().unwrap(), DescribeOutcome::Fallback { .. }));
    assert_eq!(audio.tones.load(Ordering::SeqCst), 1);
    assert!(audio.played.lock().unwrap().is_empty());
    assert_eq!(server.hits(), 2);
}
