//! Streaming behavior over real sockets: incremental writes, file
//! streaming, and peer-disconnect aborts.

mod common;

use std::io::Write;
use std::time::Duration;

use common::{get, start};
use hostwire::App;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

#[tokio::test]
async fn incremental_writes_arrive_as_one_body() {
    let app = App::new();
    app.route("chunks.localhost", |_req, res| {
        res.write("Hello ");
        res.write("Akeno");
        res.write("!");
        res.end(None);
    })
    .unwrap();
    let addr = start(&app).await;

    let res = get(addr, "chunks.localhost", "/").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body_str(), "Hello Akeno!");
}

#[tokio::test]
async fn body_finished_before_first_flush_is_length_framed() {
    let app = App::new();
    app.route("short.localhost", |_req, res| {
        res.cork(|res| {
            res.write("all at ");
            res.end(Some(b"once"));
        });
    })
    .unwrap();
    let addr = start(&app).await;

    let res = get(addr, "short.localhost", "/").await;
    assert_eq!(res.header("content-length"), Some("11"));
    assert_eq!(res.header("transfer-encoding"), None);
    assert_eq!(res.body_str(), "all at once");
}

#[tokio::test]
async fn custom_status_and_headers_reach_the_wire() {
    let app = App::new();
    app.route("teapot.localhost", |_req, res| {
        res.write_status(404);
        res.write_header("X-Engine", "hostwire");
        res.end(Some(b"nope"));
    })
    .unwrap();
    let addr = start(&app).await;

    let res = get(addr, "teapot.localhost", "/").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.header("x-engine"), Some("hostwire"));
    assert_eq!(res.body_str(), "nope");
}

#[tokio::test]
async fn file_streams_byte_exact() {
    let mut source = tempfile::NamedTempFile::new().unwrap();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    source.write_all(&payload).unwrap();
    let path = source.path().to_path_buf();

    let app = App::new();
    app.route("files.localhost", move |_req, res| {
        let path = path.clone();
        tokio::spawn(async move {
            if res.stream_file(&path).await.is_err() {
                res.write_status(404);
                res.end(Some(b"Not Found"));
            }
        });
    })
    .unwrap();
    let addr = start(&app).await;

    let res = get(addr, "files.localhost", "/").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, payload);
}

#[tokio::test]
async fn missing_file_becomes_a_404() {
    let app = App::new();
    app.route("missing.localhost", |_req, res| {
        tokio::spawn(async move {
            if res.stream_file("/no/such/file").await.is_err() {
                res.write_status(404);
                res.end(Some(b"Not Found"));
            }
        });
    })
    .unwrap();
    let addr = start(&app).await;

    let res = get(addr, "missing.localhost", "/").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body_str(), "Not Found");
}

#[tokio::test]
async fn peer_disconnect_fires_the_abort_callback_once() {
    let (aborted_tx, aborted_rx) = oneshot::channel();
    let aborted_tx = std::sync::Mutex::new(Some(aborted_tx));

    let app = App::new();
    app.route("slow.localhost", move |_req, res| {
        let tx = aborted_tx.lock().unwrap().take().unwrap();
        res.on_aborted(move || {
            let _ = tx.send(());
        });
        // Keep the response open with a slow drip until the peer leaves.
        tokio::spawn(async move {
            loop {
                if res.is_aborted() {
                    break;
                }
                res.write("tick");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
    })
    .unwrap();
    let addr = start(&app).await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket
        .write_all(b"GET / HTTP/1.1\r\nHost: slow.localhost\r\n\r\n")
        .await
        .unwrap();
    let mut first = [0u8; 64];
    socket.read(&mut first).await.unwrap();
    drop(socket);

    timeout(Duration::from_secs(5), aborted_rx)
        .await
        .expect("abort callback never fired")
        .unwrap();
}
