//! Fixtures shared by unit tests: zip builders and a one-route HTTP server.

use std::io::{Cursor, Write};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};
use zip::{write::FileOptions, ZipWriter};

/// Build an in-memory zip from `(name, contents)` pairs.
pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Descriptor JSON for a test game.
pub(crate) fn descriptor(name: &str, date: &str) -> String {
    format!(r#"{{"name": "{name}", "author": "tester", "releaseDate": "{date}"}}"#)
}

/// Archive holding two games, `tetris` (newer) and `snake`.
pub(crate) fn two_game_archive() -> Vec<u8> {
    zip_bytes(&[
        (
            "tetris/para_info.txt",
            descriptor("Tetris", "2019-03-01 18:30").as_str(),
        ),
        ("tetris/game.py", "print('tetris')\n"),
        (
            "snake/para_info.txt",
            descriptor("Snake", "2018-05-01 10:00").as_str(),
        ),
        ("snake/game.py", "print('snake')\n"),
    ])
}

/// Serve `body` with `status` to every connection until the runtime stops.
///
/// When `content_length` is false the body is delimited by closing the connection.
pub(crate) async fn serve(
    status: u16,
    body: Vec<u8>,
    content_length: bool,
) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let port = listener.local_addr().expect("mock server address").port();
    let url = format!("http://127.0.0.1:{port}/all.zip");

    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await;

            let mut head = format!("HTTP/1.1 {status} Mock\r\nContent-Type: application/zip\r\n");
            if content_length {
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            head.push_str("Connection: close\r\n\r\n");

            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
    });

    (url, handle)
}

/// Send half of `body`, announcing all of it, then keep the connection open without writing.
pub(crate) async fn serve_stalled(body: Vec<u8>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let port = listener.local_addr().expect("mock server address").port();
    let url = format!("http://127.0.0.1:{port}/all.zip");

    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await;

            let head = format!(
                "HTTP/1.1 200 Mock\r\nContent-Type: application/zip\r\nContent-Length: {}\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body[..body.len() / 2]).await;
            let _ = stream.flush().await;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
    });

    (url, handle)
}
