//! Encoder diagnostic channel
//!
//! ffmpeg writes its startup banner, warnings, errors and progress to stderr.
//! Banner lines are logged locally; every other line is forwarded to the engine,
//! which relays it to the room as a `stream-error` message.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::Event;

/// Longest line kept before it is force-split
const MAX_LINE_LEN: usize = 4096;

/// Prefixes of the lines ffmpeg prints on every start
const BANNER_PREFIXES: &[&str] = &[
    "ffmpeg version",
    "built with",
    "configuration:",
    "libavutil",
    "libavcodec",
    "libavformat",
    "libavdevice",
    "libavfilter",
    "libswscale",
    "libswresample",
    "libpostproc",
];

/// Check if a line is part of the encoder's startup banner
pub fn is_banner_line(line: &str) -> bool {
    let line = line.trim_start();
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// Split complete lines off the front of `buf`
///
/// Both `\n` and `\r` terminate a line (ffmpeg redraws progress with `\r`).
/// Blank lines are skipped. A partial line longer than the limit is emitted as is.
pub fn split_lines(buf: &mut BytesMut) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
        let raw = buf.split_to(pos + 1);
        push_line(&mut lines, &raw);
    }

    if buf.len() > MAX_LINE_LEN {
        let raw = buf.split();
        push_line(&mut lines, &raw);
    }

    lines
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if !text.is_empty() {
        lines.push(text.to_string());
    }
}

/// Spawn the task that reads an encoder's diagnostic output
pub fn spawn_reader<R>(
    stderr: R,
    stream_id: String,
    generation: u64,
    events: mpsc::Sender<Event>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        read_diagnostics(stderr, &stream_id, generation, &events).await;
        tracing::trace!(stream = %stream_id, generation, "Encoder diagnostics closed");
    })
}

async fn read_diagnostics<R>(
    mut stderr: R,
    stream_id: &str,
    generation: u64,
    events: &mpsc::Sender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(MAX_LINE_LEN);

    loop {
        match stderr.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                for line in split_lines(&mut buf) {
                    if !forward(line, stream_id, generation, events).await {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(stream = %stream_id, error = %e, "Encoder stderr read failed");
                break;
            }
        }
    }

    // Trailing output without a line terminator
    let rest = buf.split();
    let mut lines = Vec::new();
    push_line(&mut lines, &rest);
    for line in lines {
        if !forward(line, stream_id, generation, events).await {
            return;
        }
    }
}

/// Returns `false` once the engine is gone
async fn forward(line: String, stream_id: &str, generation: u64, events: &mpsc::Sender<Event>) -> bool {
    if is_banner_line(&line) {
        tracing::info!(stream = %stream_id, "{}", line);
        return true;
    }

    tracing::debug!(stream = %stream_id, generation, output = %line, "Encoder output");

    events
        .send(Event::EncoderDiagnostic {
            stream_id: stream_id.to_string(),
            generation,
            line,
        })
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_banner_detection() {
        assert!(is_banner_line(
            "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers"
        ));
        assert!(is_banner_line("  built with gcc 13.2.0"));
        assert!(is_banner_line("  configuration: --enable-gpl --enable-libx264"));
        assert!(is_banner_line("  libavutil      58. 29.100 / 58. 29.100"));
        assert!(is_banner_line("  libswresample   4. 12.100 /  4. 12.100"));

        assert!(!is_banner_line("pipe:0: Invalid data found when processing input"));
        assert!(!is_banner_line("[flv @ 0x55d] Failed to update header with correct duration."));
        assert!(!is_banner_line("frame=  120 fps= 30 q=28.0 size=     512kB"));
    }

    #[test]
    fn test_split_lines() {
        let mut buf = BytesMut::from(&b"first line\nframe=1\rframe=2\r\n\npartial"[..]);
        let lines = split_lines(&mut buf);

        assert_eq!(lines, ["first line", "frame=1", "frame=2"]);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_split_overlong_partial() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_LEN + 1].as_slice());
        let lines = split_lines(&mut buf);

        assert_eq!(lines.len(), 1);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_reader_forwards_non_banner_lines() {
        let (mut process_side, reader_side) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);

        let handle = spawn_reader(reader_side, "room1".into(), 7, tx);

        process_side
            .write_all(b"ffmpeg version 6.1\n  built with gcc\npipe:0: Invalid data\nlast")
            .await
            .unwrap();
        drop(process_side);
        handle.await.unwrap();

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::EncoderDiagnostic {
                    stream_id,
                    generation,
                    line,
                } => {
                    assert_eq!(stream_id, "room1");
                    assert_eq!(generation, 7);
                    lines.push(line);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(lines, ["pipe:0: Invalid data", "last"]);
    }
}
