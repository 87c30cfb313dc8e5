//! Agent output line framing.

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, FramedRead};

use session_worker::execution::codec::{AgentStreamCodec, MAX_LINE_BYTES};

#[test]
fn decodes_complete_lines_and_waits_for_partial_ones() {
    let mut codec = AgentStreamCodec::new();
    let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\":"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"a\":1}"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"2}\n");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"b\":2}"));
}

#[test]
fn trailing_line_without_newline_is_yielded_at_eof() {
    let mut codec = AgentStreamCodec::default();
    let mut buf = BytesMut::from(&b"{\"done\":true}"[..]);
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    assert_eq!(
        codec.decode_eof(&mut buf).unwrap().as_deref(),
        Some("{\"done\":true}")
    );
}

#[test]
fn oversized_line_is_discarded_and_decoding_resumes() {
    let mut codec = AgentStreamCodec::with_max_length(8);
    let mut buf = BytesMut::from(&b"0123456789abcdef\nok\n"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ok"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[tokio::test]
async fn framed_stream_survives_oversized_line() {
    let input: &[u8] = b"aaaaaaaaaaaaaaaaaaaaaaaa\n{\"ok\":1}\n{\"ok\":2}\n";
    let lines: Vec<String> = FramedRead::new(input, AgentStreamCodec::with_max_length(8))
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(lines, ["{\"ok\":1}", "{\"ok\":2}"]);
}

#[tokio::test]
async fn oversized_line_split_across_reads_is_discarded() {
    let (mut writer, reader) = tokio::io::duplex(4);
    let producer = tokio::spawn(async move {
        writer
            .write_all(b"{\"first\":1}\nxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\n{\"last\":1}\n")
            .await
            .unwrap();
    });

    let lines: Vec<String> = FramedRead::new(reader, AgentStreamCodec::with_max_length(16))
        .map(Result::unwrap)
        .collect()
        .await;
    producer.await.unwrap();
    assert_eq!(lines, ["{\"first\":1}", "{\"last\":1}"]);
}

#[tokio::test]
async fn oversized_trailing_line_at_eof_ends_cleanly() {
    let input: &[u8] = b"{\"ok\":1}\nzzzzzzzzzzzzzzzzzzzz";
    let items: Vec<_> = FramedRead::new(input, AgentStreamCodec::with_max_length(8))
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap(), "{\"ok\":1}");
}

#[test]
fn default_limit_is_one_mebibyte() {
    assert_eq!(MAX_LINE_BYTES, 1024 * 1024);
}
