//! Read rig telemetry from a tokio runtime using the async line codec.
//!
//! Run with:
//!   cargo run --example async-monitor --features async -- 127.0.0.1:8001

use bytes::BytesMut;
use stillink::frame::{LineCodec, RawFrame};
use stillink::message::{encode, parse, CommandMessage, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8001".to_string());
    let mut stream = TcpStream::connect(&addr).await?;
    eprintln!("Connected to {addr}");

    let mut codec = LineCodec::new();
    let mut out = BytesMut::new();
    codec.encode(encode(&CommandMessage::Connect).as_bytes(), &mut out)?;
    stream.write_all(&out).await?;

    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            match codec.decode_eof(&mut buf) {
                Ok(Some(frame)) => report(frame),
                Ok(None) => {}
                Err(err) => eprintln!("Rig closed mid-line: {err}"),
            }
            break;
        }
        while let Some(frame) = codec.decode(&mut buf)? {
            report(frame);
        }
    }
    Ok(())
}

fn report(frame: RawFrame) {
    match parse(frame) {
        Ok(Message::Telemetry(sample)) => println!("{}", sample.to_line()),
        Ok(Message::Heartbeat) => eprintln!("heartbeat"),
        Err(err) => eprintln!("skipping: {err}"),
    }
}
