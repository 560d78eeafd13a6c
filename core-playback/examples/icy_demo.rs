//! # ICY Stream Demo
//!
//! Synthesizes a 22.05 kHz sine wave, interleaves ICY metadata into it the
//! way an Icecast server would, and plays it back at 44.1 kHz through the
//! [`Player`] with a producer thread and a consumer thread.
//!
//! Run with: `cargo run --example icy_demo --package core-playback`

use core_playback::streaming::StreamFeeder;
use core_playback::{
    MetaKey, Player, PlayerConfig, RawPcmDecoder, ReadStatus, SamplePair, StreamFormat,
};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SOURCE_RATE: u32 = 22_050;
const METAINT: usize = 8_192;

fn sine_pcm(seconds: f64, frequency: f64) -> Vec<u8> {
    let frames = (SOURCE_RATE as f64 * seconds) as usize;
    let mut bytes = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let t = i as f64 / SOURCE_RATE as f64;
        let sample = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 8_000.0) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn with_icy_frames(payload: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(payload.len() + payload.len() / METAINT * 64);
    for (index, block) in payload.chunks(METAINT).enumerate() {
        stream.extend_from_slice(block);
        if block.len() < METAINT {
            break;
        }
        let text = format!("StreamTitle='Demo Radio - Segment {}';", index + 1);
        let blocks = text.len().div_ceil(16);
        stream.push(blocks as u8);
        stream.extend_from_slice(text.as_bytes());
        stream.resize(stream.len() + blocks * 16 - text.len(), 0);
    }
    stream
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let stream = with_icy_frames(&sine_pcm(2.0, 440.0));
    println!("Synthesized {} stream bytes", stream.len());

    let decoder = RawPcmDecoder::new(StreamFormat::new(SOURCE_RATE, 2));
    let player = Arc::new(Player::new(Box::new(decoder), PlayerConfig::default())?);
    player.set_parameter("icy-interval", METAINT as i64);

    let feeder = StreamFeeder::new(Arc::clone(&player)).with_chunk_bytes(1_500);
    let producer = thread::spawn(move || feeder.run(Cursor::new(stream)));

    let mut out = [SamplePair::SILENCE; 1024];
    let mut delivered = 0usize;
    let mut last_title = None;
    loop {
        match player.read(&mut out)? {
            ReadStatus::Produced(0) => thread::sleep(Duration::from_millis(1)),
            ReadStatus::Produced(n) => delivered += n,
            ReadStatus::EndOfStream => break,
        }

        let title = player.metadata().text(MetaKey::SubTitle);
        if title.is_some() && title != last_title {
            println!("Now playing: {}", title.as_deref().unwrap_or_default());
            last_title = title;
        }
    }

    let feed_stats = producer.join().map_err(|_| "feeder thread panicked")??;
    let stats = player.stats();

    println!("\n=== Summary ===");
    println!("Bytes fed:          {}", feed_stats.bytes_fed);
    println!("Payload ratio:      {:.4}", stats.payload_ratio());
    println!("Metadata frames:    {}", stats.metadata_frames);
    println!(
        "Pairs delivered:    {} ({:.2}s at 44.1 kHz)",
        delivered,
        delivered as f64 / 44_100.0
    );

    Ok(())
}
