//! HTTP camera: MJPEG streams or single JPEG snapshots.
//!
//! Network webcams and phone camera apps commonly serve either a
//! `multipart/x-mixed-replace` MJPEG stream or a snapshot URL. `connect` checks
//! the content type once and picks the mode.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::CameraStats;
use crate::frame::{Frame, MAX_JPEG_BYTES};

pub(crate) struct HttpCamera {
    url: String,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpCamera {
    pub(crate) fn new(url: String, timeout: Duration) -> Self {
        Self {
            url,
            agent: ureq::AgentBuilder::new().timeout_connect(timeout).build(),
            stream: None,
            connected_at: None,
            last_frame_at: None,
            frame_count: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
        } else {
            self.stream = Some(HttpStream::Snapshot);
        }
        self.connected_at = Some(Instant::now());
        log::info!("camera: connected to {} ({})", self.url, content_type);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("camera not connected; call connect() first"))?;
        let jpeg = match stream {
            HttpStream::Mjpeg(stream) => stream.read_next_jpeg()?,
            HttpStream::Snapshot => fetch_snapshot(&self.agent, &self.url)?,
        };
        let frame = Frame::from_jpeg(&jpeg)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= Duration::from_secs(30),
            None => connected_at.elapsed() <= Duration::from_secs(5),
        }
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}

/// Newest complete JPEG seen on the stream, tagged with its sequence number.
#[derive(Default)]
struct FrameSlot {
    latest: Option<Vec<u8>>,
    seq: u64,
    ended: Option<String>,
    closed: bool,
}

type SharedSlot = Arc<(Mutex<FrameSlot>, Condvar)>;

/// MJPEG stream drained by a reader thread.
///
/// The thread keeps only the most recent complete frame, so a slow tick sees
/// the current picture instead of whatever was queued behind the last one.
struct MjpegStream {
    slot: SharedSlot,
    last_seq: u64,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        let slot: SharedSlot = Arc::new((Mutex::new(FrameSlot::default()), Condvar::new()));
        let pump_slot = slot.clone();
        std::thread::spawn(move || pump_frames(reader, &pump_slot));
        Self { slot, last_seq: 0 }
    }

    /// Wait for a frame newer than the one returned last time.
    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let (lock, ready) = &*self.slot;
        let deadline = Instant::now() + FRAME_WAIT;
        let mut slot = lock.lock().map_err(|_| anyhow!("mjpeg reader poisoned"))?;
        loop {
            if slot.seq > self.last_seq {
                if let Some(jpeg) = slot.latest.clone() {
                    self.last_seq = slot.seq;
                    return Ok(jpeg);
                }
            }
            if let Some(reason) = &slot.ended {
                return Err(anyhow!("mjpeg stream ended: {}", reason));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(anyhow!("no mjpeg frame within {:?}", FRAME_WAIT));
            }
            slot = ready
                .wait_timeout(slot, deadline - now)
                .map_err(|_| anyhow!("mjpeg reader poisoned"))?
                .0;
        }
    }
}

impl Drop for MjpegStream {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.0.lock() {
            slot.closed = true;
        }
    }
}

const FRAME_WAIT: Duration = Duration::from_secs(5);

fn pump_frames(mut reader: Box<dyn Read + Send + Sync>, slot: &SharedSlot) {
    let (lock, ready) = &**slot;
    let mut buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut chunk = vec![0u8; 8192];
    let ended = loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break "end of stream".to_string(),
            Ok(read) => read,
            Err(e) => break format!("read mjpeg chunk: {}", e),
        };
        buffer.extend_from_slice(&chunk[..read]);

        let mut newest = None;
        while let Some((start, end)) = find_jpeg_bounds(&buffer) {
            newest = Some(buffer[start..end].to_vec());
            buffer.drain(..end);
        }
        if buffer.len() > MAX_JPEG_BYTES * 2 {
            let keep = 2.min(buffer.len());
            let drain_len = buffer.len() - keep;
            buffer.drain(..drain_len);
        }

        let Ok(mut guard) = lock.lock() else {
            return;
        };
        if guard.closed {
            return;
        }
        if let Some(jpeg) = newest {
            guard.latest = Some(jpeg);
            guard.seq += 1;
            ready.notify_all();
        }
    };
    log::warn!("camera: {}", ended);
    if let Ok(mut guard) = lock.lock() {
        guard.ended = Some(ended);
        ready.notify_all();
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .context("read snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot"));
    }
    Ok(bytes)
}

/// Outermost SOI..EOI span. Embedded thumbnails nest their own marker pair.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let mut depth = 0usize;
    let mut i = start + 2;
    while i + 1 < buffer.len() {
        if buffer[i] == 0xFF {
            match buffer[i + 1] {
                0xD8 => {
                    depth += 1;
                    i += 2;
                    continue;
                }
                0xD9 if depth == 0 => return Some((start, i + 2)),
                0xD9 => {
                    depth -= 1;
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_markers() {
        let buf = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x03];
        assert_eq!(find_jpeg_bounds(&buf), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x01]), None);
    }

    #[test]
    fn nested_thumbnail_stays_inside_the_frame() {
        let buf = [
            0xFF, 0xD8, 0xFF, 0xE1, 0xFF, 0xD8, 0x10, 0xFF, 0xD9, 0x20, 0xFF, 0xD9, 0x30,
        ];
        assert_eq!(find_jpeg_bounds(&buf), Some((0, 12)));
        assert_eq!(find_jpeg_bounds(&buf[..9]), None);
    }

    fn mjpeg_parts(payloads: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        for payload in payloads {
            data.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            data.extend_from_slice(&[0xFF, 0xD8, *payload, 0xFF, 0xD9]);
            data.extend_from_slice(b"\r\n");
        }
        data
    }

    #[test]
    fn frames_queued_between_ticks_are_skipped() {
        let data = mjpeg_parts(&[1, 2, 3, 4, 5]);
        let mut stream = MjpegStream::new(Box::new(Cursor::new(data)));

        assert_eq!(stream.read_next_jpeg().unwrap(), vec![0xFF, 0xD8, 5, 0xFF, 0xD9]);
        let err = stream.read_next_jpeg().unwrap_err();
        assert!(err.to_string().contains("ended"));
    }

    /// Reader fed chunk by chunk, as a live camera connection would be.
    struct ChannelReader(std::sync::Mutex<std::sync::mpsc::Receiver<Vec<u8>>>);

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.lock().unwrap().recv() {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn each_tick_reads_the_newest_frame() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut stream = MjpegStream::new(Box::new(ChannelReader(std::sync::Mutex::new(rx))));

        tx.send(mjpeg_parts(&[1])).unwrap();
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 1);

        tx.send(mjpeg_parts(&[2, 3, 4])).unwrap();
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 4);

        drop(tx);
        assert!(stream.read_next_jpeg().is_err());
    }
}
