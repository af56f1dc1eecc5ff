//! Async adapters for the blocking capture readers.
//!
//! A reader runs on tokio's blocking pool and forwards what it produces into a
//! bounded channel. The task ends at end of stream, on a read failure, or
//! once the receiver is dropped and the pending read returns. The reader is
//! closed in every case.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::demux::{AudioChunk, AudioDemuxer, VideoDemuxer, VideoFrame};
use crate::errors::{CaptureError, Result};
use crate::process::StopHandle;
use crate::readers::{AudioReader, RtpReader, VideoReader};
use crate::rtp::RtpPacket;

/// Something that yields items until end of stream.
pub trait CaptureSource: Send + 'static {
    type Item: Send + 'static;

    fn next_item(&mut self) -> Result<Option<Self::Item>>;

    /// Handle able to interrupt a `next_item` blocked on the capture process.
    fn stop_handle(&self) -> Option<StopHandle> {
        None
    }

    /// Release the underlying capture once the stream is finished.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receiving end of a spawned capture.
pub struct CaptureStream<T> {
    rx: mpsc::Receiver<Result<T>>,
    task: JoinHandle<Result<()>>,
    stop: Option<StopHandle>,
}

impl<T> CaptureStream<T> {
    /// Next item; `None` once the capture has ended.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Stop receiving, kill the capture process and wait for the reader to
    /// be closed.
    ///
    /// Killing the process unblocks a pending read even when the process has
    /// stalled. A source without a stop handle is closed after its current
    /// `next_item` returns. A video reader still waiting for its first frame
    /// finishes when its startup timeout expires.
    pub async fn close(self) -> Result<()> {
        drop(self.rx);
        if let Some(stop) = &self.stop {
            stop.kill();
        }
        self.task.await.map_err(|e| {
            CaptureError::Wait(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?
    }
}

/// Run `source` on the blocking pool, buffering up to `capacity` items.
pub fn spawn_capture<S: CaptureSource>(mut source: S, capacity: usize) -> CaptureStream<S::Item> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stop = source.stop_handle();

    let task = tokio::task::spawn_blocking(move || {
        loop {
            match source.next_item() {
                Ok(Some(item)) => {
                    if tx.blocking_send(Ok(item)).is_err() {
                        log::debug!("Capture receiver dropped");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Capture read failed: {}", e);
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
        source.shutdown()
    });

    CaptureStream { rx, task, stop }
}

pub fn spawn_video_stream(reader: VideoReader, capacity: usize) -> CaptureStream<VideoFrame> {
    spawn_capture(reader, capacity)
}

pub fn spawn_audio_stream(reader: AudioReader, capacity: usize) -> CaptureStream<AudioChunk> {
    spawn_capture(reader, capacity)
}

/// Packets are delivered grouped per NAL unit.
pub fn spawn_rtp_stream(reader: RtpReader, capacity: usize) -> CaptureStream<Vec<RtpPacket>> {
    spawn_capture(reader, capacity)
}

fn log_exit(status: std::process::ExitStatus) {
    log::debug!("Capture process exited with {}", status);
}

impl CaptureSource for VideoReader {
    type Item = VideoFrame;

    fn next_item(&mut self) -> Result<Option<VideoFrame>> {
        self.read_frame()
    }

    fn stop_handle(&self) -> Option<StopHandle> {
        Some(VideoReader::stop_handle(self))
    }

    fn shutdown(&mut self) -> Result<()> {
        self.close().map(log_exit)
    }
}

impl CaptureSource for AudioReader {
    type Item = AudioChunk;

    fn next_item(&mut self) -> Result<Option<AudioChunk>> {
        self.read_chunk()
    }

    fn stop_handle(&self) -> Option<StopHandle> {
        Some(AudioReader::stop_handle(self))
    }

    fn shutdown(&mut self) -> Result<()> {
        self.close().map(log_exit)
    }
}

impl CaptureSource for RtpReader {
    type Item = Vec<RtpPacket>;

    fn next_item(&mut self) -> Result<Option<Vec<RtpPacket>>> {
        self.read_packets()
    }

    fn stop_handle(&self) -> Option<StopHandle> {
        Some(RtpReader::stop_handle(self))
    }

    fn shutdown(&mut self) -> Result<()> {
        self.close().map(log_exit)
    }
}

impl<R: std::io::Read + Send + 'static> CaptureSource for VideoDemuxer<R> {
    type Item = VideoFrame;

    fn next_item(&mut self) -> Result<Option<VideoFrame>> {
        self.read_frame()
    }
}

impl<R: std::io::Read + Send + 'static> CaptureSource for AudioDemuxer<R> {
    type Item = AudioChunk;

    fn next_item(&mut self) -> Result<Option<AudioChunk>> {
        self.read_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_video_frames_flow_through_channel() {
        let frames = vec![7u8; 12 * 3];
        let demuxer = VideoDemuxer::new(Cursor::new(frames), 4, 2).unwrap();
        let mut stream = spawn_capture(demuxer, 1);

        let mut count = 0;
        while let Some(frame) = stream.recv().await {
            let frame = frame.unwrap();
            assert!(frame.y().iter().all(|&b| b == 7));
            count += 1;
        }
        assert_eq!(count, 3);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_audio_chunks_flow_through_channel() {
        let demuxer = AudioDemuxer::new(Cursor::new(vec![0u8; 3840 * 2]), 2, 48000).unwrap();
        let mut stream = spawn_capture(demuxer, 4);

        assert_eq!(stream.recv().await.unwrap().unwrap().samples_per_channel, 960);
        assert!(stream.recv().await.unwrap().is_ok());
        assert!(stream.recv().await.is_none());
    }

    struct Counter {
        next: u32,
        fail_at: Option<u32>,
        shut_down: Arc<AtomicBool>,
    }

    impl CaptureSource for Counter {
        type Item = u32;

        fn next_item(&mut self) -> Result<Option<u32>> {
            if Some(self.next) == self.fail_at {
                return Err(CaptureError::invalid_argument("scripted failure"));
            }
            self.next += 1;
            Ok(Some(self.next))
        }

        fn shutdown(&mut self) -> Result<()> {
            self.shut_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_error_is_forwarded_then_stream_ends() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let source = Counter {
            next: 0,
            fail_at: Some(2),
            shut_down: shut_down.clone(),
        };
        let mut stream = spawn_capture(source, 8);

        assert_eq!(stream.recv().await.unwrap().unwrap(), 1);
        assert_eq!(stream.recv().await.unwrap().unwrap(), 2);
        assert!(stream.recv().await.unwrap().is_err());
        assert!(stream.recv().await.is_none());
        stream.close().await.unwrap();
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    struct RawCapture(crate::process::CaptureProcess);

    #[cfg(unix)]
    impl CaptureSource for RawCapture {
        type Item = Vec<u8>;

        fn next_item(&mut self) -> Result<Option<Vec<u8>>> {
            let mut buf = [0u8; 64];
            match std::io::Read::read(&mut self.0, &mut buf) {
                Ok(0) => Ok(None),
                Ok(n) => Ok(Some(buf[..n].to_vec())),
                Err(e) => Err(CaptureError::io(e, self.0.last_diagnostics())),
            }
        }

        fn stop_handle(&self) -> Option<StopHandle> {
            Some(self.0.stop_handle())
        }

        fn shutdown(&mut self) -> Result<()> {
            self.0.stop().map(|_| ())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_interrupts_stalled_process() {
        let process =
            crate::process::CaptureProcess::start("sh", &["-c", "printf ready; exec sleep 30"]).unwrap();
        let mut stream = spawn_capture(RawCapture(process), 1);
        assert_eq!(stream.recv().await.unwrap().unwrap(), b"ready".to_vec());

        // The reader is now blocked on a process that writes nothing more.
        let closed = tokio::time::timeout(std::time::Duration::from_secs(10), stream.close()).await;
        closed.expect("close should not wait for the stalled process").unwrap();
    }

    #[tokio::test]
    async fn test_dropping_receiver_shuts_source_down() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let source = Counter {
            next: 0,
            fail_at: None,
            shut_down: shut_down.clone(),
        };
        let mut stream = spawn_capture(source, 2);

        assert_eq!(stream.recv().await.unwrap().unwrap(), 1);
        stream.close().await.unwrap();
        assert!(shut_down.load(Ordering::SeqCst));
    }
}
