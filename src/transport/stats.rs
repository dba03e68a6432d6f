//! Traffic counters shared by every relay in the process

use super::TransportError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, trace};

const MEGABYTE: u64 = 1024 * 1024;

/// Relay direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client application towards the destination
    Upstream,
    /// Destination back to the client application
    Downstream,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Upstream => Direction::Downstream,
            Direction::Downstream => Direction::Upstream,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

/// Plain byte counters, one per direction.
///
/// Pumps increment; reporters read.
#[derive(Debug, Default)]
pub struct TrafficStats {
    upstream: RwLock<u64>,
    downstream: RwLock<u64>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficSnapshot {
    pub upstream: u64,
    pub downstream: u64,
}

impl TrafficStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `bytes` relayed in `direction`
    pub fn add(&self, direction: Direction, bytes: u64) {
        let counter = match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        };
        *counter.write() += bytes;
    }

    /// Copy of both counters; each is read independently
    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            upstream: *self.upstream.read(),
            downstream: *self.downstream.read(),
        }
    }
}

/// Destination for periodic counter reports
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn report(&self, snapshot: TrafficSnapshot) -> Result<(), TransportError>;
}

/// Logs whole megabytes received and sent
pub struct LogSink;

#[async_trait]
impl StatsSink for LogSink {
    async fn report(&self, snapshot: TrafficSnapshot) -> Result<(), TransportError> {
        info!(
            "Receive: {}M Send: {}M",
            snapshot.downstream / MEGABYTE,
            snapshot.upstream / MEGABYTE
        );
        Ok(())
    }
}

/// Pushes raw counters to a Unix socket listener.
///
/// Each report is a fresh connection carrying the upstream then downstream
/// counter as little-endian u64.
#[cfg(unix)]
pub struct UnixSocketSink {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixSocketSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
#[async_trait]
impl StatsSink for UnixSocketSink {
    async fn report(&self, snapshot: TrafficSnapshot) -> Result<(), TransportError> {
        use tokio::io::AsyncWriteExt;

        let mut stream = tokio::net::UnixStream::connect(&self.path).await?;
        let mut frame = [0u8; 16];
        frame[..8].copy_from_slice(&snapshot.upstream.to_le_bytes());
        frame[8..].copy_from_slice(&snapshot.downstream.to_le_bytes());
        stream.write_all(&frame).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Report `stats` to `sink` every `interval` until the task is aborted
pub fn spawn_reporter(
    stats: Arc<TrafficStats>,
    sink: Arc<dyn StatsSink>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = sink.report(stats.snapshot()).await {
                trace!("Stats report failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Collect(Mutex<Vec<TrafficSnapshot>>);

    #[async_trait]
    impl StatsSink for Collect {
        async fn report(&self, snapshot: TrafficSnapshot) -> Result<(), TransportError> {
            self.0.lock().push(snapshot);
            Ok(())
        }
    }

    #[test]
    fn test_counters() {
        let stats = TrafficStats::new();
        stats.add(Direction::Upstream, 10);
        stats.add(Direction::Downstream, 3);
        stats.add(Direction::Upstream, 5);

        assert_eq!(
            stats.snapshot(),
            TrafficSnapshot {
                upstream: 15,
                downstream: 3
            }
        );
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(TrafficStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add(Direction::Downstream, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().downstream, 8000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_ticks() {
        let stats = Arc::new(TrafficStats::new());
        stats.add(Direction::Upstream, 2 * MEGABYTE);
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));

        let handle = spawn_reporter(stats, sink.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.abort();

        let reports = sink.0.lock();
        assert!((2..=3).contains(&reports.len()));
        assert_eq!(reports[0].upstream, 2 * MEGABYTE);
    }

    #[tokio::test]
    async fn test_log_sink() {
        assert!(LogSink.report(TrafficSnapshot::default()).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_sink() {
        use tokio::io::AsyncReadExt;

        let path = std::env::temp_dir().join(format!("sudoku-stats-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let sink = UnixSocketSink::new(&path);
        let report = tokio::spawn(async move {
            sink.report(TrafficSnapshot {
                upstream: 7,
                downstream: 9,
            })
            .await
        });

        let (mut conn, _) = listener.accept().await.unwrap();
        let mut frame = Vec::new();
        conn.read_to_end(&mut frame).await.unwrap();
        report.await.unwrap().unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(frame.len(), 16);
        assert_eq!(u64::from_le_bytes(frame[..8].try_into().unwrap()), 7);
        assert_eq!(u64::from_le_bytes(frame[8..].try_into().unwrap()), 9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_sink_missing_listener() {
        let sink = UnixSocketSink::new("/nonexistent/sudoku-stats.sock");
        assert!(sink.report(TrafficSnapshot::default()).await.is_err());
    }
}
