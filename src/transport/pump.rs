//! Byte pump between two connections
//!
//! A relay runs one pump per direction as separate tasks. When a pump sees a
//! clean end of stream it shuts down the write side of its destination so
//! the peer receives FIN, and the other direction keeps running. Any other
//! failure tears down both directions, as does the whole connection going
//! quiet for longer than the idle timeout.

use super::stats::{Direction, TrafficStats};
use super::{BoxedSink, BoxedSource, ChunkSink, ChunkSource, TransportError};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Plain bytes moved per read
pub const PUMP_CHUNK_SIZE: usize = 1024;

/// Bytes moved by a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub upstream: u64,
    pub downstream: u64,
}

/// Last time any direction of a relay moved bytes
#[derive(Debug)]
pub struct Activity {
    last: Mutex<Instant>,
}

impl Activity {
    /// Start the clock now
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record that bytes moved
    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Time since bytes last moved in either direction
    pub fn idle_for(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy from `source` to `dest` until end of stream.
///
/// Every chunk read refreshes `activity`. Returns the number of plain
/// bytes moved.
pub async fn pump(
    source: &mut dyn ChunkSource,
    dest: &mut dyn ChunkSink,
    stats: &TrafficStats,
    direction: Direction,
    activity: &Activity,
) -> Result<u64, TransportError> {
    let mut buf = vec![0u8; PUMP_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = source.read_chunk(&mut buf).await?;

        if n == 0 {
            let skipped = source.skipped_blocks();
            if skipped > 0 {
                debug!("{} dropped {} rejected blocks", direction, skipped);
            }
            if let Err(e) = dest.finish().await {
                debug!("Half-close after {} failed: {}", direction, e);
            }
            return Ok(total);
        }
        activity.touch();

        let written = dest.write_chunk(&buf[..n]).await?;
        if written != n {
            return Err(TransportError::ShortWrite {
                written,
                expected: n,
            });
        }

        stats.add(direction, n as u64);
        total += n as u64;
        trace!("Pumped {} bytes {}", n, direction);
    }
}

fn spawn_pump(
    mut source: BoxedSource,
    mut dest: BoxedSink,
    stats: Arc<TrafficStats>,
    direction: Direction,
    activity: Arc<Activity>,
) -> JoinHandle<Result<u64, TransportError>> {
    tokio::spawn(async move {
        pump(source.as_mut(), dest.as_mut(), &stats, direction, &activity).await
    })
}

/// Resolves once neither direction has moved bytes for `idle_timeout`
async fn idle_watchdog(activity: &Activity, idle_timeout: Duration) {
    loop {
        let idle = activity.idle_for();
        if idle >= idle_timeout {
            return;
        }
        tokio::time::sleep(idle_timeout - idle).await;
    }
}

fn join_result(
    result: Result<Result<u64, TransportError>, JoinError>,
) -> Result<u64, TransportError> {
    match result {
        Ok(result) => result,
        Err(e) => Err(TransportError::Task(e.to_string())),
    }
}

fn is_reset(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Io(e)
            if matches!(e.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe)
    )
}

/// Run both directions until each has finished.
///
/// Any failure in either direction, a peer reset included, aborts the
/// other and drops both connections. So does `idle_timeout` passing with
/// no bytes moving in either direction.
pub async fn relay(
    upstream: (BoxedSource, BoxedSink),
    downstream: (BoxedSource, BoxedSink),
    stats: Arc<TrafficStats>,
    idle_timeout: Duration,
) -> Result<RelaySummary, TransportError> {
    let activity = Arc::new(Activity::new());
    let mut up = spawn_pump(
        upstream.0,
        upstream.1,
        stats.clone(),
        Direction::Upstream,
        activity.clone(),
    );
    let mut down = spawn_pump(
        downstream.0,
        downstream.1,
        stats,
        Direction::Downstream,
        activity.clone(),
    );

    let finished = tokio::select! {
        r = &mut up => Some((join_result(r), Direction::Upstream)),
        r = &mut down => Some((join_result(r), Direction::Downstream)),
        _ = idle_watchdog(&activity, idle_timeout) => None,
    };

    let Some((first, direction)) = finished else {
        up.abort();
        down.abort();
        debug!("Relay idle for {:?}, closing", idle_timeout);
        return Err(TransportError::Timeout);
    };

    let first = match first {
        Ok(n) => n,
        Err(e) => {
            up.abort();
            down.abort();
            log_failure(direction, &e);
            return Err(e);
        }
    };

    let remaining = match direction {
        Direction::Upstream => &mut down,
        Direction::Downstream => &mut up,
    };
    let rest = tokio::select! {
        r = &mut *remaining => Some(join_result(r)),
        _ = idle_watchdog(&activity, idle_timeout) => None,
    };
    let rest = match rest {
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            log_failure(direction.opposite(), &e);
            return Err(e);
        }
        None => {
            remaining.abort();
            debug!("Relay {} idle for {:?}, closing", direction.opposite(), idle_timeout);
            return Err(TransportError::Timeout);
        }
    };

    Ok(match direction {
        Direction::Upstream => RelaySummary {
            upstream: first,
            downstream: rest,
        },
        Direction::Downstream => RelaySummary {
            upstream: rest,
            downstream: first,
        },
    })
}

fn log_failure(direction: Direction, err: &TransportError) {
    if is_reset(err) {
        trace!("Relay {} reset by peer: {}", direction, err);
    } else {
        debug!("Relay {} failed: {}", direction, err);
    }
}
