//! Outbound socket protection
//!
//! On hosts where this process runs underneath a VPN service, outbound
//! sockets must be handed to that service first so their traffic bypasses
//! the tunnel instead of looping back into it.

use std::io;

/// Called with every outbound socket before it connects
pub trait SocketProtector: Send + Sync {
    fn protect(&self, socket: &socket2::Socket) -> io::Result<()>;
}

/// Leaves sockets untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProtection;

impl SocketProtector for NoProtection {
    fn protect(&self, _socket: &socket2::Socket) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
pub use unix::UnixSocketProtector;

#[cfg(unix)]
mod unix {
    use super::SocketProtector;
    use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
    use std::io::{self, IoSlice, Read};
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;
    use std::time::Duration;
    use tracing::debug;

    /// Passes the descriptor over a Unix socket with `SCM_RIGHTS` and waits
    /// for the service to acknowledge.
    ///
    /// If nothing listens on the path the socket is left unprotected.
    #[derive(Debug, Clone)]
    pub struct UnixSocketProtector {
        path: PathBuf,
        ack_timeout: Duration,
    }

    impl UnixSocketProtector {
        pub fn new(path: impl Into<PathBuf>, ack_timeout: Duration) -> Self {
            Self {
                path: path.into(),
                ack_timeout,
            }
        }
    }

    impl SocketProtector for UnixSocketProtector {
        fn protect(&self, socket: &socket2::Socket) -> io::Result<()> {
            let mut channel = match UnixStream::connect(&self.path) {
                Ok(channel) => channel,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!("No protect service at {}: {}", self.path.display(), e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            channel.set_read_timeout(Some(self.ack_timeout))?;
            send_fd(&channel, socket.as_raw_fd())?;

            let mut ack = [0u8; 1024];
            if channel.read(&mut ack)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "protect service closed without acknowledging",
                ));
            }
            debug!("Socket {} protected", socket.as_raw_fd());
            Ok(())
        }
    }

    /// Send one descriptor as `SCM_RIGHTS` ancillary data
    fn send_fd(channel: &UnixStream, fd: RawFd) -> io::Result<()> {
        let payload = [0u8; 1];
        let iov = [IoSlice::new(&payload)];
        let fds = [fd];
        let cmsgs = [ControlMessage::ScmRights(&fds)];

        sendmsg::<()>(channel.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)?;
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Write;
        use std::os::unix::net::UnixListener;

        fn tcp_socket() -> socket2::Socket {
            socket2::Socket::new(
                socket2::Domain::IPV4,
                socket2::Type::STREAM,
                Some(socket2::Protocol::TCP),
            )
            .unwrap()
        }

        #[test]
        fn test_missing_service_is_ignored() {
            let protector = UnixSocketProtector::new(
                "/nonexistent/protect_path",
                Duration::from_millis(100),
            );
            assert!(protector.protect(&tcp_socket()).is_ok());
        }

        #[test]
        fn test_descriptor_handed_over() {
            let path = std::env::temp_dir()
                .join(format!("sudoku-protect-{}.sock", std::process::id()));
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).unwrap();

            let service = std::thread::spawn(move || {
                let (mut conn, _) = listener.accept().unwrap();
                let mut byte = [0u8; 1];
                let n = conn.read(&mut byte).unwrap();
                conn.write_all(b"ok").unwrap();
                n
            });

            let protector = UnixSocketProtector::new(&path, Duration::from_secs(5));
            protector.protect(&tcp_socket()).unwrap();

            assert_eq!(service.join().unwrap(), 1);
            let _ = std::fs::remove_file(&path);
        }

        #[test]
        fn test_closed_channel_is_not_an_ack() {
            let path = std::env::temp_dir()
                .join(format!("sudoku-protect-eof-{}.sock", std::process::id()));
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).unwrap();

            let service = std::thread::spawn(move || {
                let (mut conn, _) = listener.accept().unwrap();
                let mut byte = [0u8; 1];
                let _ = conn.read(&mut byte);
                drop(conn);
            });

            let protector = UnixSocketProtector::new(&path, Duration::from_secs(5));
            let err = protector.protect(&tcp_socket()).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

            service.join().unwrap();
            let _ = std::fs::remove_file(&path);
        }

        #[test]
        fn test_missing_ack_times_out() {
            let path = std::env::temp_dir()
                .join(format!("sudoku-protect-silent-{}.sock", std::process::id()));
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).unwrap();

            let service = std::thread::spawn(move || {
                let (conn, _) = listener.accept().unwrap();
                std::thread::sleep(Duration::from_millis(300));
                drop(conn);
            });

            let protector = UnixSocketProtector::new(&path, Duration::from_millis(50));
            assert!(protector.protect(&tcp_socket()).is_err());

            service.join().unwrap();
            let _ = std::fs::remove_file(&path);
        }
    }
}
