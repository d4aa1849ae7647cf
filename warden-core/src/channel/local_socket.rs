//! Fire-and-forget local administrative endpoint.
//!
//! Some servers only expose a socket or FIFO on the host (for example a
//! systemd `ListenFIFO=` unit). Commands are written as one line each and
//! nothing is read back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::channel::rcon::DEFAULT_TIMEOUT;
use crate::channel::{ControlChannel, Reply};
use crate::error::WardenError;

#[derive(Debug, Clone)]
pub struct LocalSocketChannel {
    path: PathBuf,
}

impl LocalSocketChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, line: &[u8]) -> Result<Reply, WardenError> {
        let mut options = tokio::fs::OpenOptions::new();
        options.append(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let metadata = tokio::fs::metadata(&self.path).await?;
            if metadata.file_type().is_socket() {
                let mut stream = tokio::net::UnixStream::connect(&self.path).await?;
                stream.write_all(line).await?;
                stream.shutdown().await?;
                return Ok(Reply::Delivered);
            }
            // A FIFO nobody reads from would block the open indefinitely.
            options.custom_flags(libc::O_NONBLOCK);
        }

        let mut file = match options.open(&self.path).await {
            Ok(file) => file,
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                debug!("no reader on {}; dropping command", self.path.display());
                return Ok(Reply::Unavailable);
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(line).await?;
        file.flush().await?;
        Ok(Reply::Delivered)
    }
}

#[async_trait]
impl ControlChannel for LocalSocketChannel {
    async fn open(&mut self) -> Result<(), WardenError> {
        Ok(())
    }

    /// Write `command` followed by a newline. A missing path, or a FIFO
    /// with no reader, is not an error: nothing is sent and
    /// [`Reply::Unavailable`] is returned.
    async fn send_command(&mut self, command: &str) -> Result<Reply, WardenError> {
        if !self.is_enabled() {
            debug!("socket {} missing; dropping command", self.path.display());
            return Ok(Reply::Unavailable);
        }

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');

        tokio::time::timeout(DEFAULT_TIMEOUT, self.write_line(&line))
            .await
            .map_err(|_| {
                WardenError::Connection(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("write to {} timed out", self.path.display()),
                ))
            })?
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        self.is_enabled()
    }

    fn is_enabled(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("warden-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn missing_path_is_unavailable() {
        let mut channel = LocalSocketChannel::new(scratch_path("missing.socket"));
        assert!(!channel.is_enabled());
        channel.open().await.unwrap();
        let reply = channel.send_command("save").await.unwrap();
        assert_eq!(reply, Reply::Unavailable);
    }

    #[tokio::test]
    async fn writes_one_line_per_command() {
        let path = scratch_path("commands.fifo");
        std::fs::write(&path, b"").unwrap();

        let mut channel = LocalSocketChannel::new(&path);
        assert!(channel.is_enabled());
        assert_eq!(channel.send_command("save").await.unwrap(), Reply::Delivered);
        assert_eq!(
            channel.send_command("say bye").await.unwrap(),
            Reply::Delivered
        );

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "save\nsay bye\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fifo_without_reader_is_unavailable() {
        let path = scratch_path("idle.fifo");
        let _ = std::fs::remove_file(&path);
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        // SAFETY: c_path is a valid NUL-terminated string for the call.
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let mut channel = LocalSocketChannel::new(&path);
        assert!(channel.is_enabled());
        let reply = channel.send_command("save").await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(reply, Reply::Unavailable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fifo_with_reader_receives_line() {
        use std::io::Read;
        use std::os::unix::fs::OpenOptionsExt;

        let path = scratch_path("listened.fifo");
        let _ = std::fs::remove_file(&path);
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        // SAFETY: c_path is a valid NUL-terminated string for the call.
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        // Opening the read end non-blocking succeeds without a writer.
        let mut reader = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();

        let mut channel = LocalSocketChannel::new(&path);
        assert_eq!(channel.send_command("save").await.unwrap(), Reply::Delivered);

        let mut received = [0u8; 16];
        let n = reader.read(&mut received).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(&received[..n], b"save\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writes_to_unix_socket() {
        use tokio::io::AsyncReadExt;

        let path = scratch_path("admin.socket");
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            stream.read_to_string(&mut received).await.unwrap();
            received
        });

        let mut channel = LocalSocketChannel::new(&path);
        assert_eq!(channel.send_command("quit").await.unwrap(), Reply::Delivered);
        assert_eq!(reader.await.unwrap(), "quit\n");
        std::fs::remove_file(&path).unwrap();
    }
}
