//! Line-oriented link over any async byte stream, usually a USB serial port

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Duration};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

use super::{Link, DEFAULT_REPLY_TIMEOUT_MS, START_REMOTE_COMMAND, STOP_REMOTE_COMMAND};
use crate::error::{AltosError, Result};

/// Default baud rate; USB CDC devices ignore it
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC (TeleDongle, TeleMetrum, TeleMega)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Link over a buffered async stream
pub struct SerialLink<S> {
    stream: BufReader<S>,
    /// Bytes of a reply line not yet terminated; survives a timeout
    pending: Vec<u8>,
    device_path: String,
    reply_timeout_ms: u64,
    remote: bool,
}

impl<S> std::fmt::Debug for SerialLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl<S> SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream
    pub fn new(stream: S, device_path: impl Into<String>) -> Self {
        Self {
            stream: BufReader::new(stream),
            pending: Vec::new(),
            device_path: device_path.into(),
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            remote: false,
        }
    }

    pub fn with_reply_timeout(mut self, timeout_ms: u64) -> Self {
        self.reply_timeout_ms = timeout_ms;
        self
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    async fn write_text(&mut self, text: &str) -> Result<()> {
        self.stream
            .write_all(text.as_bytes())
            .await
            .map_err(|e| AltosError::Serial(format!("Failed to write to {}: {}", self.device_path, e)))?;
        trace!("-> {:?}", text);
        Ok(())
    }
}

impl SerialLink<tokio_serial::SerialStream> {
    /// Open the first device that answers, trying the usual paths
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use altos_decode::link::SerialLink;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let link = SerialLink::open(115_200)?;
    ///     println!("Connected to: {}", link.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the first of `paths` that succeeds
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened device at {}", path);
                    return Ok(Self::new(port, *path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(AltosError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| AltosError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

#[async_trait]
impl<S> Link for SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn printf(&mut self, text: &str) -> Result<()> {
        self.write_text(text).await
    }

    async fn get_reply_no_dialog(&mut self, timeout_ms: u64) -> Result<Option<String>> {
        let read = self.stream.read_until(b'\n', &mut self.pending);
        match timeout(Duration::from_millis(timeout_ms), read).await {
            Err(_) => {
                debug!(
                    "No reply from {} within {} ms ({} bytes pending)",
                    self.device_path,
                    timeout_ms,
                    self.pending.len()
                );
                Ok(None)
            }
            Ok(Ok(0)) if self.pending.is_empty() => Ok(None),
            Ok(Ok(_)) => {
                let bytes = std::mem::take(&mut self.pending);
                let reply = String::from_utf8_lossy(&bytes)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                trace!("<- {:?}", reply);
                Ok(Some(reply))
            }
            Ok(Err(e)) => Err(AltosError::Serial(format!(
                "Failed to read from {}: {}",
                self.device_path, e
            ))),
        }
    }

    async fn flush_output(&mut self) -> Result<()> {
        self.stream
            .flush()
            .await
            .map_err(|e| AltosError::Serial(format!("Failed to flush {}: {}", self.device_path, e)))
    }

    async fn start_remote(&mut self) -> Result<()> {
        self.write_text(START_REMOTE_COMMAND).await?;
        self.flush_output().await?;
        self.remote = true;
        debug!("Remote session started on {}", self.device_path);
        Ok(())
    }

    async fn stop_remote(&mut self) -> Result<()> {
        self.write_text(STOP_REMOTE_COMMAND).await?;
        self.flush_output().await?;
        self.remote = false;
        debug!("Remote session stopped on {}", self.device_path);
        Ok(())
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    fn reply_timeout_ms(&self) -> u64 {
        self.reply_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = SerialLink::open_with_paths(invalid_paths, DEFAULT_BAUD_RATE);

        match result.unwrap_err() {
            AltosError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = SerialLink::open_port("/dev/nonexistent_serial_device_12345", DEFAULT_BAUD_RATE);
        match result.unwrap_err() {
            AltosError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_lines_trimmed() {
        let mock = Builder::new().read(b"flight 1\r\ndone\n").build();
        let mut link = SerialLink::new(mock, "mock");

        assert_eq!(link.get_reply_no_dialog(100).await.unwrap(), Some("flight 1".to_string()));
        assert_eq!(link.get_reply_no_dialog(100).await.unwrap(), Some("done".to_string()));
        assert_eq!(link.get_reply_no_dialog(100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reply_timeout_returns_none() {
        let mock = Builder::new().wait(Duration::from_millis(300)).read(b"late\n").build();
        let mut link = SerialLink::new(mock, "mock");

        assert_eq!(link.get_reply_no_dialog(20).await.unwrap(), None);
        // The late line is still delivered to the next read
        assert_eq!(link.get_reply_no_dialog(2000).await.unwrap(), Some("late".to_string()));
    }

    #[tokio::test]
    async fn test_line_split_across_timeout_kept_whole() {
        let mock = Builder::new()
            .read(b"flig")
            .wait(Duration::from_millis(300))
            .read(b"ht 1 start 0 end 4\n")
            .build();
        let mut link = SerialLink::new(mock, "mock");

        assert_eq!(link.get_reply_no_dialog(50).await.unwrap(), None);
        assert_eq!(
            link.get_reply_no_dialog(2000).await.unwrap(),
            Some("flight 1 start 0 end 4".to_string())
        );
    }

    #[tokio::test]
    async fn test_unterminated_line_at_eof() {
        let mock = Builder::new().read(b"done").build();
        let mut link = SerialLink::new(mock, "mock");

        assert_eq!(link.get_reply_no_dialog(100).await.unwrap(), Some("done".to_string()));
        assert_eq!(link.get_reply_no_dialog(100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_session_commands() {
        let mock = Builder::new().write(b"p\nE 0\n").write(b"~").build();
        let mut link = SerialLink::new(mock, "mock");

        assert!(!link.is_remote());
        link.start_remote().await.unwrap();
        assert!(link.is_remote());
        link.stop_remote().await.unwrap();
        assert!(!link.is_remote());
    }

    #[tokio::test]
    async fn test_adc_skips_to_tick_line() {
        let mock = Builder::new()
            .write(b"a\n")
            .read(b"a\n")
            .read(b"tick: 100 accel: 1500 pres: 20000\n")
            .build();
        let mut link = SerialLink::new(mock, "mock");

        let items = link.adc().await.unwrap();
        assert_eq!(items, vec!["tick:", "100", "accel:", "1500", "pres:", "20000"]);
    }

    #[tokio::test]
    async fn test_adc_timeout() {
        let mock = Builder::new().write(b"a\n").read(b"a\n").build();
        let mut link = SerialLink::new(mock, "mock").with_reply_timeout(100);

        let result = link.adc().await;
        assert!(matches!(result, Err(AltosError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_write_error_maps_to_serial() {
        let mock = Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut link = SerialLink::new(mock, "mock");

        match link.printf("l\n").await {
            Err(AltosError::Serial(msg)) => assert!(msg.contains("mock")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }
}
