//! TCP connection to the VLC rc interface.
//!
//! The rc protocol is strictly request/reply: one command line out, then a
//! known number of reply lines back. The socket is opened on first use and
//! reused for every later command.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::protocol::strip_prompt;
use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum ConnectionError {
  #[error("rc interface unavailable at {addr}: {source}")]
  Unavailable {
    addr: String,
    #[source]
    source: io::Error,
  },
  #[error("No reply within {0:?}")]
  Timeout(Duration),
  #[error("Connection closed by VLC")]
  Closed,
  #[error("Socket error: {0}")]
  Io(#[from] io::Error),
}

struct Stream {
  reader: BufReader<OwnedReadHalf>,
  writer: OwnedWriteHalf,
}

/// Connection to a VLC rc socket.
///
/// Methods take `&mut self`, so one command is in flight at a time. Share a
/// connection between tasks by wrapping it in a mutex.
pub struct Connection {
  addr: String,
  read_timeout: Option<Duration>,
  stream: Option<Stream>,
}

impl Connection {
  pub fn new(host: &str, port: u16) -> Self {
    Self {
      addr: format!("{}:{}", host, port),
      read_timeout: None,
      stream: None,
    }
  }

  pub fn from_config(config: &PlayerConfig) -> Self {
    Self {
      addr: config.rc_address(),
      read_timeout: config.read_timeout(),
      stream: None,
    }
  }

  /// Bound every reply read (and the initial connect) by `timeout`.
  pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.read_timeout = timeout;
    self
  }

  pub fn addr(&self) -> &str {
    &self.addr
  }

  pub fn is_open(&self) -> bool {
    self.stream.is_some()
  }

  /// Open the socket now instead of on the first command.
  pub async fn open(&mut self) -> Result<(), ConnectionError> {
    self.stream().await.map(|_| ())
  }

  /// Open the socket, retrying while VLC is still binding its rc port.
  pub async fn open_with_retry(&mut self, retry_count: u32) -> Result<(), ConnectionError> {
    let mut last_error = None;

    for attempt in 0..retry_count {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
      }

      match self.open().await {
        Ok(()) => return Ok(()),
        Err(e) => {
          log::debug!("rc connect attempt {} failed: {}", attempt + 1, e);
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| ConnectionError::Unavailable {
      addr: self.addr.clone(),
      source: io::Error::new(io::ErrorKind::NotConnected, "no connection attempts made"),
    }))
  }

  /// Drop the socket. The next command reconnects.
  pub fn close(&mut self) {
    if self.stream.take().is_some() {
      log::info!("Closed rc connection to {}", self.addr);
    }
  }

  /// Write `command` as one line. When `expect_reply` is set, wait for the
  /// next line and return it with the prompt stripped.
  pub async fn send(
    &mut self,
    command: &str,
    expect_reply: bool,
  ) -> Result<Option<String>, ConnectionError> {
    log::debug!("Sending rc command: {}", command);
    let written = self.write_line(command).await;
    if let Err(e) = written {
      self.close();
      return Err(e);
    }

    if !expect_reply {
      return Ok(None);
    }

    let line = self.read_line().await?;
    Ok(Some(strip_prompt(&line).to_string()))
  }

  /// Wait for the next line and return it without its terminator.
  pub async fn read_line(&mut self) -> Result<String, ConnectionError> {
    let result = self.try_read_line().await;
    if let Err(e) = &result {
      log::warn!("rc read from {} failed: {}", self.addr, e);
      // A late reply would desynchronise every later command.
      self.close();
    }
    result
  }

  async fn try_read_line(&mut self) -> Result<String, ConnectionError> {
    let timeout = self.read_timeout;
    let stream = self.stream().await?;
    let mut line = String::new();
    let read = stream.reader.read_line(&mut line);
    let outcome = match timeout {
      Some(limit) => tokio::time::timeout(limit, read)
        .await
        .map_err(|_| ConnectionError::Timeout(limit))?,
      None => read.await,
    };
    match outcome? {
      0 => Err(ConnectionError::Closed),
      _ => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
    }
  }

  async fn write_line(&mut self, command: &str) -> Result<(), ConnectionError> {
    let stream = self.stream().await?;
    stream.writer.write_all(command.as_bytes()).await?;
    stream.writer.write_all(b"\n").await?;
    stream.writer.flush().await?;
    Ok(())
  }

  async fn stream(&mut self) -> Result<&mut Stream, ConnectionError> {
    if self.stream.is_none() {
      let stream = self.connect().await?;
      let (reader, writer) = stream.into_split();
      self.stream = Some(Stream {
        reader: BufReader::new(reader),
        writer,
      });
    }
    self.stream.as_mut().ok_or(ConnectionError::Closed)
  }

  async fn connect(&self) -> Result<TcpStream, ConnectionError> {
    let connect = TcpStream::connect(&self.addr);
    let result = match self.read_timeout {
      Some(limit) => tokio::time::timeout(limit, connect)
        .await
        .map_err(|_| ConnectionError::Timeout(limit))?,
      None => connect.await,
    };

    let stream = result.map_err(|source| ConnectionError::Unavailable {
      addr: self.addr.clone(),
      source,
    })?;
    log::info!("Connected to rc interface at {}", self.addr);
    Ok(stream)
  }
}
