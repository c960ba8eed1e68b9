//! High-level VLC client with command methods.

use std::fmt;

use thiserror::Error;

use super::connection::{Connection, ConnectionError};
use super::process::ProcessError;
use super::protocol::{
  parse_int, parse_int_lenient, progress_percent, RcCommand, StatusError, StatusReply,
  STATUS_LINES,
};
use crate::config::{ConfigError, PlayerConfig};

#[derive(Error, Debug)]
pub enum VlcError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Connection error: {0}")]
  Connection(#[from] ConnectionError),
  #[error("Malformed status reply: {0}")]
  Status(#[from] StatusError),
  #[error("Config error: {0}")]
  Config(#[from] ConfigError),
}

/// Playback control over an rc [`Connection`].
///
/// Numeric queries are lenient: a reply that is not an integer reads as 0.
pub struct VlcClient {
  conn: Connection,
}

impl VlcClient {
  pub fn new(conn: Connection) -> Self {
    Self { conn }
  }

  pub fn from_config(config: &PlayerConfig) -> Self {
    Self::new(Connection::from_config(config))
  }

  pub fn connection(&mut self) -> &mut Connection {
    &mut self.conn
  }

  async fn execute(&mut self, cmd: RcCommand) -> Result<(), VlcError> {
    self.conn.send(&cmd.to_string(), false).await?;
    Ok(())
  }

  async fn query(&mut self, cmd: RcCommand) -> Result<String, VlcError> {
    let reply = self.conn.send(&cmd.to_string(), true).await?;
    Ok(reply.unwrap_or_default())
  }

  /// Resume the current media.
  pub async fn play(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Play).await
  }

  /// Enqueue `uri` and start playing it.
  pub async fn add(&mut self, uri: &str) -> Result<(), VlcError> {
    log::info!("Adding media: {}", uri);
    self.execute(RcCommand::Add(uri.to_string())).await
  }

  /// Toggle pause.
  pub async fn pause(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Pause).await
  }

  /// Seek to absolute position in seconds.
  pub async fn seek(&mut self, seconds: i64) -> Result<(), VlcError> {
    self.execute(RcCommand::Seek(seconds)).await
  }

  pub async fn stop(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Stop).await
  }

  /// Advance one frame.
  pub async fn frame(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Frame).await
  }

  pub async fn next(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Next).await
  }

  pub async fn prev(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Prev).await
  }

  pub async fn toggle_fullscreen(&mut self) -> Result<(), VlcError> {
    self.execute(RcCommand::Fullscreen).await
  }

  /// Ask VLC to quit. The socket is dropped afterwards.
  pub async fn shutdown(&mut self) -> Result<(), VlcError> {
    let result = self.execute(RcCommand::Shutdown).await;
    self.conn.close();
    result
  }

  pub async fn title(&mut self) -> Result<String, VlcError> {
    self.query(RcCommand::GetTitle).await
  }

  /// Elapsed seconds, 0 if the reply is not a number.
  pub async fn time(&mut self) -> Result<i64, VlcError> {
    let reply = self.query(RcCommand::GetTime).await?;
    Ok(parse_int_lenient(&reply))
  }

  /// Media length in seconds, 0 if the reply is not a number.
  pub async fn length(&mut self) -> Result<i64, VlcError> {
    let reply = self.query(RcCommand::GetLength).await?;
    Ok(parse_int_lenient(&reply))
  }

  /// Percentage played, 0 when the length is unknown.
  pub async fn progress(&mut self) -> Result<i64, VlcError> {
    let time = self.time().await?;
    let length = self.length().await?;
    Ok(progress_percent(time, length))
  }

  pub async fn is_playing(&mut self) -> Result<bool, VlcError> {
    let reply = self.query(RcCommand::IsPlaying).await?;
    Ok(reply.trim() == "1")
  }

  /// Current volume, 0 if the reply is not a number.
  pub async fn volume(&mut self) -> Result<i64, VlcError> {
    let reply = self.query(RcCommand::Volume).await?;
    Ok(parse_int_lenient(&reply))
  }

  /// Set the volume. A level that is not an integer is ignored: nothing is
  /// sent and `Ok(None)` is returned.
  pub async fn set_volume(&mut self, level: impl fmt::Display) -> Result<Option<i64>, VlcError> {
    let raw = level.to_string();
    let Some(level) = parse_int(&raw) else {
      log::debug!("Ignoring invalid volume level {:?}", raw);
      return Ok(None);
    };
    self.execute(RcCommand::SetVolume(level)).await?;
    Ok(Some(level))
  }

  /// Query `status` and decode its three lines (media, volume, state).
  pub async fn status(&mut self) -> Result<StatusReply, VlcError> {
    self.conn.send(&RcCommand::Status.to_string(), false).await?;
    let mut lines: [String; STATUS_LINES] = Default::default();
    for line in lines.iter_mut() {
      *line = self.conn.read_line().await?;
    }
    Ok(StatusReply::parse(&lines)?)
  }
}
