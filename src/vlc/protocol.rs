//! VLC rc (remote control) interface protocol.
//!
//! Commands are single text lines; replies are zero or more text lines,
//! optionally prefixed by the `> ` prompt.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Prompt marker VLC prints in front of replies.
const PROMPT: &str = "> ";

/// Number of lines the `status` command answers with.
pub const STATUS_LINES: usize = 3;

/// Default substituted for integer replies that fail to parse.
pub const LENIENT_DEFAULT: i64 = 0;

/// Command sent to VLC over the rc socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcCommand {
  Play,
  Add(String),
  Pause,
  Seek(i64),
  Stop,
  Frame,
  Next,
  Prev,
  Fullscreen,
  Shutdown,
  GetTitle,
  GetTime,
  GetLength,
  IsPlaying,
  Volume,
  SetVolume(i64),
  Status,
}

impl RcCommand {
  /// Number of reply lines the command produces.
  pub fn reply_lines(&self) -> usize {
    match self {
      RcCommand::GetTitle
      | RcCommand::GetTime
      | RcCommand::GetLength
      | RcCommand::IsPlaying
      | RcCommand::Volume => 1,
      RcCommand::Status => STATUS_LINES,
      _ => 0,
    }
  }

  pub fn expects_reply(&self) -> bool {
    self.reply_lines() > 0
  }
}

impl fmt::Display for RcCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RcCommand::Play => f.write_str("play"),
      RcCommand::Add(uri) => write!(f, "add {}", uri),
      RcCommand::Pause => f.write_str("pause"),
      RcCommand::Seek(seconds) => write!(f, "seek {}", seconds),
      RcCommand::Stop => f.write_str("stop"),
      RcCommand::Frame => f.write_str("frame"),
      RcCommand::Next => f.write_str("next"),
      RcCommand::Prev => f.write_str("prev"),
      RcCommand::Fullscreen => f.write_str("fullscreen"),
      RcCommand::Shutdown => f.write_str("shutdown"),
      RcCommand::GetTitle => f.write_str("get_title"),
      RcCommand::GetTime => f.write_str("get_time"),
      RcCommand::GetLength => f.write_str("get_length"),
      RcCommand::IsPlaying => f.write_str("is_playing"),
      RcCommand::Volume => f.write_str("volume"),
      RcCommand::SetVolume(level) => write!(f, "volume {}", level),
      RcCommand::Status => f.write_str("status"),
    }
  }
}

/// Strip line terminators and any leading prompt markers from a reply.
pub fn strip_prompt(line: &str) -> &str {
  let mut line = line.trim_end_matches(['\r', '\n']);
  while let Some(rest) = line.strip_prefix(PROMPT) {
    line = rest;
  }
  line
}

/// Parse an integer reply. `None` means the reply was not a number.
pub fn parse_int(reply: &str) -> Option<i64> {
  reply.trim().parse().ok()
}

/// Parse an integer reply, substituting [`LENIENT_DEFAULT`] on failure.
///
/// A `0` result is ambiguous: it is returned both for a genuine zero and
/// for an unparseable reply. Use [`parse_int`] to tell them apart.
pub fn parse_int_lenient(reply: &str) -> i64 {
  parse_int(reply).unwrap_or(LENIENT_DEFAULT)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatusError {
  #[error("Status line {index} does not match the {field} pattern: {line:?}")]
  LineMismatch {
    index: usize,
    field: StatusField,
    line: String,
  },
}

/// Fields of the `status` reply, in the order VLC prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
  Media,
  Volume,
  State,
}

impl StatusField {
  fn pattern(self) -> &'static Regex {
    static MEDIA_RE: OnceLock<Regex> = OnceLock::new();
    static VOLUME_RE: OnceLock<Regex> = OnceLock::new();
    static STATE_RE: OnceLock<Regex> = OnceLock::new();
    let (cell, pattern) = match self {
      StatusField::Media => (&MEDIA_RE, r"new input: file://(\S+)"),
      StatusField::Volume => (&VOLUME_RE, r"audio volume: (\d+)"),
      StatusField::State => (&STATE_RE, r"state (\w+)"),
    };
    cell.get_or_init(|| Regex::new(pattern).expect("status regex should compile"))
  }

  fn capture(self, index: usize, line: &str) -> Result<String, StatusError> {
    self
      .pattern()
      .captures(line)
      .and_then(|caps| caps.get(1))
      .map(|m| m.as_str().to_string())
      .ok_or_else(|| StatusError::LineMismatch {
        index,
        field: self,
        line: line.to_string(),
      })
  }
}

impl fmt::Display for StatusField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StatusField::Media => f.write_str("media"),
      StatusField::Volume => f.write_str("volume"),
      StatusField::State => f.write_str("state"),
    }
  }
}

/// Playback state word reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
  Playing,
  Paused,
  Stopped,
  Other(String),
}

impl From<&str> for PlaybackState {
  fn from(word: &str) -> Self {
    match word {
      "playing" => PlaybackState::Playing,
      "paused" => PlaybackState::Paused,
      "stopped" => PlaybackState::Stopped,
      other => PlaybackState::Other(other.to_string()),
    }
  }
}

/// Decoded `status` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
  /// Path of the current input, without the `file://` scheme.
  pub media: String,
  pub volume: u32,
  pub state: PlaybackState,
}

impl StatusReply {
  /// Decode the three status lines positionally: media, volume, state.
  pub fn parse<S: AsRef<str>>(lines: &[S; STATUS_LINES]) -> Result<Self, StatusError> {
    let media = StatusField::Media.capture(0, lines[0].as_ref())?;
    let volume_digits = StatusField::Volume.capture(1, lines[1].as_ref())?;
    let state = StatusField::State.capture(2, lines[2].as_ref())?;

    // The pattern only admits digits; overflow is the one way this fails.
    let volume = volume_digits
      .parse()
      .map_err(|_| StatusError::LineMismatch {
        index: 1,
        field: StatusField::Volume,
        line: lines[1].as_ref().to_string(),
      })?;

    Ok(Self {
      media,
      volume,
      state: PlaybackState::from(state.as_str()),
    })
  }
}

/// Percentage of `length` elapsed at `time`, 0 when the length is unknown.
///
/// A percentage outside the `i64` range reads as [`LENIENT_DEFAULT`].
pub fn progress_percent(time: i64, length: i64) -> i64 {
  if length == 0 {
    return LENIENT_DEFAULT;
  }
  let percent = i128::from(time) * 100 / i128::from(length);
  i64::try_from(percent).unwrap_or(LENIENT_DEFAULT)
}
