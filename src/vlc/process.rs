//! VLC binary detection and process spawning.
//!
//! Everything platform-specific about launching VLC lives in a
//! [`LaunchStrategy`], picked once from the detected [`Platform`].

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use thiserror::Error;

use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("VLC executable not found: {0:?}")]
  NotFound(PathBuf),
  #[error("Failed to spawn VLC {program:?}: {source}")]
  SpawnFailed {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to open null device {device}: {source}")]
  NullDevice {
    device: &'static str,
    #[source]
    source: std::io::Error,
  },
}

/// Application-bundle executable used on macOS regardless of headless mode.
pub const MACOS_BUNDLE_EXECUTABLE: &str = "/Applications/VLC.app/Contents/MacOS/VLC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
  Windows,
  MacOs,
  Unix,
}

impl Platform {
  pub fn current() -> Self {
    if cfg!(windows) {
      Platform::Windows
    } else if cfg!(target_os = "macos") {
      Platform::MacOs
    } else {
      Platform::Unix
    }
  }
}

/// How VLC is launched on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchStrategy {
  pub platform: Platform,
  /// Binary for the GUI-capable player.
  pub gui_binary: &'static str,
  /// Binary for the interface-less player.
  pub headless_binary: &'static str,
  /// Device the three standard streams are redirected to.
  pub null_device: &'static str,
  /// Detached players get their own process group.
  pub supports_process_group: bool,
  /// The parent can watch an attached player for exit.
  pub supports_child_exit_notification: bool,
}

impl LaunchStrategy {
  pub fn for_platform(platform: Platform) -> Self {
    match platform {
      Platform::Windows => Self {
        platform,
        gui_binary: "vlc",
        headless_binary: "cvlc",
        null_device: "NUL",
        supports_process_group: false,
        supports_child_exit_notification: false,
      },
      Platform::Unix => Self {
        platform,
        gui_binary: "vlc",
        headless_binary: "cvlc",
        null_device: "/dev/null",
        supports_process_group: true,
        supports_child_exit_notification: true,
      },
      Platform::MacOs => Self {
        platform,
        gui_binary: MACOS_BUNDLE_EXECUTABLE,
        headless_binary: MACOS_BUNDLE_EXECUTABLE,
        null_device: "/dev/null",
        supports_process_group: true,
        supports_child_exit_notification: true,
      },
    }
  }

  pub fn current() -> Self {
    Self::for_platform(Platform::current())
  }

  pub fn binary(&self, headless: bool) -> &'static str {
    if headless {
      self.headless_binary
    } else {
      self.gui_binary
    }
  }

  /// Build the full invocation for `config`.
  pub fn invocation(&self, config: &PlayerConfig, detached: bool) -> Invocation {
    let program = match config.vlc_path.as_deref().filter(|p| !p.is_empty()) {
      Some(path) => PathBuf::from(path),
      None => self.resolve_binary(self.binary(config.headless)),
    };

    let mut args = vec![
      "--extraintf".to_string(),
      "rc".to_string(),
      "--rc-host".to_string(),
      config.rc_address(),
    ];
    args.extend(config.extra_args.iter().cloned());

    Invocation {
      program,
      args,
      null_device: self.null_device,
      new_process_group: detached && self.supports_process_group,
    }
  }

  /// Find `name` on PATH, then in common install locations. Falls back to
  /// the bare name so a missing binary fails at spawn time.
  fn resolve_binary(&self, name: &str) -> PathBuf {
    if Path::new(name).is_absolute() {
      return PathBuf::from(name);
    }

    if let Ok(path) = which::which(name) {
      return path;
    }

    let common_paths: &[&str] = match self.platform {
      Platform::Windows => &[
        r"C:\Program Files\VideoLAN\VLC\vlc.exe",
        r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe",
      ],
      Platform::Unix => &["/usr/bin", "/usr/local/bin", "/snap/bin"],
      Platform::MacOs => &[],
    };

    for base in common_paths {
      let candidate = match self.platform {
        Platform::Windows => PathBuf::from(base),
        _ => Path::new(base).join(name),
      };
      if candidate.exists() {
        return candidate;
      }
    }

    PathBuf::from(name)
  }
}

/// A fully-resolved VLC command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub null_device: &'static str,
  pub new_process_group: bool,
}

impl Invocation {
  /// Launch the process with all standard streams on the null device.
  pub fn spawn(&self) -> Result<Child, ProcessError> {
    log::info!(
      "Spawning VLC: {:?} {:?} (stdio -> {}, new process group: {})",
      self.program,
      self.args,
      self.null_device,
      self.new_process_group
    );

    let mut cmd = Command::new(&self.program);
    cmd
      .args(&self.args)
      .stdin(self.null_stdio()?)
      .stdout(self.null_stdio()?)
      .stderr(self.null_stdio()?);

    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      if self.new_process_group {
        cmd.process_group(0);
      }
    }

    cmd.spawn().map_err(|source| {
      if source.kind() == std::io::ErrorKind::NotFound {
        ProcessError::NotFound(self.program.clone())
      } else {
        ProcessError::SpawnFailed {
          program: self.program.clone(),
          source,
        }
      }
    })
  }

  fn null_stdio(&self) -> Result<Stdio, ProcessError> {
    OpenOptions::new()
      .read(true)
      .write(true)
      .open(self.null_device)
      .map(Stdio::from)
      .map_err(|source| ProcessError::NullDevice {
        device: self.null_device,
        source,
      })
  }
}
