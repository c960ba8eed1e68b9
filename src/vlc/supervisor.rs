//! VLC process lifecycle.
//!
//! A [`Supervisor`] owns at most one VLC process. Attached players are
//! stopped when the supervisor is dropped or the host is interrupted, and
//! are watched for exit; daemonized players are left alone until an
//! explicit [`Supervisor::stop`].

use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::process::{LaunchStrategy, ProcessError};
use crate::config::PlayerConfig;

/// Lifecycle events kept for a consumer that is not reading. Later events
/// are dropped until there is room again.
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
  Stopped,
  /// Attached: stopped along with the host.
  Running,
  /// Detached: outlives the host.
  Daemonized,
}

/// Lifecycle notifications, delivered through [`Supervisor::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
  Started { pid: u32, detached: bool },
  Stopped { pid: u32 },
  /// An attached player exited on its own. `code` is None when it was
  /// killed by a signal or the exit status is unknown.
  Exited { pid: u32, code: Option<i32> },
  /// The host got Ctrl-C and the attached player was stopped. With
  /// `handle_interrupt` enabled the host no longer terminates on Ctrl-C by
  /// itself; this event is its cue to exit.
  Interrupted { pid: u32 },
}

struct Tracked {
  pid: u32,
  child: Child,
  watchers: Vec<JoinHandle<()>>,
}

impl Tracked {
  /// Deliver the termination signal without waiting for the exit.
  fn terminate(&mut self) {
    #[cfg(unix)]
    {
      use nix::sys::signal::{kill, Signal};
      use nix::unistd::Pid;

      if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
        log::warn!("SIGTERM to VLC (pid {}) failed: {}", self.pid, e);
      }
    }
    #[cfg(not(unix))]
    {
      if let Err(e) = self.child.kill() {
        log::warn!("Terminating VLC (pid {}) failed: {}", self.pid, e);
      }
    }
  }

  /// Abort the watchers and collect the exit status off-thread.
  fn release(mut self) {
    for watcher in self.watchers.drain(..) {
      watcher.abort();
    }

    if let Ok(Some(_)) = self.child.try_wait() {
      return;
    }

    let pid = self.pid;
    let mut child = self.child;
    let reap = move || match child.wait() {
      Ok(status) => log::info!("VLC process (pid {}) exited with: {}", pid, status),
      Err(e) => log::error!("wait() on VLC (pid {}) failed: {}", pid, e),
    };

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let _ = handle.spawn_blocking(reap);
      }
      // Dropped outside a runtime.
      Err(_) => {
        let reaper = std::thread::Builder::new()
          .name("vlc-reaper".to_string())
          .spawn(reap);
        if let Err(e) = reaper {
          log::error!("Failed to spawn reaper for VLC (pid {}): {}", pid, e);
        }
      }
    }
  }
}

/// The single state slot. The pid lives inside the tracked variants, so
/// "stopped" and "no pid" cannot disagree.
enum Slot {
  Stopped,
  Running(Tracked),
  Daemonized(Tracked),
}

impl Slot {
  fn state(&self) -> ProcessState {
    match self {
      Slot::Stopped => ProcessState::Stopped,
      Slot::Running(_) => ProcessState::Running,
      Slot::Daemonized(_) => ProcessState::Daemonized,
    }
  }

  fn pid(&self) -> Option<u32> {
    match self {
      Slot::Stopped => None,
      Slot::Running(t) | Slot::Daemonized(t) => Some(t.pid),
    }
  }

  fn is_running_pid(&self, pid: Option<u32>) -> bool {
    match self {
      Slot::Running(t) => pid.map_or(true, |p| p == t.pid),
      _ => false,
    }
  }

  fn take(&mut self) -> Option<Tracked> {
    match std::mem::replace(self, Slot::Stopped) {
      Slot::Stopped => None,
      Slot::Running(t) | Slot::Daemonized(t) => Some(t),
    }
  }
}

/// State shared between the supervisor and its watcher tasks.
struct Shared {
  slot: Mutex<Slot>,
  event_tx: Sender<LifecycleEvent>,
}

impl Shared {
  fn emit(&self, event: LifecycleEvent) {
    if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
      log::debug!("Event queue full, dropping {:?}", event);
    }
  }

  /// Stop whatever is tracked.
  fn stop(&self) -> Option<u32> {
    let tracked = self.slot.lock().take()?;
    Some(self.terminate(tracked))
  }

  /// Stop the attached player (optionally only if it is `pid`). A
  /// daemonized player is left running.
  fn stop_attached(&self, pid: Option<u32>) -> Option<u32> {
    let tracked = {
      let mut slot = self.slot.lock();
      if !slot.is_running_pid(pid) {
        return None;
      }
      slot.take()?
    };
    Some(self.terminate(tracked))
  }

  fn terminate(&self, mut tracked: Tracked) -> u32 {
    let pid = tracked.pid;
    log::info!("Stopping VLC process (pid {})", pid);
    tracked.terminate();
    tracked.release();
    self.emit(LifecycleEvent::Stopped { pid });
    pid
  }

  /// Forget an attached player reported as exited.
  fn mark_exited(&self, pid: u32, code: Option<i32>) -> bool {
    let tracked = {
      let mut slot = self.slot.lock();
      if !slot.is_running_pid(Some(pid)) {
        return false;
      }
      slot.take()
    };
    match tracked {
      Some(tracked) => {
        self.forget_exited(tracked, code);
        true
      }
      None => false,
    }
  }

  /// Collect the attached child's exit status and forget it under one lock,
  /// so `stop` can never signal a reaped pid.
  fn reap_exited(&self, pid: u32) -> bool {
    let (tracked, code) = {
      let mut slot = self.slot.lock();
      let Slot::Running(running) = &mut *slot else {
        return false;
      };
      if running.pid != pid {
        return false;
      }
      let code = match running.child.try_wait() {
        Ok(Some(status)) => status.code(),
        Ok(None) => return false,
        Err(e) => {
          log::warn!("try_wait() on VLC (pid {}) failed: {}", pid, e);
          return false;
        }
      };
      (slot.take(), code)
    };
    match tracked {
      Some(tracked) => {
        self.forget_exited(tracked, code);
        true
      }
      None => false,
    }
  }

  fn forget_exited(&self, tracked: Tracked, code: Option<i32>) {
    let pid = tracked.pid;
    log::info!("VLC process (pid {}) exited on its own (code {:?})", pid, code);
    tracked.release();
    self.emit(LifecycleEvent::Exited { pid, code });
  }

  fn is_watching(&self, pid: u32) -> bool {
    self.slot.lock().is_running_pid(Some(pid))
  }
}

/// Owns the lifecycle of one VLC process.
pub struct Supervisor {
  config: PlayerConfig,
  strategy: LaunchStrategy,
  shared: Arc<Shared>,
  event_rx: Receiver<LifecycleEvent>,
}

impl Supervisor {
  pub fn new(config: PlayerConfig) -> Self {
    Self::with_strategy(config, LaunchStrategy::current())
  }

  pub fn with_strategy(config: PlayerConfig, strategy: LaunchStrategy) -> Self {
    let (event_tx, event_rx) = async_channel::bounded(EVENT_CAPACITY);
    Self {
      config,
      strategy,
      shared: Arc::new(Shared {
        slot: Mutex::new(Slot::Stopped),
        event_tx,
      }),
      event_rx,
    }
  }

  pub fn config(&self) -> &PlayerConfig {
    &self.config
  }

  pub fn strategy(&self) -> &LaunchStrategy {
    &self.strategy
  }

  /// Launch VLC unless a process is already tracked, in which case its pid
  /// is returned and nothing is spawned.
  ///
  /// A detached player gets its own process group (where supported) and no
  /// exit or interrupt handling.
  pub async fn start(&self, detached: bool) -> Result<u32, ProcessError> {
    let mut slot = self.shared.slot.lock();
    if let Some(pid) = slot.pid() {
      log::debug!("VLC already {:?} (pid {})", slot.state(), pid);
      return Ok(pid);
    }

    let invocation = self.strategy.invocation(&self.config, detached);
    let child = invocation.spawn()?;
    let pid = child.id();

    let mut tracked = Tracked {
      pid,
      child,
      watchers: Vec::new(),
    };
    if detached {
      log::info!("VLC daemonized (pid {})", pid);
      *slot = Slot::Daemonized(tracked);
    } else {
      tracked.watchers = self.install_watchers(pid);
      log::info!("VLC running attached (pid {})", pid);
      *slot = Slot::Running(tracked);
    }
    drop(slot);

    self.shared.emit(LifecycleEvent::Started { pid, detached });
    Ok(pid)
  }

  /// Same as `start(true)`.
  pub async fn daemonize(&self) -> Result<u32, ProcessError> {
    self.start(true).await
  }

  /// Send the termination signal to the tracked process and forget it.
  /// Returns None when nothing was tracked.
  pub fn stop(&self) -> Option<u32> {
    let stopped = self.shared.stop();
    if stopped.is_none() {
      log::debug!("stop() called with no VLC process");
    }
    stopped
  }

  pub fn state(&self) -> ProcessState {
    self.shared.slot.lock().state()
  }

  pub fn pid(&self) -> Option<u32> {
    self.shared.slot.lock().pid()
  }

  pub fn is_running(&self) -> bool {
    self.state() != ProcessState::Stopped
  }

  pub fn is_stopped(&self) -> bool {
    self.state() == ProcessState::Stopped
  }

  pub fn is_daemonized(&self) -> bool {
    self.state() == ProcessState::Daemonized
  }

  /// Receiver for lifecycle events. At most [`EVENT_CAPACITY`] unread
  /// events are kept.
  pub fn events(&self) -> Receiver<LifecycleEvent> {
    self.event_rx.clone()
  }

  /// Tell the supervisor its attached player `pid` has exited. Ignored for
  /// daemonized players and unknown pids. Returns whether state changed.
  pub fn handle_child_exit(&self, pid: u32) -> bool {
    self.shared.mark_exited(pid, None)
  }

  /// The host is exiting: stop an attached player, leave a daemonized one.
  pub fn handle_parent_exit(&self) -> Option<u32> {
    self.shared.stop_attached(None)
  }

  /// The host was interrupted: stop an attached player, leave a daemonized
  /// one, and report [`LifecycleEvent::Interrupted`].
  pub fn handle_interrupt(&self) -> Option<u32> {
    interrupt(&self.shared, None)
  }

  fn install_watchers(&self, pid: u32) -> Vec<JoinHandle<()>> {
    let mut watchers = Vec::new();

    if self.strategy.supports_child_exit_notification {
      watchers.push(watch_exit(
        self.shared.clone(),
        pid,
        self.config.child_poll_interval(),
      ));
    } else {
      log::debug!("No child exit notification on {:?}", self.strategy.platform);
    }

    if self.config.handle_interrupt {
      watchers.push(watch_interrupt(self.shared.clone(), pid));
    }

    watchers
  }
}

impl Drop for Supervisor {
  fn drop(&mut self) {
    if let Some(pid) = self.handle_parent_exit() {
      log::info!("Stopped attached VLC (pid {}) on supervisor drop", pid);
    }
  }
}

fn interrupt(shared: &Shared, pid: Option<u32>) -> Option<u32> {
  let stopped = shared.stop_attached(pid)?;
  log::info!("Interrupted; stopped VLC (pid {})", stopped);
  shared.emit(LifecycleEvent::Interrupted { pid: stopped });
  Some(stopped)
}

fn watch_exit(shared: Arc<Shared>, pid: u32, interval: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    loop {
      ticker.tick().await;
      if !shared.is_watching(pid) || shared.reap_exited(pid) {
        break;
      }
    }
  })
}

fn watch_interrupt(shared: Arc<Shared>, pid: u32) -> JoinHandle<()> {
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        interrupt(&shared, Some(pid));
      }
      Err(e) => log::warn!("Interrupt handler unavailable: {}", e),
    }
  })
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use std::os::unix::fs::PermissionsExt;
  use std::path::{Path, PathBuf};
  use std::time::Instant;

  use nix::sys::signal::{kill, raise, Signal};
  use nix::unistd::Pid;
  use tempfile::TempDir;

  use crate::vlc::process::Platform;

  /// Write an executable shell script standing in for the VLC binary.
  fn fake_vlc(body: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake-vlc");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
  }

  fn config_for(script: &Path) -> PlayerConfig {
    PlayerConfig {
      vlc_path: Some(script.to_string_lossy().into_owned()),
      child_poll_interval_ms: 20,
      ..PlayerConfig::default()
    }
  }

  fn supervisor_for(script: &Path) -> Supervisor {
    Supervisor::new(config_for(script))
  }

  fn alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
  }

  async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
      if check() {
        return true;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
  }

  fn cleanup(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
  }

  #[tokio::test]
  async fn test_start_is_idempotent() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    let events = sup.events();

    let first = sup.start(false).await.unwrap();
    let second = sup.start(false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(sup.state(), ProcessState::Running);
    assert!(sup.is_running());
    assert!(!sup.is_daemonized());

    assert_eq!(
      events.try_recv().unwrap(),
      LifecycleEvent::Started {
        pid: first,
        detached: false
      }
    );
    assert!(events.try_recv().is_err(), "second start must not spawn");

    assert_eq!(sup.stop(), Some(first));
  }

  #[tokio::test]
  async fn test_stop_is_idempotent() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    assert_eq!(sup.stop(), None);

    let pid = sup.start(false).await.unwrap();
    assert_eq!(sup.stop(), Some(pid));
    assert!(sup.is_stopped());
    assert_eq!(sup.pid(), None);
    assert_eq!(sup.stop(), None);

    assert!(eventually(|| !alive(pid)).await, "child should be terminated");
  }

  #[tokio::test]
  async fn test_spawn_failure_leaves_state_stopped() {
    let sup = Supervisor::new(PlayerConfig {
      vlc_path: Some("/nonexistent/vlc-rc-test/vlc".to_string()),
      ..PlayerConfig::default()
    });
    let err = sup.start(false).await.unwrap_err();
    assert!(matches!(err, ProcessError::NotFound(_)));
    assert!(sup.is_stopped());
    assert_eq!(sup.pid(), None);
  }

  #[tokio::test]
  async fn test_daemonize_sets_state() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    let pid = sup.daemonize().await.unwrap();
    assert!(sup.is_daemonized());
    assert!(sup.is_running());
    assert_eq!(sup.start(false).await.unwrap(), pid);
    assert!(sup.is_daemonized());
    assert_eq!(sup.stop(), Some(pid));
    assert!(sup.is_stopped());
  }

  #[tokio::test]
  async fn test_parent_exit_stops_attached_child() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    let pid = sup.start(false).await.unwrap();

    drop(sup);
    assert!(eventually(|| !alive(pid)).await, "attached child should die with the parent");
  }

  #[tokio::test]
  async fn test_parent_exit_spares_daemonized_child() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    let pid = sup.start(true).await.unwrap();

    assert_eq!(sup.handle_parent_exit(), None);
    assert!(sup.is_daemonized());
    drop(sup);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alive(pid), "daemonized child should outlive the parent");
    cleanup(pid);
  }

  #[tokio::test]
  async fn test_interrupt_only_affects_attached() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);
    let events = sup.events();

    let pid = sup.daemonize().await.unwrap();
    assert_eq!(sup.handle_interrupt(), None);
    assert!(sup.is_daemonized());
    sup.stop();

    assert!(eventually(|| !alive(pid)).await);

    let pid2 = sup.start(false).await.unwrap();
    assert_eq!(sup.handle_interrupt(), Some(pid2));
    assert!(sup.is_stopped());

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.contains(&LifecycleEvent::Interrupted { pid: pid2 }));
  }

  #[tokio::test]
  async fn test_child_exit_watcher_resets_state() {
    let (_dir, script) = fake_vlc("exit 3");
    let sup = supervisor_for(&script);
    let events = sup.events();
    let pid = sup.start(false).await.unwrap();

    assert!(eventually(|| sup.is_stopped()).await, "watcher should observe the exit");
    assert_eq!(sup.pid(), None);

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.contains(&LifecycleEvent::Exited { pid, code: Some(3) }));
  }

  #[tokio::test]
  async fn test_child_exit_notification() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);

    let daemon = sup.daemonize().await.unwrap();
    assert!(!sup.handle_child_exit(daemon));
    assert!(sup.is_daemonized());
    assert_eq!(sup.pid(), Some(daemon));
    sup.stop();

    let attached = sup.start(false).await.unwrap();
    assert!(!sup.handle_child_exit(attached + 100_000));
    assert!(sup.handle_child_exit(attached));
    assert!(sup.is_stopped());
    assert_eq!(sup.pid(), None);
    cleanup(attached);
  }

  #[tokio::test]
  async fn test_unread_events_stay_bounded() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = supervisor_for(&script);

    for _ in 0..EVENT_CAPACITY {
      let pid = sup.start(false).await.unwrap();
      assert_eq!(sup.stop(), Some(pid));
    }

    let events = sup.events();
    assert_eq!(events.len(), EVENT_CAPACITY);
    assert!(matches!(
      events.try_recv().unwrap(),
      LifecycleEvent::Started { detached: false, .. }
    ));
  }

  #[tokio::test]
  async fn test_interrupt_watcher_stops_attached_child() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let sup = Supervisor::new(PlayerConfig {
      handle_interrupt: true,
      ..config_for(&script)
    });
    let events = sup.events();
    let pid = sup.start(false).await.unwrap();

    // Give the watcher a chance to install its SIGINT handler.
    tokio::time::sleep(Duration::from_millis(100)).await;
    raise(Signal::SIGINT).unwrap();

    assert!(eventually(|| sup.is_stopped()).await, "Ctrl-C should stop the player");
    assert!(eventually(|| !alive(pid)).await);
    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.contains(&LifecycleEvent::Interrupted { pid }));
  }

  #[tokio::test]
  async fn test_reaped_child_is_never_signalled() {
    let (_dir, script) = fake_vlc("exit 0");
    let mut strategy = LaunchStrategy::for_platform(Platform::Unix);
    strategy.supports_child_exit_notification = false;
    let sup = Supervisor::with_strategy(config_for(&script), strategy);
    let events = sup.events();
    let pid = sup.start(false).await.unwrap();

    assert!(eventually(|| sup.shared.reap_exited(pid)).await);
    assert!(sup.is_stopped());
    assert_eq!(sup.stop(), None);

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.contains(&LifecycleEvent::Exited { pid, code: Some(0) }));
    assert!(!received.contains(&LifecycleEvent::Stopped { pid }));
  }

  #[test]
  fn test_drop_outside_runtime_reaps_attached_child() {
    let (_dir, script) = fake_vlc("exec sleep 30");
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let sup = supervisor_for(&script);
    let pid = runtime.block_on(sup.start(false)).unwrap();
    drop(runtime);

    drop(sup);
    let deadline = Instant::now() + Duration::from_secs(3);
    while alive(pid) && Instant::now() < deadline {
      std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!alive(pid), "child should be terminated and reaped");
  }
}
