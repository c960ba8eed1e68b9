//! Control a VLC media player through its rc (remote control) interface.
//!
//! [`Supervisor`] launches and tracks the VLC process; [`Connection`] and
//! [`VlcClient`] talk to the rc socket it opens. The two share no state:
//! start the player before opening the connection.
//!
//! ```no_run
//! use vlc_rc::{PlayerConfig, Supervisor, VlcClient};
//!
//! # async fn run() -> Result<(), vlc_rc::VlcError> {
//! let config = PlayerConfig::load_or_default()?;
//! let supervisor = Supervisor::new(config.clone());
//! supervisor.start(false).await?;
//!
//! let mut client = VlcClient::from_config(&config);
//! client.connection().open_with_retry(10).await?;
//! client.add("file:///tmp/song.mp3").await?;
//! println!("{}% played", client.progress().await?);
//! # Ok(())
//! # }
//! ```

mod config;
mod vlc;

pub use config::{ConfigError, PlayerConfig};
pub use vlc::*;
