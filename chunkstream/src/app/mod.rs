//! Application bootstrap and lifecycle management.
//!
//! [`StreamingApp`] wires a world together in the right order and owns the
//! background loops that keep it streaming:
//!
//! 1. Validate the configuration and the generator's world settings
//! 2. Check that every entity kind the generator produces has a pool
//! 3. Start the scheduler loop
//! 4. Start the streaming controller loop
//!
//! Shutdown runs in reverse: the controller tears the world down first
//! (its Unload work still needs a live scheduler), then the scheduler
//! stops and the pools are torn down.
//!
//! # Example
//!
//! ```ignore
//! use chunkstream::app::StreamingApp;
//!
//! let app = StreamingApp::start(config, pools, generator, observer)?;
//!
//! let mut stats = app.subscribe();
//! stats.changed().await?;
//!
//! let last = app.shutdown().await?;
//! ```

mod bootstrap;
mod error;

pub use bootstrap::StreamingApp;
pub use error::AppError;
