//! Sweep through a photo and video library, deciding what to keep and
//! what to delete, while decoded images are loaded and released around the
//! viewing position.

pub mod config;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod window;

pub use config::LoadingConfig;
pub use error::{Error, Result};
pub use state::session::SweepSession;
