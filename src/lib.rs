//! Keep a reMarkable tablet stocked with recent newsletters.
//!
//! Each run fetches recent messages from the configured mail accounts, renders every newsletter
//! not seen before into a PDF, uploads it into a folder on the tablet, and deletes documents that
//! have been on the tablet longer than the retention window. A JSON tracker file records what has
//! been uploaded so that repeated runs never upload the same newsletter twice.
//!
//! # Usage
//!
//! The engine is generic over its collaborators, so it can be driven with the real IMAP, renderer
//! and cloud implementations or with anything else implementing the traits in
//! [`collaborators`].
//!
//! ```no_run
//! use chrono::Utc;
//! use newsletter_sync::config::Config;
//! use newsletter_sync::remarkable::RemarkableClient;
//! use newsletter_sync::sync::SyncEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.toml")?;
//! config.validate()?;
//!
//! let device = RemarkableClient::new(config.remarkable_settings())?;
//! let mut engine = SyncEngine::new(
//!     config.mail_accounts()?,
//!     config.renderer(),
//!     device,
//!     config.sync_settings(false),
//! );
//!
//! let summary = engine.run(Utc::now())?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod mail;
pub mod parse;
pub mod plan;
pub mod remarkable;
pub mod render;
pub mod sync;
pub mod tracker;
pub mod types;

mod utils;

pub use crate::error::{Error, Result};
pub use crate::sync::{MailAccount, SyncEngine, SyncSettings};
pub use crate::types::*;

#[cfg(test)]
mod mock_stream;

#[cfg(test)]
mod testing;
