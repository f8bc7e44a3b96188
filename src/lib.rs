// ABOUTME: Public library API for the sheetkit account subsystem
// ABOUTME: Re-exports core modules for external use

pub mod accounts;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod google;
pub mod local;
pub mod logging;
pub mod model;
pub mod oauth;
pub mod storage;
pub mod token;

pub use error::{Error, Result};
pub use model::{AccountProfile, AccountRecord, CachedToken};
