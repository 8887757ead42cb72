//! Secrets and short-lived bearer tokens.

pub mod record;
pub mod secret;
