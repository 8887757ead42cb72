//! Credential flows.
//!
//! [`InteractiveAuthFlow`] signs humans in through the browser and stores the result in their
//! session. [`ServiceCredentialTokenSource`] holds the machine credential used for every role
//! mutation. The two never share tokens.

pub mod client_credentials;
pub mod common;
pub mod interactive;

pub use client_credentials::*;
pub use common::*;
pub use interactive::*;
