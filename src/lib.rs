//! Identity and role reconciliation core for the member portal: OIDC login against the realm's
//! identity provider, encrypted cookie sessions, a self-refreshing service credential, realm role
//! administration, and the debt-role reconciliation job.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod admin;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod idp;
pub mod oauth;
pub mod obs;
pub mod reconcile;
pub mod session;
pub mod web;

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
use color_eyre as _;
#[cfg(test)] use {httpmock as _, tower as _};
