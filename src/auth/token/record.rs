//! Cached service-account access token and its lifecycle helpers.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret, error::ConfigError};

/// Current lifecycle status for a cached token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Token is currently valid.
	Active,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Access token obtained through the client-credentials grant.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccessToken {
	/// Bearer secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the token endpoint answered.
	pub issued_at: OffsetDateTime,
	/// `issued_at + expires_in`.
	pub expires_at: OffsetDateTime,
}
impl ServiceAccessToken {
	/// Builds a token from a relative lifetime reported by the token endpoint.
	pub fn new(
		access_token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Result<Self, ConfigError> {
		if !expires_in.is_positive() {
			return Err(ConfigError::NonPositiveExpiresIn);
		}

		let expires_at =
			issued_at.checked_add(expires_in).ok_or(ConfigError::ExpiresInOutOfRange)?;

		Ok(Self { access_token: TokenSecret::new(access_token), issued_at, expires_at })
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the token expires within `margin` of `instant` (or already has).
	pub fn expires_within(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.is_expired_at(instant) || self.expires_at - instant <= margin
	}
}
impl Debug for ServiceAccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccessToken")
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
