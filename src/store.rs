//! Durable key/value persistence for the current access and refresh tokens.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
};

/// Storage backend contract for credential persistence.
///
/// Lookups are synchronous: the gateway resolves the bearer token on every request before
/// the first suspension point, so backends must answer from memory and persist on write.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the value stored under `key`, if present.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Persists or replaces the value stored under `key`.
	fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Removes `key`; removing an absent key is not an error.
	fn remove(&self, key: &str) -> Result<(), StoreError>;
}
impl dyn CredentialStore + '_ {
	/// Loads the stored access token.
	pub fn access_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.get(CredentialKey::AccessToken.as_str())?.map(TokenSecret::new))
	}

	/// Loads the stored refresh token.
	pub fn refresh_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.get(CredentialKey::RefreshToken.as_str())?.map(TokenSecret::new))
	}

	/// Loads the full credential pair; `None` when no access token is stored.
	pub fn credentials(&self) -> Result<Option<Credentials>, StoreError> {
		let Some(access_token) = self.access_token()? else {
			return Ok(None);
		};

		Ok(Some(Credentials { access_token, refresh_token: self.refresh_token()? }))
	}

	/// Replaces both tokens. A missing refresh token removes any previously stored one.
	pub fn persist(&self, credentials: &Credentials) -> Result<(), StoreError> {
		self.set(CredentialKey::AccessToken.as_str(), credentials.access_token.expose())?;

		match &credentials.refresh_token {
			Some(refresh) => self.set(CredentialKey::RefreshToken.as_str(), refresh.expose()),
			None => self.remove(CredentialKey::RefreshToken.as_str()),
		}
	}

	/// Stores a refreshed access token and, when the provider rotated it, the new refresh token.
	pub fn rotate(
		&self,
		access_token: &TokenSecret,
		refresh_token: Option<&TokenSecret>,
	) -> Result<(), StoreError> {
		self.set(CredentialKey::AccessToken.as_str(), access_token.expose())?;

		if let Some(refresh) = refresh_token {
			self.set(CredentialKey::RefreshToken.as_str(), refresh.expose())?;
		}

		Ok(())
	}

	/// Removes both tokens. Idempotent.
	pub fn clear(&self) -> Result<(), StoreError> {
		self.remove(CredentialKey::AccessToken.as_str())?;
		self.remove(CredentialKey::RefreshToken.as_str())
	}
}

/// Well-known keys used by the credential helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKey {
	/// Current bearer token.
	AccessToken,
	/// Current refresh token.
	RefreshToken,
}
impl CredentialKey {
	/// Returns the stable storage key.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKey::AccessToken => "access_token",
			CredentialKey::RefreshToken => "refresh_token",
		}
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
