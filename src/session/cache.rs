//! Explicit keyed identity cache with change notification.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, auth::AuthUser, session::SubscriptionId};

/// Cache key holding the authenticated identity.
pub const CURRENT_USER: &str = "currentUser";

/// Callback invoked on every cache mutation.
pub type CacheListener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Cache mutations delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
	/// `key` now holds `value` (`None` means "known to have no user").
	Set {
		/// Mutated key.
		key: String,
		/// New value.
		value: Option<Arc<AuthUser>>,
	},
	/// `key` was dropped; readers must re-fetch.
	Invalidated {
		/// Dropped key.
		key: String,
	},
}

/// Keyed cache of identity snapshots.
///
/// A missing entry means "unknown"; an entry holding `None` means "fetched, no user".
#[derive(Default)]
pub struct IdentityCache {
	entries: RwLock<HashMap<String, Option<Arc<AuthUser>>>>,
	listeners: RwLock<BTreeMap<u64, CacheListener>>,
	next_id: AtomicU64,
}
impl IdentityCache {
	/// Reads an entry; the outer `None` means the key is not cached.
	pub fn get(&self, key: &str) -> Option<Option<Arc<AuthUser>>> {
		self.entries.read().get(key).cloned()
	}

	/// Shorthand for the [`CURRENT_USER`] entry, flattening "unknown" into `None`.
	pub fn current_user(&self) -> Option<Arc<AuthUser>> {
		self.get(CURRENT_USER).flatten()
	}

	/// Replaces an entry wholesale and notifies subscribers.
	pub fn set(&self, key: &str, value: Option<Arc<AuthUser>>) {
		self.entries.write().insert(key.to_owned(), value.clone());
		self.notify(CacheEvent::Set { key: key.to_owned(), value });
	}

	/// Drops an entry and notifies subscribers; returns `false` when nothing was cached.
	pub fn invalidate(&self, key: &str) -> bool {
		let removed = self.entries.write().remove(key).is_some();

		if removed {
			self.notify(CacheEvent::Invalidated { key: key.to_owned() });
		}

		removed
	}

	/// Registers a mutation listener.
	pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
	where
		F: 'static + Fn(&CacheEvent) + Send + Sync,
	{
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		self.listeners.write().insert(id, Arc::new(listener));

		SubscriptionId::from_raw(id)
	}

	/// Removes a mutation listener.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.listeners.write().remove(&id.raw()).is_some()
	}

	fn notify(&self, event: CacheEvent) {
		let listeners = self.listeners.read().values().cloned().collect::<Vec<_>>();

		for listener in listeners {
			listener(&event);
		}
	}
}
impl Debug for IdentityCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityCache").field("entries", &*self.entries.read()).finish()
	}
}
