//! Observer hub for session transitions.
//!
//! The gateway publishes [`SessionEvent::Terminated`] when it forces a logout; the session
//! store publishes the remaining events. UI layers subscribe here to redirect to the login
//! surface without polling.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, auth::AuthUser};

/// Callback invoked for every published event.
pub type SessionListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Session transitions visible to external observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// A login completed and the user is now authenticated.
	LoggedIn {
		/// Freshly fetched identity.
		user: Arc<AuthUser>,
	},
	/// The session was ended on request.
	LoggedOut,
	/// The gateway ended the session after a failed refresh or an exhausted retry.
	Terminated {
		/// Human-readable cause.
		reason: String,
	},
	/// The cached identity was re-fetched.
	IdentityRefreshed {
		/// New identity, or `None` when the provider no longer knows the user.
		user: Option<Arc<AuthUser>>,
	},
}

/// Handle returned by subscription calls; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);
impl SubscriptionId {
	pub(crate) fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub(crate) fn raw(self) -> u64 {
		self.0
	}
}

/// Fan-out hub for [`SessionEvent`] values.
#[derive(Default)]
pub struct SessionEvents {
	listeners: RwLock<BTreeMap<SubscriptionId, SessionListener>>,
	next_id: AtomicU64,
}
impl SessionEvents {
	/// Registers `listener`; it runs synchronously on the publishing task.
	pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
	where
		F: 'static + Fn(&SessionEvent) + Send + Sync,
	{
		let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.listeners.write().insert(id, Arc::new(listener));

		id
	}

	/// Removes a listener; returns `false` if it was already gone.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.listeners.write().remove(&id).is_some()
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.read().len()
	}

	/// Delivers `event` to every listener in subscription order.
	///
	/// Listeners are snapshotted first, so a listener may subscribe or unsubscribe without
	/// deadlocking the hub.
	pub fn emit(&self, event: SessionEvent) {
		let listeners = self.listeners.read().values().cloned().collect::<Vec<_>>();

		for listener in listeners {
			listener(&event);
		}
	}
}
impl Debug for SessionEvents {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionEvents").field("listeners", &self.listener_count()).finish()
	}
}
