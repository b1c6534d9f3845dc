//! Session context and auth-change subscriptions.
//!
//! Forum actions never read a global "current user". The caller takes a
//! [`Session`] snapshot from an [`Authenticator`] and passes it into each
//! action. Code that needs to react to sign-in / sign-out subscribes to an
//! [`AuthState`] and tears the subscription down explicitly (or by dropping
//! the [`Subscription`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{ForumError, Result};
use crate::models::UserId;

/// Source of the currently authenticated user.
pub trait Authenticator {
    fn current_user(&self) -> Option<UserId>;
}

/// Immutable snapshot of who is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    /// Captures the authenticator's current user.
    pub fn from_auth(auth: &impl Authenticator) -> Self {
        Self {
            user: auth.current_user(),
        }
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    /// Returns the acting user or `AuthRequired`.
    pub fn require_user(&self) -> Result<UserId> {
        self.user.ok_or(ForumError::AuthRequired)
    }
}

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
struct AuthInner {
    current: Option<UserId>,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
}

/// In-process auth state fed by the embedding application.
///
/// Cloning shares the same state.
#[derive(Clone, Default)]
pub struct AuthState {
    inner: Arc<Mutex<AuthInner>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user` as signed in and notifies subscribers if it changed.
    pub fn sign_in(&self, user: UserId) {
        self.set_current(Some(user));
    }

    /// Clears the signed-in user and notifies subscribers if it changed.
    pub fn sign_out(&self) {
        self.set_current(None);
    }

    /// Snapshot of the current auth state.
    pub fn session(&self) -> Session {
        Session::from_auth(self)
    }

    /// Registers a listener called after every auth change.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));

        Subscription {
            id,
            state: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    fn set_current(&self, user: Option<UserId>) {
        let (session, listeners) = {
            let mut inner = lock(&self.inner);
            if inner.current == user {
                return;
            }
            inner.current = user;
            let listeners: Vec<Listener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (Session { user }, listeners)
        };

        tracing::debug!(signed_in = session.user.is_some(), "auth state changed");

        // Called without the lock held so listeners may read the state.
        for listener in listeners {
            listener(&session);
        }
    }
}

impl Authenticator for AuthState {
    fn current_user(&self) -> Option<UserId> {
        lock(&self.inner).current
    }
}

/// Handle for an auth-change listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<AuthInner>>,
    active: bool,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(state) = self.state.upgrade() {
            lock(&state).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock(inner: &Mutex<AuthInner>) -> MutexGuard<'_, AuthInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn anonymous_session_requires_auth() {
        let err = Session::anonymous().require_user().unwrap_err();
        assert!(matches!(err, ForumError::AuthRequired));
    }

    #[test]
    fn session_snapshot_does_not_follow_later_changes() {
        let auth = AuthState::new();
        let user = UserId::random();
        auth.sign_in(user);

        let snapshot = auth.session();
        auth.sign_out();

        assert_eq!(snapshot.user(), Some(user));
        assert_eq!(auth.session().user(), None);
    }

    #[test]
    fn subscribers_see_changes_until_unsubscribed() {
        let auth = AuthState::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let subscription = auth.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(auth.listener_count(), 1);

        auth.sign_in(UserId::random());
        auth.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
        assert_eq!(auth.listener_count(), 0);

        auth.sign_in(UserId::random());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_tears_it_down() {
        let auth = AuthState::new();
        {
            let _subscription = auth.subscribe(|_| {});
            assert_eq!(auth.listener_count(), 1);
        }
        assert_eq!(auth.listener_count(), 0);
    }

    #[test]
    fn unchanged_state_does_not_notify() {
        let auth = AuthState::new();
        let user = UserId::random();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = auth.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        auth.sign_in(user);
        auth.sign_in(user);
        auth.sign_out();
        auth.sign_out();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_can_read_state_during_notification() {
        let auth = AuthState::new();
        let reader = auth.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _subscription = auth.subscribe(move |session| {
            assert_eq!(reader.current_user(), session.user());
            *sink.lock().unwrap() = session.user();
        });

        let user = UserId::random();
        auth.sign_in(user);
        assert_eq!(*seen.lock().unwrap(), Some(user));
    }
}
