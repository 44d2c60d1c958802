//! # Session context
//!
//! Process-wide, observable view of who is signed in. One `SessionContext`
//! is created at startup and cloned wherever it is read. Listeners register
//! with [`SessionContext::subscribe`] and must call
//! [`SessionContext::unsubscribe`] when they go away.
//!
//! Only [`SessionSync`] writes to it, driven by the credential provider's
//! identity stream. The sign-in service reads it to pick a landing page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::options::ClaimOptions;
use crate::profile::{ProfileResolver, Role};
use crate::provider::{Identity, IdentityStream};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<Identity>,
    pub role: Option<Role>,
    pub profile_name: Option<String>,
    pub loading: bool,
    pub demo_mode: bool,
}

impl SessionState {
    fn initial(demo_mode: bool) -> Self {
        Self {
            loading: !demo_mode,
            demo_mode,
            ..Self::default()
        }
    }

    fn signed_out(demo_mode: bool) -> Self {
        Self {
            demo_mode,
            ..Self::default()
        }
    }
}

/// Where a signed-in person should be sent after sign-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Landing {
    AdminUsers,
    Clients,
}

impl Landing {
    pub fn path(&self) -> &'static str {
        match self {
            Landing::AdminUsers => "/admin/usuarios",
            Landing::Clients => "/clientes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type SessionListener = Arc<dyn Fn(&SessionState) + Send + Sync>;

struct SessionInner {
    state: RwLock<SessionState>,
    listeners: RwLock<Vec<(SubscriptionId, SessionListener)>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// `demo_mode` is set when no provider is configured; such a context
    /// never loads.
    pub fn new(demo_mode: bool) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState::initial(demo_mode)),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn current(&self) -> SessionState {
        match self.inner.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Register a listener. It is called once right away with the current
    /// state, then on every change until unsubscribed.
    pub fn subscribe(&self, listener: SessionListener) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.inner.listeners.write() {
            listeners.push((id, Arc::clone(&listener)));
        }
        listener(&self.current());
        id
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut listeners) = self.inner.listeners.write() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Landing page for the signed-in role, if any.
    pub fn landing(&self) -> Option<Landing> {
        let state = self.current();
        state.user.as_ref()?;
        match state.role? {
            Role::Admin => Some(Landing::AdminUsers),
            Role::Staff => Some(Landing::Clients),
        }
    }

    pub(crate) fn publish(&self, next: SessionState) {
        match self.inner.state.write() {
            Ok(mut state) => *state = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }

        // no lock held while listeners run
        let listeners: Vec<SessionListener> = self
            .inner
            .listeners
            .read()
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(&next);
        }
    }
}

/// Turns provider identity changes into session states.
pub struct SessionSync {
    context: SessionContext,
    profiles: ProfileResolver,
    fallback_admin_email: Option<String>,
}

impl SessionSync {
    pub fn new(context: SessionContext, profiles: ProfileResolver, options: &ClaimOptions) -> Self {
        Self {
            context,
            profiles,
            fallback_admin_email: options.fallback_admin_email.clone(),
        }
    }

    fn fallback_role(&self, identity: &Identity) -> Role {
        let email = identity.email.trim().to_lowercase();
        match &self.fallback_admin_email {
            Some(admin) if *admin == email => Role::Admin,
            _ => Role::Staff,
        }
    }

    /// Compute and publish the session state for one identity change.
    pub async fn apply(&self, change: Option<Identity>) -> SessionState {
        let demo_mode = self.context.current().demo_mode;

        let state = match change {
            None => SessionState::signed_out(demo_mode),
            Some(identity) => {
                let email = Some(identity.email.as_str()).filter(|e| !e.is_empty());
                let fallback_name = identity
                    .display_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .or_else(|| email.map(str::to_string));

                let (role, profile_name) = match self.profiles.resolve(&identity.uid, email).await {
                    Ok(profile) => (
                        profile.role.unwrap_or_else(|| self.fallback_role(&identity)),
                        profile.display_name.or(fallback_name),
                    ),
                    Err(err) => {
                        warn!(error = %err, uid = %identity.uid, "could not resolve profile");
                        (self.fallback_role(&identity), fallback_name)
                    }
                };

                info!(uid = %identity.uid, %role, "session established");
                SessionState {
                    user: Some(identity),
                    role: Some(role),
                    profile_name,
                    loading: false,
                    demo_mode,
                }
            }
        };

        self.context.publish(state.clone());
        state
    }

    /// Follow the provider's identity stream until it closes.
    pub async fn run(self, mut stream: IdentityStream) {
        loop {
            match stream.recv().await {
                Ok(change) => {
                    self.apply(change).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session stream lagged");
                }
                Err(RecvError::Closed) => {
                    debug!("session stream closed");
                    break;
                }
            }
        }
    }
}
