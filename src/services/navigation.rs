//! Navigation gate: session presence to top-level destination.
//!
//! DESIGN
//! ======
//! Two states, `Unauthenticated` and `Authenticated`, derived purely from
//! whether a session is present. The gate subscribes before computing its
//! initial state so no transition can slip between the two, then applies
//! every `SessionChangeEvent` in arrival order. Re-entering the current
//! state is applied again rather than skipped; the host calls are
//! idempotent.
//!
//! A destination is always made current before the others are hidden, so
//! the host never sits without a current destination.
//!
//! ERROR HANDLING
//! ==============
//! Host failures are not recovered. They surface as `NavigationError` and
//! end the run loop; the owner decides how to die.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::Subscription;
use crate::session::{Session, SessionChangeEvent, SessionStore};

pub const MAIN_ROUTE: &str = "//main/dashboard";
pub const LOGIN_ROUTE: &str = "//login";

// =============================================================================
// TYPES
// =============================================================================

/// Top-level destinations. `Login` and `Register` form the login family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Login,
    Register,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Unauthenticated,
    Authenticated,
}

impl NavState {
    #[must_use]
    pub fn for_session(session: &Session) -> Self {
        if session.is_present() { Self::Authenticated } else { Self::Unauthenticated }
    }

    /// Destination made current on entering this state.
    #[must_use]
    pub fn destination(self) -> Destination {
        match self {
            Self::Authenticated => Destination::Main,
            Self::Unauthenticated => Destination::Login,
        }
    }

    #[must_use]
    pub fn route(self) -> &'static str {
        match self {
            Self::Authenticated => MAIN_ROUTE,
            Self::Unauthenticated => LOGIN_ROUTE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation host failed: {0}")]
    Host(String),
    #[error("navigation task failed: {0}")]
    Task(String),
}

/// UI shell primitives the gate drives.
#[async_trait::async_trait]
pub trait NavigationHost: Send + Sync {
    /// Show or hide a destination.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal by the gate.
    async fn set_visible(&self, destination: Destination, visible: bool) -> Result<(), NavigationError>;

    /// Make `destination` the current one.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal by the gate.
    async fn set_current(&self, destination: Destination) -> Result<(), NavigationError>;

    /// Navigate to an absolute route.
    ///
    /// # Errors
    ///
    /// Any error is treated as fatal by the gate.
    async fn go_to(&self, route: &str) -> Result<(), NavigationError>;
}

// =============================================================================
// GATE
// =============================================================================

pub struct NavigationGate {
    host: Arc<dyn NavigationHost>,
    events: Subscription<SessionChangeEvent>,
    state: watch::Sender<NavState>,
    transitions: u64,
}

impl NavigationGate {
    /// Subscribe to `store`, resolve the initial session (restoring if cold)
    /// and put the host into the matching state before returning.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the initial transition fails.
    pub async fn start(store: &SessionStore, host: Arc<dyn NavigationHost>) -> Result<Self, NavigationError> {
        let events = store.subscribe();
        let initial = NavState::for_session(&store.current().await);
        enter(host.as_ref(), initial).await?;
        info!(state = ?initial, "navigation gate started");
        let (state, _) = watch::channel(initial);
        Ok(Self { host, events, state, transitions: 1 })
    }

    #[must_use]
    pub fn state(&self) -> NavState {
        *self.state.borrow()
    }

    /// Observe state changes from other tasks.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<NavState> {
        self.state.subscribe()
    }

    /// Number of transitions applied, including the initial one.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Apply one session change.
    ///
    /// # Errors
    ///
    /// Returns the host's error; the recorded state is left unchanged.
    pub async fn handle(&mut self, event: &SessionChangeEvent) -> Result<NavState, NavigationError> {
        let next = NavState::for_session(&event.session);
        debug!(sequence = event.sequence, state = ?next, "session change");
        enter(self.host.as_ref(), next).await?;
        self.transitions += 1;
        self.state.send_replace(next);
        Ok(next)
    }

    /// Apply every event already queued, without waiting for more.
    ///
    /// # Errors
    ///
    /// Stops at the first host error.
    pub async fn drain(&mut self) -> Result<NavState, NavigationError> {
        while let Some(event) = self.events.try_recv() {
            self.handle(&event).await?;
        }
        Ok(self.state())
    }

    /// Process events until `shutdown` fires or the session store is gone.
    /// Events already queued when `shutdown` fires are still applied.
    /// Returns the gate so its owner can release it.
    ///
    /// # Errors
    ///
    /// Returns the first host error.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<Self, NavigationError> {
        loop {
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.handle(&event).await?;
                    }
                    None => return Ok(self),
                },
                _ = &mut shutdown => return Ok(self),
            }
        }
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self) -> GateTask {
        let (shutdown, rx) = oneshot::channel();
        let state = self.watch();
        let handle = tokio::spawn(self.run(rx));
        GateTask { shutdown, handle, state }
    }

    /// Release the session subscription.
    pub fn shutdown(self) {
        self.events.unsubscribe();
        debug!("navigation gate released");
    }
}

/// Handle to a gate running on its own task.
pub struct GateTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<NavigationGate, NavigationError>>,
    state: watch::Receiver<NavState>,
}

impl GateTask {
    #[must_use]
    pub fn state(&self) -> NavState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<NavState> {
        self.state.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and release its subscription.
    ///
    /// # Errors
    ///
    /// Returns the host error that ended the task early, if any.
    pub async fn stop(self) -> Result<(), NavigationError> {
        let _ = self.shutdown.send(());
        let gate = self
            .handle
            .await
            .map_err(|e| NavigationError::Task(e.to_string()))??;
        gate.shutdown();
        Ok(())
    }
}

/// Drive the host into `state`. The incoming destination becomes current
/// before the outgoing ones are hidden.
async fn enter(host: &dyn NavigationHost, state: NavState) -> Result<(), NavigationError> {
    match state {
        NavState::Authenticated => {
            host.set_visible(Destination::Main, true).await?;
            host.set_current(Destination::Main).await?;
            host.set_visible(Destination::Login, false).await?;
            host.set_visible(Destination::Register, false).await?;
        }
        NavState::Unauthenticated => {
            host.set_visible(Destination::Login, true).await?;
            host.set_visible(Destination::Register, true).await?;
            host.set_current(Destination::Login).await?;
            host.set_visible(Destination::Main, false).await?;
        }
    }
    host.go_to(state.route()).await
}

#[cfg(test)]
#[path = "navigation_test.rs"]
mod tests;
