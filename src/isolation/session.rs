//! Session control: one profile bound to one runtime instance under one
//! session id.
//!
//! A controller owns exactly one session with a linear lifecycle:
//!
//! ```text
//! Starting ──▶ Running ──▶ Stopping ──▶ Stopped
//!     │           │            │
//!     └───────────┴────────────┴──────▶ Error
//! ```
//!
//! There is no nesting and no restart: a stopped controller stays
//! stopped, and a new session means a new controller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::isolation::error::{IsolationError, Result};
use crate::isolation::profile::IsolationProfile;
use crate::isolation::runtime::{IsolationRuntime, RuntimeEvent};

/// Which backend realizes the isolated environment.
///
/// Resolved once at construction; never re-dispatched by name afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Container,
    Vm,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "container" | "docker" => Ok(BackendKind::Container),
            "vm" => Ok(BackendKind::Vm),
            _ => Err(format!(
                "invalid backend '{}', expected 'container' or 'vm'",
                s
            )),
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl SessionStatus {
    /// Whether a transition from `self` to `next` is allowed.
    fn can_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Starting, Running) | (Running, Stopping) | (Stopping, Stopped) | (_, Error)
        )
    }
}

/// Binds one profile to one runtime instance under one session id.
pub struct SessionController {
    id: String,
    created_at: DateTime<Utc>,
    profile: IsolationProfile,
    backend: BackendKind,
    runtime: Arc<dyn IsolationRuntime>,
    status: RwLock<SessionStatus>,
}

impl SessionController {
    /// Create a controller around a runtime. The session has not started
    /// yet; call [`SessionController::start`].
    pub fn new(
        profile: IsolationProfile,
        backend: BackendKind,
        runtime: Arc<dyn IsolationRuntime>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            profile,
            backend,
            runtime,
            status: RwLock::new(SessionStatus::Starting),
        }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the controller was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The profile snapshot taken at construction.
    pub fn profile(&self) -> &IsolationProfile {
        &self.profile
    }

    /// Which backend realizes this session.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// The underlying runtime handle.
    pub fn runtime(&self) -> Arc<dyn IsolationRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    async fn transition(&self, next: SessionStatus) -> Result<()> {
        let mut status = self.status.write().await;
        if !status.can_transition(next) {
            return Err(IsolationError::backend(
                "session",
                format!("invalid transition {:?} -> {:?}", *status, next),
            ));
        }
        *status = next;
        Ok(())
    }

    /// Start the session. Fails if the controller ever left `Starting`.
    pub async fn start(&self) -> Result<()> {
        {
            let status = self.status.read().await;
            if *status != SessionStatus::Starting {
                return Err(IsolationError::AlreadyRunning);
            }
        }

        match self.runtime.start(&self.id, &self.profile).await {
            Ok(()) => {
                self.transition(SessionStatus::Running).await?;
                Ok(())
            }
            Err(e) => {
                *self.status.write().await = SessionStatus::Error;
                Err(e)
            }
        }
    }

    /// Stop the session gracefully, forcing teardown if that fails.
    pub async fn stop(&self) -> Result<()> {
        self.transition(SessionStatus::Stopping).await?;

        let result = match self.runtime.stop().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("graceful stop failed ({}), forcing", e);
                self.runtime.force_stop().await
            }
        };

        match result {
            Ok(()) => {
                self.transition(SessionStatus::Stopped).await?;
                Ok(())
            }
            Err(e) => {
                *self.status.write().await = SessionStatus::Error;
                Err(e)
            }
        }
    }

    /// Subscribe to the runtime's lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RuntimeEvent> {
        self.runtime.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::testing::FakeRuntime;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "container".parse::<BackendKind>().unwrap(),
            BackendKind::Container
        );
        assert_eq!("VM".parse::<BackendKind>().unwrap(), BackendKind::Vm);
        assert!("chroot".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_status_transitions_are_linear() {
        use SessionStatus::*;
        assert!(Starting.can_transition(Running));
        assert!(Running.can_transition(Stopping));
        assert!(Stopping.can_transition(Stopped));
        assert!(Running.can_transition(Error));
        assert!(Stopped.can_transition(Error));

        assert!(!Stopped.can_transition(Running));
        assert!(!Running.can_transition(Starting));
        assert!(!Starting.can_transition(Stopped));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let runtime = Arc::new(FakeRuntime::new());
        let controller = SessionController::new(
            IsolationProfile::balanced(),
            BackendKind::Container,
            runtime.clone(),
        );

        assert_eq!(controller.status().await, SessionStatus::Starting);
        controller.start().await.unwrap();
        assert_eq!(controller.status().await, SessionStatus::Running);
        assert!(runtime.is_running());

        controller.stop().await.unwrap();
        assert_eq!(controller.status().await, SessionStatus::Stopped);
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let runtime = Arc::new(FakeRuntime::new());
        let controller = SessionController::new(
            IsolationProfile::balanced(),
            BackendKind::Vm,
            runtime,
        );

        controller.start().await.unwrap();
        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, IsolationError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_events_observable_across_lifecycle() {
        let runtime = Arc::new(FakeRuntime::new());
        let controller = SessionController::new(
            IsolationProfile::isolated(),
            BackendKind::Container,
            runtime,
        );

        let mut events = controller.subscribe();
        controller.start().await.unwrap();
        controller.stop().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                RuntimeEvent::Starting,
                RuntimeEvent::Started,
                RuntimeEvent::Stopping,
                RuntimeEvent::Stopped,
            ]
        );
    }
}
