//! rmcp session manager keeping the registry in step with streamable sessions.
//!
//! Wraps [`LocalSessionManager`], which owns the per-session worker, the
//! request-wise and standalone streams and their replay caches. A successful
//! `initialize_session` registers the session; `close_session` removes it.
//! Closing the session from our side (registry teardown, cleanup sweep)
//! cancels its shutdown token, which closes the rmcp session in turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::Stream;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::streamable_http_server::session::local::{
    LocalSessionManager, LocalSessionManagerError, SessionConfig,
};
use rmcp::transport::streamable_http_server::session::ServerSseMessage;
use rmcp::transport::streamable_http_server::{SessionId, SessionManager};
use tracing::{debug, warn};

use super::controller::RegistryBinding;
use super::registry::SessionRegistry;
use crate::transport::streamable::StreamableSession;
use crate::transport::Transport;

/// [`SessionManager`] reporting session lifecycle to a [`SessionRegistry`].
pub struct ObservedSessionManager {
    inner: LocalSessionManager,
    registry: SessionRegistry,
    sessions: Mutex<HashMap<SessionId, Arc<StreamableSession>>>,
    this: Weak<Self>,
}

impl ObservedSessionManager {
    /// Create a manager whose streams buffer and retain `events_per_stream`
    /// events each.
    #[must_use]
    pub fn new(registry: SessionRegistry, events_per_stream: usize) -> Arc<Self> {
        let inner = LocalSessionManager {
            session_config: SessionConfig {
                channel_capacity: events_per_stream.max(1),
                keep_alive: None,
            },
            ..LocalSessionManager::default()
        };
        Arc::new_cyclic(|this| Self {
            inner,
            registry,
            sessions: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Number of rmcp sessions currently open, initialized or not.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Close every open session, including ones that never finished
    /// `initialize`.
    pub fn close_all(&self) {
        let sessions: Vec<_> = self.lock().drain().map(|(_, session)| session).collect();
        for session in sessions {
            session.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<StreamableSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, id: &SessionId) -> Option<Arc<StreamableSession>> {
        self.lock().get(id).cloned()
    }

    fn take(&self, id: &SessionId) -> Option<Arc<StreamableSession>> {
        self.lock().remove(id)
    }

    fn track(&self, id: &SessionId) {
        let binding = RegistryBinding::<StreamableSession>::new(self.registry.clone());
        let session = StreamableSession::new(id.as_ref(), binding.clone());
        binding.bind(&session);

        let shutdown = session.shutdown_token();
        let manager = self.this.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if let Err(err) = manager.close_session(&session_id).await {
                warn!(%err, session_id = %session_id, "failed to close streamable session");
            }
        });

        self.lock().insert(id.clone(), session);
    }
}

impl SessionManager for ObservedSessionManager {
    type Error = LocalSessionManagerError;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    async fn create_session(&self) -> Result<(SessionId, Self::Transport), Self::Error> {
        let (id, transport) = self.inner.create_session().await?;
        self.track(&id);
        debug!(session_id = %id, "streamable session created");
        Ok((id, transport))
    }

    async fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<ServerJsonRpcMessage, Self::Error> {
        match self.inner.initialize_session(id, message).await {
            Ok(response) => {
                if let Some(session) = self.get(id) {
                    session.mark_initialized();
                }
                Ok(response)
            }
            Err(err) => {
                if let Some(session) = self.take(id) {
                    session.close();
                }
                Err(err)
            }
        }
    }

    async fn has_session(&self, id: &SessionId) -> Result<bool, Self::Error> {
        self.inner.has_session(id).await
    }

    async fn close_session(&self, id: &SessionId) -> Result<(), Self::Error> {
        let result = self.inner.close_session(id).await;
        if let Some(session) = self.take(id) {
            session.close();
        }
        result
    }

    async fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        SessionManager::create_stream(&self.inner, id, message).await
    }

    async fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> Result<(), Self::Error> {
        self.inner.accept_message(id, message).await
    }

    async fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        SessionManager::create_standalone_stream(&self.inner, id).await
    }

    async fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error> {
        SessionManager::resume(&self.inner, id, last_event_id).await
    }
}
