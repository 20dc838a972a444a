//! [`SignatureServer`]: the service object owning the durable store, the
//! pipeline status and the listener configuration.
//!
//! One call to [`SignatureServer::serve`] is one pipeline generation: a
//! fresh observation queue, a fresh staging area, the acceptor task and the
//! merge loop on a blocking thread. [`SignatureServer::run_supervised`]
//! restarts generations forever; committed contracts survive a restart,
//! staged ones do not.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use sigtrace_core::{CallObservation, Contract, MethodIdentity};
use sigtrace_storage::SignatureStore;

use crate::acceptor::accept_connections;
use crate::config::{ServerConfig, AUTO_ASSIGNED_PORT};
use crate::error::ServerError;
use crate::merge_loop::MergeLoop;
use crate::queue::observation_queue;
use crate::state::ServerState;

/// Delay between a failed generation and the next one.
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

pub struct SignatureServer<S> {
    config: Arc<ServerConfig>,
    state: Arc<ServerState<S>>,
    /// Port resolved by the last successful bind, 0 until then
    resolved_port: Arc<AtomicU16>,
}

impl<S> Clone for SignatureServer<S> {
    fn clone(&self) -> Self {
        SignatureServer {
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            resolved_port: Arc::clone(&self.resolved_port),
        }
    }
}

impl<S> SignatureServer<S>
where
    S: SignatureStore + Send + 'static,
{
    pub fn new(config: ServerConfig, store: S) -> Self {
        SignatureServer {
            config: Arc::new(config),
            state: Arc::new(ServerState::new(store)),
            resolved_port: Arc::new(AtomicU16::new(AUTO_ASSIGNED_PORT)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener. After the first bind the resolved port is reused,
    /// so a restarted generation keeps an auto-assigned port.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let port = self.port().unwrap_or(self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), port)).await?;
        let resolved = listener.local_addr()?.port();
        self.resolved_port.store(resolved, Ordering::Relaxed);
        info!(port = resolved, "sigtrace server listening");
        Ok(listener)
    }

    /// The bound port, once [`SignatureServer::bind`] has succeeded.
    pub fn port(&self) -> Option<u16> {
        match self.resolved_port.load(Ordering::Relaxed) {
            AUTO_ASSIGNED_PORT => None,
            port => Some(port),
        }
    }

    /// Runs one pipeline generation on `listener`. Returns only when the
    /// merge loop stops, which happens on a fatal error.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.state.clear_poison();
        let (producer, consumer) = observation_queue(self.config.queue_capacity);
        let merge_loop = MergeLoop::new(consumer, Arc::clone(&self.state), self.config.flush_threshold);

        let merge_task = tokio::task::spawn_blocking(move || merge_loop.run());
        let acceptor = tokio::spawn(accept_connections(listener, producer, Arc::clone(&self.state)));

        let result = match merge_task.await {
            Ok(result) => result,
            Err(err) => Err(ServerError::MergeLoopPanicked(err.to_string())),
        };
        acceptor.abort();
        // Wait for the listener to be dropped so the port can be rebound.
        let _ = acceptor.await;
        result
    }

    /// Binds and serves one generation.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Runs generations forever, restarting after each failure.
    pub async fn run_supervised(&self) {
        loop {
            match self.run().await {
                Ok(()) => warn!("pipeline stopped, restarting"),
                Err(err) => error!(error = %err, "pipeline failed, restarting"),
            }
            tokio::time::sleep(RESTART_BACKOFF).await;
        }
    }

    /// A copy of the committed contract for `method`.
    pub fn get_contract(&self, method: &MethodIdentity) -> Result<Option<Contract>, ServerError> {
        let mut store = self.state.lock_store()?;
        Ok(store.get_signature(method)?.map(|info| info.contract))
    }

    /// The committed contract of `owner#method_name`, if that method is
    /// registered.
    pub fn get_contract_by_owner_and_method_name(
        &self,
        method_name: &str,
        owner: &str,
    ) -> Result<Option<Contract>, ServerError> {
        match self.find_method(owner, method_name)? {
            Some(method) => self.get_contract(&method),
            None => Ok(None),
        }
    }

    /// Looks up a registered method of `owner` by name.
    pub fn find_method(&self, owner: &str, method_name: &str) -> Result<Option<MethodIdentity>, ServerError> {
        Ok(self
            .registered_methods(owner)?
            .into_iter()
            .find(|method| method.name == method_name))
    }

    pub fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, ServerError> {
        Ok(self.state.lock_store()?.registered_methods(owner)?)
    }

    pub fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, ServerError> {
        Ok(self.state.lock_store()?.calls_for_method(method)?)
    }

    /// True whenever work is queued or in flight since the last idle flush.
    /// May lag behind the queue; wait on committed data instead.
    pub fn is_processing_requests(&self) -> bool {
        self.state.status.is_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtrace_storage::InMemoryStore;

    fn test_config() -> ServerConfig {
        ServerConfig::default().with_port(AUTO_ASSIGNED_PORT)
    }

    #[tokio::test]
    async fn test_port_unknown_until_bound() {
        let server = SignatureServer::new(test_config(), InMemoryStore::new());
        assert_eq!(server.port(), None);
        let listener = server.bind().await.unwrap();
        let port = server.port().unwrap();
        assert_ne!(port, 0);
        assert_eq!(listener.local_addr().unwrap().port(), port);
        assert_eq!(server.clone().port(), Some(port));
    }

    #[tokio::test]
    async fn test_rebind_reuses_resolved_port() {
        let server = SignatureServer::new(test_config(), InMemoryStore::new());
        let first = server.bind().await.unwrap();
        let port = server.port().unwrap();
        drop(first);
        let _second = server.bind().await.unwrap();
        assert_eq!(server.port(), Some(port));
    }

    #[test]
    fn test_queries_on_empty_store() {
        let server = SignatureServer::new(test_config(), InMemoryStore::new());
        let method = MethodIdentity::new("Foo", "bar");
        assert!(server.get_contract(&method).unwrap().is_none());
        assert!(server.find_method("Foo", "bar").unwrap().is_none());
        assert!(server.get_contract_by_owner_and_method_name("bar", "Foo").unwrap().is_none());
        assert!(server.calls_for_method(&method).unwrap().is_empty());
        assert!(!server.is_processing_requests());
    }
}
