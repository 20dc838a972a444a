//! Connection acceptor: one reader task per accepted connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use sigtrace_storage::SignatureStore;

use crate::queue::QueueProducer;
use crate::reader::read_records;
use crate::state::ServerState;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before the next accept after a failed one. Doubles per consecutive
/// failure up to [`MAX_ACCEPT_BACKOFF`] and resets on success.
#[derive(Debug, Default)]
struct AcceptBackoff {
    current: Option<Duration>,
}

impl AcceptBackoff {
    fn on_error(&mut self) -> Duration {
        let next = match self.current {
            None => MIN_ACCEPT_BACKOFF,
            Some(current) => (current * 2).min(MAX_ACCEPT_BACKOFF),
        };
        self.current = Some(next);
        next
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

/// Accepts connections forever, spawning a reader task for each one.
///
/// Handler ids ascend from 0. Accept errors are logged and the loop goes
/// on after a growing delay, so a persistent error such as descriptor
/// exhaustion does not spin.
pub async fn accept_connections<S>(listener: TcpListener, queue: QueueProducer, state: Arc<ServerState<S>>)
where
    S: SignatureStore + Send + 'static,
{
    let mut next_handler: u64 = 0;
    let mut backoff = AcceptBackoff::default();
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => {
                backoff.reset();
                accepted
            }
            Err(err) => {
                let delay = backoff.on_error();
                error!(error = %err, delay_ms = delay.as_millis() as u64, "failed to accept connection");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let handler = next_handler;
        next_handler += 1;
        info!(handler, %peer, "new connection");

        let queue = queue.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match read_records(socket, handler, &queue, &state.status).await {
                Ok(records) => info!(handler, records, "connection closed"),
                Err(err) => error!(handler, error = %err, "error handling connection"),
            }
            let timings = state.status.timings();
            info!(
                handler,
                read_ms = timings.read.as_secs_f64() * 1e3,
                decode_ms = timings.decode.as_secs_f64() * 1e3,
                merge_ms = timings.merge.as_secs_f64() * 1e3,
                "pipeline stats"
            );
        });
    }
}
