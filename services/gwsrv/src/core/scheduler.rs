//! Poll Scheduler
//!
//! Single cooperative loop with a fixed delay between ticks. Each tick polls
//! every instantiated client in creation order, propagates the resulting
//! events and drains the pending report table. Upstream requests are served
//! between ticks on the same task.

use std::time::Duration;

use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::gateway::Gateway;
use super::upstream::{RequestReceiver, UpstreamServer};

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    poll_timeout: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration, poll_timeout: Duration) -> Self {
        Self {
            interval,
            poll_timeout,
        }
    }

    /// One poll/propagate/drain cycle
    ///
    /// A client whose `poll()` exceeds the poll timeout is abandoned for this
    /// tick; the remaining clients are still polled in order.
    pub async fn tick<U: UpstreamServer>(&self, gateway: &mut Gateway<U>) {
        for client in gateway.registry_mut().clients_mut() {
            if timeout(self.poll_timeout, client.poll()).await.is_err() {
                warn!(
                    "{} poll exceeded {:?}, continuing with next client",
                    client.scheme(),
                    self.poll_timeout
                );
            }
        }
        trace!("values polled");

        gateway.propagate();
        gateway.drain_reports();
    }

    /// Run until `shutdown` is cancelled
    pub async fn run<U: UpstreamServer>(
        &self,
        gateway: &mut Gateway<U>,
        mut requests: RequestReceiver,
        shutdown: CancellationToken,
    ) {
        info!(
            "Scheduler running: interval {:?}, poll timeout {:?}",
            self.interval, self.poll_timeout
        );

        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }

                Some(request) = requests.recv() => {
                    gateway.serve(request).await;
                }

                () = &mut sleep => {
                    self.tick(gateway).await;
                    sleep.as_mut().reset(Instant::now() + self.interval);
                }
            }
        }
    }
}
