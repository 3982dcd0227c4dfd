//! Session establishment with retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use contracts::SourceAnnouncement;

use crate::client::HostClient;
use crate::error::{HostGatewayError, Result};

/// Opens the host session and runs the initial source discovery.
///
/// The host may not be up yet when the broker starts, so session
/// opening retries on a fixed interval before giving up.
pub struct SessionDriver<H: HostClient> {
    client: Arc<H>,
    retry_interval: Duration,
    max_attempts: u32,
}

impl<H: HostClient> SessionDriver<H> {
    pub fn new(client: Arc<H>, session_retry_s: f64) -> Self {
        Self {
            client,
            retry_interval: Duration::from_secs_f64(session_retry_s.max(0.0)),
            max_attempts: 5,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Open the session, retrying on failure, then discover sources.
    #[instrument(name = "session_establish", skip(self))]
    pub async fn establish(&self) -> Result<Vec<SourceAnnouncement>> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.client.open_session().await {
                Ok(()) => {
                    let announcements = self.client.discover_sources().await?;
                    info!(attempt, sources = announcements.len(), "host session open");
                    return Ok(announcements);
                }
                Err(error) => {
                    warn!(attempt, max = self.max_attempts, %error, "session open failed");
                    last_error = Some(error);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_interval).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| HostGatewayError::session("session retries exhausted")))
    }

    /// Close the session, stopping all deliveries.
    pub async fn shutdown(&self) -> Result<()> {
        self.client.close_session().await
    }
}
