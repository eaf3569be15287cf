//! Provider data shared with resources and data sources

use crate::api::{ApiError, Client};
use std::fmt;
use std::sync::Arc;
use tf_provider::Diagnostics;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct PowerPlatformProviderData {
    pub client: Arc<Client>,
}

impl PowerPlatformProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

/// Slot filled by `configure` and read by every resource and data source.
/// Resources are built before the provider is configured, so they hold the
/// handle rather than the client itself.
#[derive(Clone, Default)]
pub struct ProviderHandle {
    inner: Arc<RwLock<Option<PowerPlatformProviderData>>>,
}

impl ProviderHandle {
    pub fn configured(client: Client) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(PowerPlatformProviderData::new(client)))),
        }
    }

    pub async fn set(&self, data: PowerPlatformProviderData) {
        *self.inner.write().await = Some(data);
    }

    pub async fn is_configured(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// The configured client, or a `Provider not configured` diagnostic
    pub async fn client(&self, diags: &mut Diagnostics) -> Option<Arc<Client>> {
        match self.inner.read().await.as_ref() {
            Some(data) => Some(data.client.clone()),
            None => {
                diags.root_error(
                    "Provider not configured",
                    "Provider data was not properly configured",
                );
                None
            }
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle").finish_non_exhaustive()
    }
}

/// Log a client failure and turn it into an error diagnostic
pub fn client_error(diags: &mut Diagnostics, summary: impl Into<String>, err: &ApiError) {
    let summary = summary.into();
    tracing::error!("{}: {}", summary, err);
    diags.root_error(summary, err.to_string());
}
