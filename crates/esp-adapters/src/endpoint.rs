use std::sync::Arc;

use esp_adapterlib::{BridgeError, EspClientHandler, Processor};
use esp_types::{EspAddress, EspEndpointConfig};

use crate::health::EngineHealth;
use crate::metrics::{EndpointMetrics, EndpointStatus};
use crate::publisher::EspPublisher;
use crate::subscriber::EspSubscriber;

/// One stream window together with its options and counters.
///
/// Publishers and subscribers created from the same endpoint share its
/// counters, but each opens its own connection to the engine.
pub struct EspEndpoint {
    address: EspAddress,
    config: EspEndpointConfig,
    handler: Arc<dyn EspClientHandler>,
    health: Arc<EngineHealth>,
    metrics: EndpointMetrics,
}

impl EspEndpoint {
    pub fn new(
        address: EspAddress,
        config: EspEndpointConfig,
        handler: Arc<dyn EspClientHandler>,
        health: Arc<EngineHealth>,
    ) -> Self {
        Self {
            address,
            config,
            handler,
            health,
            metrics: EndpointMetrics::new(),
        }
    }

    pub fn address(&self) -> &EspAddress {
        &self.address
    }

    /// Effective address of this endpoint, without options.
    pub fn uri(&self) -> String {
        self.address.to_string()
    }

    /// Key under which the endpoint is registered: the window name, or the
    /// whole uri if the window name is blank.
    pub fn endpoint_key(&self) -> String {
        if self.address.window.trim().is_empty() {
            self.uri()
        } else {
            self.address.window.clone()
        }
    }

    /// Url of the project this window belongs to.
    pub fn project_url(&self) -> String {
        self.address.project_url()
    }

    pub fn config(&self) -> &EspEndpointConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<EngineHealth> {
        &self.health
    }

    pub(crate) fn handler(&self) -> &dyn EspClientHandler {
        self.handler.as_ref()
    }

    pub fn metrics(&self) -> &EndpointMetrics {
        &self.metrics
    }

    pub fn reset_sent_counter(&self) {
        self.metrics.reset_sent();
    }

    pub fn reset_received_counter(&self) {
        self.metrics.reset_received();
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            uri: self.uri(),
            endpoint_key: self.endpoint_key(),
            engine_down: self.health.is_down(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Creates a publisher for this window. Fails if no insert mode is
    /// configured.
    pub fn create_publisher(self: &Arc<Self>) -> Result<EspPublisher, BridgeError> {
        EspPublisher::new(self.clone())
    }

    /// Creates a subscriber that hands every received event to `processor`.
    pub fn create_subscriber(self: &Arc<Self>, processor: Arc<dyn Processor>) -> EspSubscriber {
        EspSubscriber::new(self.clone(), processor)
    }
}
