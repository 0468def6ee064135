use std::sync::Arc;

use esp_adapterlib::{BridgeError, EspClientHandler};
use esp_types::{split_options, EspAddress, EspEndpointConfig};
use tracing::debug;

use crate::endpoint::EspEndpoint;
use crate::health::EngineHealth;

/// Creates [`EspEndpoint`]s from uris.
///
/// All endpoints created by one component talk to the engine through the same
/// client handler and share one [`EngineHealth`] flag.
pub struct EspComponent {
    handler: Arc<dyn EspClientHandler>,
    health: Arc<EngineHealth>,
}

impl EspComponent {
    pub fn new(handler: Arc<dyn EspClientHandler>) -> Self {
        Self::with_health(handler, Arc::new(EngineHealth::new()))
    }

    pub fn with_health(handler: Arc<dyn EspClientHandler>, health: Arc<EngineHealth>) -> Self {
        Self { handler, health }
    }

    pub fn health(&self) -> &Arc<EngineHealth> {
        &self.health
    }

    /// Parses `uri` (`dfESP://host:port/project/cq/window[?options]`) and
    /// creates an endpoint for it.
    pub fn create_endpoint(&self, uri: &str) -> Result<Arc<EspEndpoint>, BridgeError> {
        let (address, options) = split_options(uri);
        let address = EspAddress::parse(address)?;
        let config = EspEndpointConfig::from_query(options)?;
        debug!("creating ESP endpoint {address} with {config:?}");
        Ok(Arc::new(EspEndpoint::new(
            address,
            config,
            self.handler.clone(),
            self.health.clone(),
        )))
    }
}

#[cfg(test)]
mod test {
    use super::EspComponent;
    use crate::transport::LoopbackEngine;
    use esp_adapterlib::{BridgeError, ErrorKind};
    use esp_types::{InsertMode, Opcode};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn create_endpoint() {
        let component = EspComponent::new(Arc::new(LoopbackEngine::new()));
        let endpoint = component
            .create_endpoint("dfESP://localhost:55555/trades/cq/orders?mode=upsert&quiesce=true")
            .unwrap();
        assert_eq!(endpoint.uri(), "dfESP://localhost:55555/trades/cq/orders");
        assert_eq!(endpoint.endpoint_key(), "orders");
        assert_eq!(endpoint.project_url(), "dfESP://localhost:55555/trades");
        assert_eq!(endpoint.config().mode, Some(InsertMode::Upsert));
        assert!(endpoint.config().quiesce);

        let endpoint = component
            .create_endpoint("dfESP://localhost:55555/trades/cq/fills?subscribeMode=insert")
            .unwrap();
        assert_eq!(endpoint.config().subscribe_mode, Some(Opcode::Insert));
        assert_eq!(endpoint.config().mode, None);
    }

    #[test]
    fn endpoints_share_health() {
        let component = EspComponent::new(Arc::new(LoopbackEngine::new()));
        let a = component.create_endpoint("dfESP://h:1/p/q/a").unwrap();
        let b = component.create_endpoint("dfESP://h:1/p/q/b").unwrap();
        a.health().mark_down();
        assert!(b.health().is_down());
        assert!(b.status().engine_down);
    }

    #[test]
    fn configuration_errors() {
        let component = EspComponent::new(Arc::new(LoopbackEngine::new()));
        let err = component
            .create_endpoint("dfESP://localhost:55555/trades/orders")
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::InvalidAddress(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err
            .to_string()
            .contains("does not match required pattern"));

        let err = component
            .create_endpoint("dfESP://localhost:55555/trades/cq/orders?mode=merge")
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::InvalidOptions(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn publisher_requires_mode() {
        let component = EspComponent::new(Arc::new(LoopbackEngine::new()));
        let endpoint = component.create_endpoint("dfESP://h:1/p/q/w").unwrap();
        let err = endpoint.create_publisher().err().unwrap();
        assert!(matches!(err, BridgeError::ModeNotSet { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
