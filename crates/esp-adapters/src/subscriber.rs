use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic::Atomic;
use bytemuck::NoUninit;
use esp_adapterlib::{
    BridgeError, ClientCallbacks, ClientFailure, ClientFailureCode, ClientId, EventBlock,
    Exchange, GdStatus, Processor, Schema,
};
use serde::Serialize;
use tracing::{debug, error, info, info_span, span::EnteredSpan, trace, warn};

use crate::codec::decode_inbound;
use crate::endpoint::EspEndpoint;

/// Life cycle of an [`EspSubscriber`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, NoUninit)]
#[repr(u8)]
pub enum SubscriberState {
    NotStarted,
    /// Connected, no block received yet.
    Connected,
    Receiving,
    Stopped,
}

/// Receives event blocks from a stream window and forwards one [`Exchange`]
/// per event to a [`Processor`].
///
/// Blocks are delivered on a thread owned by the client library. The
/// processor is called from that thread, one event at a time, in the order
/// the events appear in the block.
pub struct EspSubscriber {
    endpoint: Arc<EspEndpoint>,
    processor: Arc<dyn Processor>,
    state: Arc<Atomic<SubscriberState>>,
    client: Option<ClientId>,
}

impl EspSubscriber {
    pub(crate) fn new(endpoint: Arc<EspEndpoint>, processor: Arc<dyn Processor>) -> Self {
        info!("creating subscriber for endpoint {}", endpoint.uri());
        Self {
            endpoint,
            processor,
            state: Arc::new(Atomic::new(SubscriberState::NotStarted)),
            client: None,
        }
    }

    fn span(&self) -> EnteredSpan {
        info_span!("esp_input", window = %self.endpoint.address()).entered()
    }

    pub fn endpoint(&self) -> &Arc<EspEndpoint> {
        &self.endpoint
    }

    pub fn state(&self) -> SubscriberState {
        self.state.load(Ordering::Acquire)
    }

    /// Fetches the window schema, bounds the engine's subscriber queue and
    /// subscribes to the window.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.client.is_some() {
            self.stop();
        }

        let _guard = self.span();
        let address = self.endpoint.address();
        let config = self.endpoint.config();
        let handler = self.endpoint.handler();
        debug!("subscriber connecting to {address}");

        let schema = Schema::fetch(handler, address)?;

        if !handler.subscriber_max_queue_size(&address.to_string(), config.max_queue_size, true) {
            return Err(BridgeError::QueueBound {
                address: address.to_string(),
                max_queue_size: config.max_queue_size,
            });
        }

        let callbacks = Arc::new(SubscriberCallbacks {
            endpoint: self.endpoint.clone(),
            processor: self.processor.clone(),
            schema,
            state: self.state.clone(),
        });
        let client = handler
            .subscriber_start(&address.subscribe_url(config.snapshot), callbacks)
            .ok_or_else(|| BridgeError::ClientCreation {
                address: address.to_string(),
            })?;
        if let Err(error) = handler.connect(client) {
            if let Err(e) = handler.disconnect(client, false) {
                warn!("failed to release client {client:?} after connect failure: {e}");
            }
            return Err(BridgeError::Connect {
                address: address.to_string(),
                error,
            });
        }

        self.client = Some(client);
        self.state.store(SubscriberState::Connected, Ordering::Release);
        Ok(())
    }

    /// Disconnects from the engine. Errors are logged, not returned.
    pub fn stop(&mut self) {
        let _guard = self.span();
        if let Some(client) = self.client.take() {
            debug!("disconnecting subscriber from {}", self.endpoint.address());
            if let Err(e) = self.endpoint.handler().disconnect(client, true) {
                error!(
                    "error disconnecting subscriber from {}: {e}",
                    self.endpoint.address()
                );
            }
            self.state.store(SubscriberState::Stopped, Ordering::Release);
        }
    }
}

impl Drop for EspSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Callback sink of a subscribing client.
pub struct SubscriberCallbacks {
    endpoint: Arc<EspEndpoint>,
    processor: Arc<dyn Processor>,
    /// Schema fetched when the subscription was set up.
    schema: Schema,
    state: Arc<Atomic<SubscriberState>>,
}

impl SubscriberCallbacks {
    /// Decodes every event of `block` that passes the subscribe filter and
    /// forwards it downstream.
    ///
    /// Stops at the first event that cannot be decoded or is rejected by the
    /// processor; events before it have already been forwarded.
    pub fn on_block_received(&self, block: &EventBlock, schema: &Schema) -> Result<(), BridgeError> {
        let _guard = info_span!("esp_input", window = %self.endpoint.address()).entered();
        let metrics = self.endpoint.metrics();
        metrics.count_block_received();
        // Fails when already receiving or stopped; both are left as they are.
        self.state
            .compare_exchange(
                SubscriberState::Connected,
                SubscriberState::Receiving,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok();

        if schema != &self.schema {
            warn!(
                "schema delivered with block {} differs from the schema fetched at start ({}); decoding with the latter",
                block.id(),
                self.schema.descriptor()
            );
        }

        let config = self.endpoint.config();
        debug!("received block {} with {} events", block.id(), block.len());

        for (event_index, event) in block.events().iter().enumerate() {
            if let Some(opcode) = config.subscribe_mode {
                if event.opcode != opcode {
                    trace!("skipping event {event_index} with opcode {}", event.opcode);
                    continue;
                }
            }

            let text = event.to_csv(config.delimiter);
            trace!("event: {text}");
            let body = decode_inbound(&text, &self.schema, config.delimiter).map_err(|error| {
                BridgeError::Decode {
                    address: self.endpoint.uri(),
                    event_index,
                    error,
                }
            })?;

            self.processor
                .process(Exchange {
                    from_endpoint: self.endpoint.endpoint_key(),
                    body,
                })
                .map_err(|error| BridgeError::Downstream {
                    address: self.endpoint.uri(),
                    event_index,
                    error,
                })?;
            metrics.count_event_received();
        }

        Ok(())
    }
}

impl ClientCallbacks for SubscriberCallbacks {
    fn on_event_block(&self, block: &EventBlock, schema: &Schema) -> Result<(), BridgeError> {
        let result = self.on_block_received(block, schema);
        if let Err(e) = &result {
            error!("{e}");
        }
        result
    }

    fn on_transport_error(&self, failure: ClientFailure, code: ClientFailureCode) {
        error!(
            "subscriber for {} received error from ESP engine: {failure:?} with code {code:?}",
            self.endpoint.address()
        );
        if code.is_connection_failure() {
            info!("ESP engine seems to be down, setting engine down flag");
            self.endpoint.health().mark_down();
        }
    }

    fn on_delivery_status(&self, status: GdStatus, block_id: u64) {
        warn!("subscriber received unexpected {status:?} for event block id: {block_id}");
    }
}
