use std::sync::Arc;

use esp_adapterlib::{
    BridgeError, ClientCallbacks, ClientFailure, ClientFailureCode, ClientId, EventBlock,
    GdStatus, Schema,
};
use esp_types::InsertMode;
use tracing::{debug, error, info, info_span, span::EnteredSpan, trace, warn};

use crate::codec::encode_outbound;
use crate::endpoint::EspEndpoint;
use crate::mode;

struct Connection {
    schema: Schema,
    client: ClientId,
}

/// Publishes batches of delimited lines to a stream window.
///
/// Each call to [`EspPublisher::process`] turns one batch into at most one
/// event block. `process` takes `&mut self`, so a publisher never has more
/// than one batch in flight.
pub struct EspPublisher {
    endpoint: Arc<EspEndpoint>,
    mode: InsertMode,
    connection: Option<Connection>,
}

impl EspPublisher {
    pub(crate) fn new(endpoint: Arc<EspEndpoint>) -> Result<Self, BridgeError> {
        let uri = endpoint.uri();
        info!("creating publisher for endpoint {uri}");
        let mode = endpoint
            .config()
            .mode
            .ok_or_else(|| BridgeError::ModeNotSet { uri: uri.clone() })?;
        debug!("mode for endpoint {uri} set to {mode}");

        Ok(Self {
            endpoint,
            mode,
            connection: None,
        })
    }

    fn span(&self) -> EnteredSpan {
        info_span!("esp_output", window = %self.endpoint.address()).entered()
    }

    pub fn endpoint(&self) -> &Arc<EspEndpoint> {
        &self.endpoint
    }

    pub fn mode(&self) -> InsertMode {
        self.mode
    }

    pub fn is_started(&self) -> bool {
        self.connection.is_some()
    }

    /// Schema of the connected window.
    pub fn schema(&self) -> Option<&Schema> {
        self.connection.as_ref().map(|connection| &connection.schema)
    }

    /// Fetches the window schema and connects to the engine.
    ///
    /// Restarting a started publisher closes the old connection first and
    /// fetches the schema again.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.connection.is_some() {
            self.stop();
        }

        let _guard = self.span();
        let address = self.endpoint.address();
        debug!("publisher connecting to {address}");

        let handler = self.endpoint.handler();
        let schema = Schema::fetch(handler, address)?;

        let callbacks = Arc::new(PublisherCallbacks {
            uri: address.to_string(),
        });
        let client = handler
            .publisher_start(&address.to_string(), callbacks)
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

        self.connection = Some(Connection { schema, client });
        Ok(())
    }

    /// Publishes the lines of `batch` as one event block.
    ///
    /// Blank lines are skipped and an all-blank batch publishes nothing. When
    /// the endpoint has `quiesce` enabled, the project is quiesced after the
    /// block is published unless `split_complete` is `Some(false)`, i.e., the
    /// caller is in the middle of a multi-part input.
    ///
    /// Fails without touching the connection if the engine has been marked
    /// down. A line that does not fit the schema fails the whole batch before
    /// anything is published.
    pub fn process(&mut self, batch: &[u8], split_complete: Option<bool>) -> Result<(), BridgeError> {
        let _guard = self.span();

        if self.endpoint.health().is_down() {
            return Err(BridgeError::ConnectionLost);
        }

        let Some(connection) = &self.connection else {
            return Err(BridgeError::NotStarted {
                address: self.endpoint.uri(),
            });
        };

        let text = std::str::from_utf8(batch).map_err(|error| BridgeError::InvalidEncoding {
            address: self.endpoint.uri(),
            error,
        })?;

        let delimiter = self.endpoint.config().delimiter;
        let mut events = Vec::new();
        for (index, line) in batch_lines(text).enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (line_for_esp, prefix) =
                mode::prefix_for(self.mode, line, delimiter, mode::generate_id(self.mode));
            let event = encode_outbound(&line_for_esp, &prefix, &connection.schema, delimiter)
                .map_err(|error| BridgeError::Encode {
                    address: self.endpoint.uri(),
                    line_number: index + 1,
                    line: line.to_string(),
                    error,
                })?;
            trace!("added line for ESP: {prefix}{line_for_esp}");
            events.push(event);
        }

        // Don't send empty blocks.
        if events.is_empty() {
            return Ok(());
        }

        let block = EventBlock::new(events);
        self.publish_block(connection, &block);

        let metrics = self.endpoint.metrics();
        metrics.count_events_sent(block.len());
        metrics.count_block_sent();

        if self.endpoint.config().quiesce && split_complete.unwrap_or(true) {
            let project = self.endpoint.project_url();
            debug!("quiescing project {project}");
            self.endpoint
                .handler()
                .quiesce_project(&project, connection.client)
                .map_err(|error| BridgeError::Quiesce {
                    project,
                    address: self.endpoint.uri(),
                    error,
                })?;
        }

        Ok(())
    }

    fn publish_block(&self, connection: &Connection, block: &EventBlock) {
        debug!(
            "publishing block with id {} ({} events) to window {}",
            block.id(),
            block.len(),
            self.endpoint.address()
        );
        if !self
            .endpoint
            .handler()
            .publisher_inject(connection.client, block)
        {
            error!(
                "error sending event block {} to ESP engine, window: {}",
                block.id(),
                self.endpoint.address()
            );
        }
    }

    /// Disconnects from the engine. Errors are logged, not returned.
    pub fn stop(&mut self) {
        let _guard = self.span();
        if let Some(connection) = self.connection.take() {
            debug!("disconnecting publisher from {}", self.endpoint.address());
            if let Err(e) = self.endpoint.handler().disconnect(connection.client, true) {
                error!(
                    "error disconnecting publisher from {}: {e}",
                    self.endpoint.address()
                );
            }
        }
    }
}

impl Drop for EspPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lines of a batch. `\n`, `\r\n` and a lone `\r` all end a line.
fn batch_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').flat_map(|line| {
        line.strip_suffix('\r').unwrap_or(line).split('\r')
    })
}

/// Callback sink of a publishing client.
struct PublisherCallbacks {
    uri: String,
}

impl ClientCallbacks for PublisherCallbacks {
    fn on_event_block(&self, _block: &EventBlock, _schema: &Schema) -> Result<(), BridgeError> {
        warn!("publisher for {} received an event block; ignoring it", self.uri);
        Ok(())
    }

    fn on_transport_error(&self, failure: ClientFailure, code: ClientFailureCode) {
        error!(
            "publisher for {} received error from ESP engine: {failure:?} with code {code:?}",
            self.uri
        );
    }

    fn on_delivery_status(&self, status: GdStatus, block_id: u64) {
        debug!("received {status:?} for event block id: {block_id}");
    }
}
