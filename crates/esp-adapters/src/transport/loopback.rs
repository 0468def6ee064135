//! In-process stand-in for an ESP engine.
//!
//! [`LoopbackEngine`] keeps windows, their contents and connected clients in
//! memory. Blocks injected by a publisher are applied to the window and
//! delivered synchronously to every subscriber connected to the same window,
//! on the publishing thread. Failure switches let callers reproduce the
//! engine being offline, refusing clients, rejecting blocks and so on.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result as AnyResult};
use esp_adapterlib::{
    ClientCallbacks, ClientFailure, ClientFailureCode, ClientId, EspClientHandler, EspEvent,
    EventBlock, GdStatus, Schema, SchemaError,
};
use esp_types::{split_options, Opcode};
use tracing::{debug, trace, warn};

struct Window {
    schema: Schema,
    /// Current rows, in insertion order.
    contents: Vec<EspEvent>,
    published: Vec<EventBlock>,
    queue_bound: Option<(usize, bool)>,
}

impl Window {
    fn key_of(&self, event: &EspEvent) -> Vec<String> {
        let keys: Vec<String> = self
            .schema
            .fields()
            .iter()
            .filter(|field| field.key)
            .filter_map(|field| event.values().get(field.position).cloned())
            .collect();
        if keys.is_empty() {
            event.values().to_vec()
        } else {
            keys
        }
    }

    fn apply(&mut self, event: &EspEvent) {
        let key = self.key_of(event);
        let existing = self
            .contents
            .iter()
            .position(|row| self.key_of(row) == key);
        // Rows are kept as inserts.
        let mut row = event.clone();
        row.opcode = Opcode::Insert;
        match (event.opcode, existing) {
            (Opcode::Insert | Opcode::Upsert | Opcode::Update, Some(index)) => {
                self.contents[index] = row;
            }
            (Opcode::Insert | Opcode::Upsert, None) => self.contents.push(row),
            (Opcode::Delete | Opcode::SafeDelete, Some(index)) => {
                self.contents.remove(index);
            }
            (Opcode::Update | Opcode::Delete | Opcode::SafeDelete, None) => {
                trace!("no row with key {key:?} for {} event", event.opcode);
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClientKind {
    Publisher,
    Subscriber { snapshot: bool },
}

struct Client {
    kind: ClientKind,
    window: String,
    callbacks: Arc<dyn ClientCallbacks>,
    connected: bool,
}

#[derive(Default)]
struct Inner {
    windows: HashMap<String, Window>,
    clients: BTreeMap<ClientId, Client>,
    next_client: u64,
    offline: bool,
    refuse_clients: bool,
    refuse_connections: bool,
    refuse_queue_bound: bool,
    reject_publish: bool,
    quiesce_failure: bool,
    quiesced: Vec<String>,
    disconnected: Vec<ClientId>,
}

impl Inner {
    fn subscribers_of(&self, window: &str) -> Vec<Arc<dyn ClientCallbacks>> {
        self.clients
            .values()
            .filter(|client| {
                client.connected
                    && client.window == window
                    && matches!(client.kind, ClientKind::Subscriber { .. })
            })
            .map(|client| client.callbacks.clone())
            .collect()
    }

    fn add_client(
        &mut self,
        kind: ClientKind,
        window: &str,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Option<ClientId> {
        if self.refuse_clients {
            return None;
        }
        self.next_client += 1;
        let id = ClientId(self.next_client);
        self.clients.insert(
            id,
            Client {
                kind,
                window: window.to_string(),
                callbacks,
                connected: false,
            },
        );
        debug!("created {kind:?} {id} for {window}");
        Some(id)
    }
}

/// In-memory [`EspClientHandler`].
#[derive(Default)]
pub struct LoopbackEngine {
    inner: Mutex<Inner>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates (or replaces) the window at `url` with the given schema
    /// descriptor.
    pub fn add_window(&self, url: &str, descriptor: &str) -> Result<(), SchemaError> {
        let schema = Schema::parse(descriptor)?;
        self.inner().windows.insert(
            url.to_string(),
            Window {
                schema,
                contents: Vec::new(),
                published: Vec::new(),
                queue_bound: None,
            },
        );
        Ok(())
    }

    /// Blocks published to the window at `url`, in publish order.
    pub fn published(&self, url: &str) -> Vec<EventBlock> {
        self.inner()
            .windows
            .get(url)
            .map(|window| window.published.clone())
            .unwrap_or_default()
    }

    /// Current rows of the window at `url`.
    pub fn contents(&self, url: &str) -> Vec<EspEvent> {
        self.inner()
            .windows
            .get(url)
            .map(|window| window.contents.clone())
            .unwrap_or_default()
    }

    /// Project urls quiesced so far.
    pub fn quiesced(&self) -> Vec<String> {
        self.inner().quiesced.clone()
    }

    pub fn queue_bound(&self, url: &str) -> Option<(usize, bool)> {
        self.inner()
            .windows
            .get(url)
            .and_then(|window| window.queue_bound)
    }

    pub fn connected_clients(&self) -> usize {
        self.inner()
            .clients
            .values()
            .filter(|client| client.connected)
            .count()
    }

    pub fn disconnected(&self) -> Vec<ClientId> {
        self.inner().disconnected.clone()
    }

    /// Metadata queries and connection attempts fail while offline.
    pub fn set_offline(&self, offline: bool) {
        self.inner().offline = offline;
    }

    pub fn refuse_clients(&self, refuse: bool) {
        self.inner().refuse_clients = refuse;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.inner().refuse_connections = refuse;
    }

    pub fn refuse_queue_bound(&self, refuse: bool) {
        self.inner().refuse_queue_bound = refuse;
    }

    /// Makes [`EspClientHandler::publisher_inject`] refuse blocks.
    pub fn reject_publish(&self, reject: bool) {
        self.inner().reject_publish = reject;
    }

    pub fn set_quiesce_failure(&self, fail: bool) {
        self.inner().quiesce_failure = fail;
    }

    /// Reports a transport error to every connected client.
    pub fn fail(&self, failure: ClientFailure, code: ClientFailureCode) {
        let callbacks: Vec<Arc<dyn ClientCallbacks>> = self
            .inner()
            .clients
            .values()
            .filter(|client| client.connected)
            .map(|client| client.callbacks.clone())
            .collect();
        for callbacks in callbacks {
            callbacks.on_transport_error(failure, code);
        }
    }

    /// Delivers `block` to the subscribers of the window at `url` without
    /// applying it to the window. Returns the number of subscribers that
    /// processed the block without error.
    pub fn deliver(&self, url: &str, block: &EventBlock) -> usize {
        let (schema, subscribers) = {
            let inner = self.inner();
            let Some(window) = inner.windows.get(url) else {
                return 0;
            };
            (window.schema.clone(), inner.subscribers_of(url))
        };
        deliver_to(&subscribers, block, &schema)
    }
}

fn deliver_to(subscribers: &[Arc<dyn ClientCallbacks>], block: &EventBlock, schema: &Schema) -> usize {
    let mut delivered = 0;
    for subscriber in subscribers {
        match subscriber.on_event_block(block, schema) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("subscriber failed to process block {}: {e}", block.id()),
        }
    }
    delivered
}

impl EspClientHandler for LoopbackEngine {
    fn query_meta(&self, url: &str) -> AnyResult<Option<Vec<String>>> {
        let inner = self.inner();
        if inner.offline {
            return Err(anyhow!("connection refused"));
        }
        let (window, _) = split_options(url);
        Ok(inner
            .windows
            .get(window)
            .map(|window| vec![window.schema.descriptor()]))
    }

    fn publisher_start(&self, url: &str, callbacks: Arc<dyn ClientCallbacks>) -> Option<ClientId> {
        let (window, _) = split_options(url);
        self.inner()
            .add_client(ClientKind::Publisher, window, callbacks)
    }

    fn subscriber_start(
        &self,
        url: &str,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Option<ClientId> {
        let (window, options) = split_options(url);
        let snapshot = options
            .split('&')
            .any(|option| option == "snapshot=true");
        self.inner()
            .add_client(ClientKind::Subscriber { snapshot }, window, callbacks)
    }

    fn subscriber_max_queue_size(&self, url: &str, max_size: usize, block: bool) -> bool {
        let mut inner = self.inner();
        if inner.refuse_queue_bound {
            return false;
        }
        match inner.windows.get_mut(url) {
            Some(window) => {
                window.queue_bound = Some((max_size, block));
                true
            }
            None => false,
        }
    }

    fn connect(&self, client: ClientId) -> AnyResult<()> {
        let snapshot = {
            let mut inner = self.inner();
            if inner.offline || inner.refuse_connections {
                return Err(anyhow!("connection refused"));
            }
            let Some(entry) = inner.clients.get_mut(&client) else {
                return Err(anyhow!("unknown client {client}"));
            };
            entry.connected = true;
            let kind = entry.kind;
            let callbacks = entry.callbacks.clone();
            let window = entry.window.clone();

            match (kind, inner.windows.get(&window)) {
                (ClientKind::Subscriber { snapshot: true }, Some(window))
                    if !window.contents.is_empty() =>
                {
                    Some((
                        callbacks,
                        EventBlock::new(window.contents.clone()),
                        window.schema.clone(),
                    ))
                }
                _ => None,
            }
        };

        if let Some((callbacks, block, schema)) = snapshot {
            debug!("sending snapshot of {} rows to {client}", block.len());
            deliver_to(&[callbacks], &block, &schema);
        }
        Ok(())
    }

    fn publisher_inject(&self, client: ClientId, block: &EventBlock) -> bool {
        let (publisher, subscribers, schema) = {
            let mut inner = self.inner();
            if inner.reject_publish {
                return false;
            }
            let Some(entry) = inner.clients.get(&client) else {
                return false;
            };
            if !entry.connected || entry.kind != ClientKind::Publisher {
                return false;
            }
            let publisher = entry.callbacks.clone();
            let window_url = entry.window.clone();
            let subscribers = inner.subscribers_of(&window_url);

            let Some(window) = inner.windows.get_mut(&window_url) else {
                return false;
            };
            let field_count = window.schema.field_count();
            if let Some(event) = block
                .events()
                .iter()
                .find(|event| event.values().len() != field_count)
            {
                warn!(
                    "rejecting block {} for {window_url}: event has {} fields, window has {field_count}",
                    block.id(),
                    event.values().len()
                );
                return false;
            }
            for event in block.events() {
                window.apply(event);
            }
            window.published.push(block.clone());
            (publisher, subscribers, window.schema.clone())
        };

        deliver_to(&subscribers, block, &schema);
        publisher.on_delivery_status(GdStatus::Ack, block.id());
        true
    }

    fn quiesce_project(&self, project_url: &str, _client: ClientId) -> AnyResult<()> {
        let mut inner = self.inner();
        if inner.quiesce_failure {
            return Err(anyhow!("quiesce of {project_url} timed out"));
        }
        inner.quiesced.push(project_url.to_string());
        Ok(())
    }

    fn disconnect(&self, client: ClientId, _flush: bool) -> AnyResult<()> {
        let mut inner = self.inner();
        inner
            .clients
            .remove(&client)
            .ok_or_else(|| anyhow!("unknown client {client}"))?;
        inner.disconnected.push(client);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::LoopbackEngine;
    use crate::test::{RecordingProcessor, PEOPLE_SCHEMA, PEOPLE_URI};
    use esp_adapterlib::{
        BridgeError, ClientCallbacks, ClientFailure, ClientFailureCode, EspClientHandler,
        EspEvent, EventBlock, GdStatus, Schema,
    };
    use esp_types::{EventFlags, Opcode};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        blocks: Mutex<Vec<u64>>,
        statuses: Mutex<Vec<(GdStatus, u64)>>,
        errors: Mutex<Vec<ClientFailureCode>>,
    }

    impl ClientCallbacks for Recorder {
        fn on_event_block(&self, block: &EventBlock, _schema: &Schema) -> Result<(), BridgeError> {
            self.blocks.lock().unwrap().push(block.id());
            Ok(())
        }

        fn on_transport_error(&self, _failure: ClientFailure, code: ClientFailureCode) {
            self.errors.lock().unwrap().push(code);
        }

        fn on_delivery_status(&self, status: GdStatus, block_id: u64) {
            self.statuses.lock().unwrap().push((status, block_id));
        }
    }

    fn row(opcode: Opcode, values: &[&str]) -> EspEvent {
        EspEvent::new(
            &Schema::parse(PEOPLE_SCHEMA).unwrap(),
            opcode,
            EventFlags::Normal,
            values.iter().map(|v| v.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn inject_applies_and_forwards() {
        let engine = LoopbackEngine::new();
        engine.add_window(PEOPLE_URI, PEOPLE_SCHEMA).unwrap();

        let publisher = Arc::new(Recorder::default());
        let subscriber = Arc::new(Recorder::default());
        let p = engine.publisher_start(PEOPLE_URI, publisher.clone()).unwrap();
        let s = engine
            .subscriber_start(&format!("{PEOPLE_URI}?snapshot=true"), subscriber.clone())
            .unwrap();
        engine.connect(p).unwrap();
        engine.connect(s).unwrap();
        assert_eq!(engine.connected_clients(), 2);

        let block = EventBlock::new(vec![
            row(Opcode::Insert, &["1", "Alice", "30"]),
            row(Opcode::Insert, &["2", "Bob", "40"]),
            row(Opcode::Upsert, &["1", "Alice", "31"]),
            row(Opcode::Delete, &["2", "Bob", "40"]),
        ]);
        assert!(engine.publisher_inject(p, &block));

        assert_eq!(*subscriber.blocks.lock().unwrap(), vec![block.id()]);
        assert_eq!(
            *publisher.statuses.lock().unwrap(),
            vec![(GdStatus::Ack, block.id())]
        );
        let contents: Vec<String> = engine
            .contents(PEOPLE_URI)
            .iter()
            .map(|event| event.to_csv(','))
            .collect();
        assert_eq!(contents, vec!["I,N:1,Alice,31"]);
        assert_eq!(engine.published(PEOPLE_URI).len(), 1);
    }

    #[test]
    fn snapshot_on_connect() {
        let engine = LoopbackEngine::new();
        engine.add_window(PEOPLE_URI, PEOPLE_SCHEMA).unwrap();
        let publisher = engine
            .publisher_start(PEOPLE_URI, Arc::new(Recorder::default()))
            .unwrap();
        engine.connect(publisher).unwrap();
        engine.publisher_inject(
            publisher,
            &EventBlock::new(vec![row(Opcode::Insert, &["1", "Alice", "30"])]),
        );

        let with_snapshot = Arc::new(Recorder::default());
        let client = engine
            .subscriber_start(&format!("{PEOPLE_URI}?snapshot=true"), with_snapshot.clone())
            .unwrap();
        engine.connect(client).unwrap();
        assert_eq!(with_snapshot.blocks.lock().unwrap().len(), 1);

        let without_snapshot = Arc::new(Recorder::default());
        let client = engine
            .subscriber_start(&format!("{PEOPLE_URI}?snapshot=false"), without_snapshot.clone())
            .unwrap();
        engine.connect(client).unwrap();
        assert!(without_snapshot.blocks.lock().unwrap().is_empty());
    }

    #[test]
    fn switches() {
        let engine = LoopbackEngine::new();
        engine.add_window(PEOPLE_URI, PEOPLE_SCHEMA).unwrap();
        assert_eq!(
            engine.query_meta(&format!("{PEOPLE_URI}?get=schema")).unwrap(),
            Some(vec![PEOPLE_SCHEMA.to_string()])
        );
        assert_eq!(
            engine.query_meta("dfESP://localhost:5555/people/cq/nope?get=schema").unwrap(),
            None
        );

        engine.set_offline(true);
        assert!(engine.query_meta(PEOPLE_URI).is_err());
        engine.set_offline(false);

        let recorder = Arc::new(Recorder::default());
        let client = engine.publisher_start(PEOPLE_URI, recorder.clone()).unwrap();
        // Not connected yet.
        assert!(!engine.publisher_inject(client, &EventBlock::new(Vec::new())));
        engine.connect(client).unwrap();
        engine.reject_publish(true);
        assert!(!engine.publisher_inject(client, &EventBlock::new(Vec::new())));
        engine.reject_publish(false);

        engine.fail(ClientFailure::ServerDisconnect, ClientFailureCode::ReadFailed);
        assert_eq!(
            *recorder.errors.lock().unwrap(),
            vec![ClientFailureCode::ReadFailed]
        );

        engine.disconnect(client, true).unwrap();
        assert!(engine.disconnect(client, true).is_err());
        assert_eq!(engine.disconnected(), vec![client]);
        assert_eq!(engine.connected_clients(), 0);
    }

    #[test]
    fn block_for_replaced_schema_is_rejected() {
        let engine = LoopbackEngine::new();
        engine.add_window(PEOPLE_URI, PEOPLE_SCHEMA).unwrap();
        let publisher = Arc::new(Recorder::default());
        let client = engine.publisher_start(PEOPLE_URI, publisher.clone()).unwrap();
        engine.connect(client).unwrap();

        engine
            .add_window(PEOPLE_URI, "id:int32,name:string,age:int32,k*:string")
            .unwrap();
        let block = EventBlock::new(vec![row(Opcode::Insert, &["1", "Alice", "30"])]);
        assert!(!engine.publisher_inject(client, &block));
        assert!(engine.published(PEOPLE_URI).is_empty());
        assert!(engine.contents(PEOPLE_URI).is_empty());
        assert!(publisher.statuses.lock().unwrap().is_empty());
    }

    #[test]
    fn deliver_reports_processed_subscribers() {
        use crate::component::EspComponent;

        let engine = Arc::new(LoopbackEngine::new());
        engine.add_window(PEOPLE_URI, PEOPLE_SCHEMA).unwrap();
        let component = EspComponent::new(engine.clone());
        let endpoint = component.create_endpoint(PEOPLE_URI).unwrap();
        let processor = Arc::new(RecordingProcessor::default());
        let mut subscriber = endpoint.create_subscriber(processor.clone());
        subscriber.start().unwrap();

        let good = EventBlock::new(vec![row(Opcode::Insert, &["1", "Alice", "30"])]);
        assert_eq!(engine.deliver(PEOPLE_URI, &good), 1);
        assert_eq!(processor.exchanges().len(), 1);
        assert!(engine.contents(PEOPLE_URI).is_empty());

        assert_eq!(engine.deliver("dfESP://localhost:5555/people/cq/nope", &good), 0);
    }
}
