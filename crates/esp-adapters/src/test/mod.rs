//! Test helpers and end-to-end tests.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result as AnyResult};
use esp_adapterlib::{ClientCallbacks, ClientId, EspClientHandler, EventBlock, Exchange, Processor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};


pub(crate) const PEOPLE_URI: &str = "dfESP://localhost:5555/people/cq/people";
pub(crate) const PEOPLE_SCHEMA: &str = "id*:int32,name:string,age:int32";

pub(crate) fn init_test_logger() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("debug"))
                .unwrap(),
        )
        .try_init();
}

mockall::mock! {
    pub ClientHandler {}

    impl EspClientHandler for ClientHandler {
        fn query_meta(&self, url: &str) -> AnyResult<Option<Vec<String>>>;
        fn publisher_start(&self, url: &str, callbacks: Arc<dyn ClientCallbacks>) -> Option<ClientId>;
        fn subscriber_start(&self, url: &str, callbacks: Arc<dyn ClientCallbacks>) -> Option<ClientId>;
        fn subscriber_max_queue_size(&self, url: &str, max_size: usize, block: bool) -> bool;
        fn connect(&self, client: ClientId) -> AnyResult<()>;
        fn publisher_inject(&self, client: ClientId, block: &EventBlock) -> bool;
        fn quiesce_project(&self, project_url: &str, client: ClientId) -> AnyResult<()>;
        fn disconnect(&self, client: ClientId, flush: bool) -> AnyResult<()>;
    }
}

/// Processor that records every exchange, optionally failing once a given
/// number of exchanges has been accepted.
#[derive(Default)]
pub(crate) struct RecordingProcessor {
    exchanges: Mutex<Vec<Exchange>>,
    fail_after: Option<usize>,
}

impl RecordingProcessor {
    pub(crate) fn failing_after(accepted: usize) -> Self {
        Self {
            exchanges: Mutex::new(Vec::new()),
            fail_after: Some(accepted),
        }
    }

    pub(crate) fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().unwrap().clone()
    }
}

impl Processor for RecordingProcessor {
    fn process(&self, exchange: Exchange) -> AnyResult<()> {
        let mut exchanges = self.exchanges.lock().unwrap();
        if self.fail_after == Some(exchanges.len()) {
            return Err(anyhow!("downstream route is closed"));
        }
        exchanges.push(exchange);
        Ok(())
    }
}
