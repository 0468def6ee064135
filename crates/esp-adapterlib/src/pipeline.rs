//! Contract between the bridge and the message pipeline it is embedded in.

use anyhow::Result as AnyResult;

use crate::event::DataItem;

/// One message handed to the pipeline for a received event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Key of the endpoint that produced the exchange (the window name).
    pub from_endpoint: String,
    pub body: Vec<DataItem>,
}

/// Downstream stage of a subscriber.
///
/// Called on the transport's callback thread, once per delivered event, in
/// delivery order.
pub trait Processor: Send + Sync {
    fn process(&self, exchange: Exchange) -> AnyResult<()>;
}

impl<F> Processor for F
where
    F: Fn(Exchange) -> AnyResult<()> + Send + Sync,
{
    fn process(&self, exchange: Exchange) -> AnyResult<()> {
        self(exchange)
    }
}
