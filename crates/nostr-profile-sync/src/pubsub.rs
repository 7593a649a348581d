use crate::Result;
use nostr::{EventId, Filter, Kind, PublicKey};
use std::fmt;
use std::sync::Arc;

/// Lets the relay pool skip events that were already handled, before they
/// reach [`crate::ProfileSync::handle_event`]. Called with the event id and
/// the relay url that delivered it.
pub type AlreadyHaveEvent = Arc<dyn Fn(&EventId, &str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SubscriptionRequest {
    pub relay_urls: Vec<String>,
    pub filter: Filter,
    pub skip_verification: bool,
    pub already_have_event: Option<AlreadyHaveEvent>,
}

impl fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("relay_urls", &self.relay_urls)
            .field("filter", &self.filter)
            .field("skip_verification", &self.skip_verification)
            .field("already_have_event", &self.already_have_event.is_some())
            .finish()
    }
}

/// Relay pool seen from the sync engine.
///
/// `subscribe` returns the subscription id. The implementation later feeds
/// matching events to [`crate::ProfileSync::handle_event`] and signals
/// end-of-stored-events through [`crate::ProfileSync::handle_eose`], both
/// tagged with that id.
///
/// Both methods are called while the coordinator holds its state lock, so
/// they must not deliver events synchronously.
pub trait SubscriptionTransport: Send + Sync {
    fn subscribe(&self, request: SubscriptionRequest) -> Result<String>;

    fn unsubscribe(&self, sub_id: &str) -> Result<()>;
}

/// Commands emitted by [`ChannelTransport`] for a relay pool running elsewhere.
#[derive(Debug, Clone)]
pub enum TransportCommand {
    Subscribe {
        sub_id: String,
        request: SubscriptionRequest,
    },
    Unsubscribe(String),
}

/// Forwards subscription requests over a channel.
pub struct ChannelTransport {
    command_tx: crossbeam_channel::Sender<TransportCommand>,
}

impl ChannelTransport {
    pub fn new(command_tx: crossbeam_channel::Sender<TransportCommand>) -> Self {
        Self { command_tx }
    }

    /// Transport plus the receiving end of its command channel.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<TransportCommand>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl SubscriptionTransport for ChannelTransport {
    fn subscribe(&self, request: SubscriptionRequest) -> Result<String> {
        let sub_id = format!("sub-{}", uuid::Uuid::new_v4());
        self.command_tx
            .send(TransportCommand::Subscribe {
                sub_id: sub_id.clone(),
                request,
            })
            .map_err(|_| crate::Error::Transport("Failed to send subscribe".to_string()))?;
        Ok(sub_id)
    }

    fn unsubscribe(&self, sub_id: &str) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Unsubscribe(sub_id.to_string()))
            .map_err(|_| crate::Error::Transport("Failed to send unsubscribe".to_string()))?;
        Ok(())
    }
}

/// Helper to build filters for this crate
pub fn build_filter() -> FilterBuilder {
    FilterBuilder::new()
}

pub struct FilterBuilder {
    kinds: Vec<Kind>,
    authors: Vec<PublicKey>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            kinds: Vec::new(),
            authors: Vec::new(),
        }
    }

    pub fn kinds(mut self, kinds: Vec<u32>) -> Self {
        self.kinds = kinds.into_iter().map(|k| Kind::from(k as u16)).collect();
        self
    }

    pub fn authors(mut self, authors: Vec<PublicKey>) -> Self {
        self.authors = authors;
        self
    }

    pub fn build(self) -> Filter {
        let mut filter = Filter::new();
        if !self.kinds.is_empty() {
            filter = filter.kinds(self.kinds);
        }
        if !self.authors.is_empty() {
            filter = filter.authors(self.authors);
        }
        filter
    }
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helpers for driving a [`ChannelTransport`] by hand in tests.
pub mod test_utils {
    use super::{SubscriptionRequest, TransportCommand};

    pub struct CommandReceiver {
        rx: crossbeam_channel::Receiver<TransportCommand>,
    }

    impl CommandReceiver {
        pub fn new(rx: crossbeam_channel::Receiver<TransportCommand>) -> Self {
            Self { rx }
        }

        /// Every command queued so far (non-blocking)
        pub fn drain(&self) -> Vec<TransportCommand> {
            self.rx.try_iter().collect()
        }

        /// Only the subscribe commands queued so far.
        pub fn subscriptions(&self) -> Vec<(String, SubscriptionRequest)> {
            self.drain()
                .into_iter()
                .filter_map(|command| match command {
                    TransportCommand::Subscribe { sub_id, request } => Some((sub_id, request)),
                    TransportCommand::Unsubscribe(_) => None,
                })
                .collect()
        }
    }
}
