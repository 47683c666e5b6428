use std::time::Duration;

use anyhow::Context as _;
use futures::{SinkExt as _, StreamExt as _};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    configuration::Config,
    error::Error,
    model::FeedEvent,
    types::{FeedMessage, SubscribeRequest},
};

const FEED_BUFFER: usize = 256;

/// Live feed of quote events for one symbol. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<FeedEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::Receiver<FeedEvent>,
        handle: Option<JoinHandle<()>>,
    ) -> Self {
        Self { receiver, handle }
    }

    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub trait QuoteFeed: Send + Sync + 'static {
    fn subscribe(&self, symbol: &str) -> Result<Subscription, Error>;
}

/// Websocket quote feed. Reconnects until the subscription is dropped.
#[derive(Debug, Clone)]
pub struct QuoteStream {
    config: Config,
}

impl QuoteStream {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl QuoteFeed for QuoteStream {
    fn subscribe(&self, symbol: &str) -> Result<Subscription, Error> {
        let url = Url::parse(&self.config.quote_feed_host)?;
        let reconnect =
            Duration::from_secs(self.config.socket_reconnect_interval);
        let (sender, receiver) = mpsc::channel(FEED_BUFFER);
        let symbol = symbol.to_owned();

        let handle = tokio::spawn(async move {
            run(url, symbol, reconnect, sender).await;
        });

        Ok(Subscription::new(receiver, Some(handle)))
    }
}

async fn run(
    url: Url,
    symbol: String,
    reconnect: Duration,
    sender: mpsc::Sender<FeedEvent>,
) {
    loop {
        if let Err(e) = listen(&url, &symbol, &sender).await {
            error!("Quote feed for {} disconnected: {}", symbol, e);
        }

        if sender.is_closed() {
            debug!("Quote feed for {} unsubscribed", symbol);
            return;
        }

        info!("Reconnecting quote feed for {}", symbol);
        sleep(reconnect).await;
    }
}

async fn listen(
    url: &Url,
    symbol: &str,
    sender: &mpsc::Sender<FeedEvent>,
) -> Result<(), Error> {
    let (socket, _response) = connect_async(url.as_str())
        .await
        .context("Unable to connect quote feed")?;
    info!("Quote feed connected for {}", symbol);

    let (mut write, mut read) = socket.split();
    let request = serde_json::to_string(&SubscribeRequest {
        method: "subscribe",
        symbol,
    })?;
    write.send(Message::Text(request)).await?;

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let event = match parse_message(&text) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Skipping quote feed message: {}", e);
                        continue;
                    },
                };
                if sender.send(event).await.is_err() {
                    return Ok(());
                }
            },
            Message::Close(_) => return Ok(()),
            Message::Binary(_)
            | Message::Ping(_)
            | Message::Pong(_)
            | Message::Frame(_) => {},
        }
    }

    Ok(())
}

pub fn parse_message(text: &str) -> Result<Option<FeedEvent>, Error> {
    let message = serde_json::from_str::<FeedMessage>(text)?;
    FeedEvent::from_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message() {
        let event = parse_message(r#"{"exchange":"meteora","price":1.5}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, FeedEvent::Price(q) if q.exchange == "meteora"));

        assert!(parse_message(r#"{"price":1.5}"#).is_err());
        assert!(parse_message("not json").is_err());
    }

    #[tokio::test]
    async fn test_subscription_yields_events_in_order() {
        let (sender, receiver) = mpsc::channel(4);
        let mut subscription = Subscription::new(receiver, None);

        sender
            .send(parse_message(r#"{"coins":[]}"#).unwrap().unwrap())
            .await
            .unwrap();
        drop(sender);

        assert_eq!(
            subscription.next().await,
            Some(FeedEvent::Discovery(vec![]))
        );
        assert_eq!(subscription.next().await, None);
    }
}
