//! Swap form state and its background work.
//!
//! Amount edits go through a debouncer; each settled amount restarts the
//! backend quote schedule unless an exchange is pinned, in which case the
//! pinned venue's feed prices drive the destination amount instead. Quote
//! requests carry a sequence number and only the most recently issued one
//! may install its result.

use std::{
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bigdecimal::{BigDecimal, Zero};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    configuration::{AppState, Config},
    error::Error,
    helpers::{decimal_from_f64, get_price, resolve_symbol},
    model::{
        counter_amount, FeedEvent, Loadable, Notification, QuoteState,
        SwapQuote, UnsignedTransaction,
    },
    provider::{
        transaction::{decode_transaction, encode_transaction},
        BalanceApi, Subscription, SwapApi, WalletSigner,
    },
    scheduler::{Backoff, Debouncer, ScheduledTask},
    storage::{KeyValueStore, PREFERRED_TOKEN_KEY},
    types::{Balances, SwapQuoteRequest, SwapSubmitRequest},
};

use super::{
    balances::{balance_of, fetch_balances},
    quote_aggregator::{MarketRow, QuoteAggregator},
};

pub const SWAP_SUCCESS: &str = "Swap Successful";
pub const SWAP_FAILURE: &str = "Swap Failed";

/// Where the widget is mounted: the route path (its trading symbol), an
/// explicit symbol selection and the `ref` query parameter.
#[derive(Debug, Clone, Default)]
pub struct SwapRoute {
    pub path: String,
    pub symbol: Option<String>,
    pub referral: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapIntent {
    pub symbol: Option<String>,
    pub from_address: Option<String>,
    pub from_symbol: Option<String>,
    pub to_address: Option<String>,
    pub to_symbol: Option<String>,
    pub from_amount: Option<BigDecimal>,
    pub settled_amount: Option<BigDecimal>,
    pub to_amount: Option<BigDecimal>,
    pub pinned: Option<String>,
    pub referral: Option<String>,
    pub quote: QuoteState,
    pub quote_error: Option<String>,
}

impl SwapIntent {
    fn settled(&self) -> Option<&BigDecimal> {
        self.settled_amount.as_ref().filter(|amount| !amount.is_zero())
    }

    /// The settled amount, while no newer edit is waiting to settle.
    fn quotable(&self) -> Option<&BigDecimal> {
        self.settled()
            .filter(|settled| self.from_amount.as_ref() == Some(*settled))
    }
}

#[derive(Debug, Default)]
struct WidgetState {
    intent: SwapIntent,
    markets: QuoteAggregator,
    balances: Loadable<Balances>,
    epoch: u64,
}

impl WidgetState {
    /// Input changed: nothing issued so far may install its result.
    fn invalidate_quote(&mut self) {
        self.epoch += 1;
        self.intent.quote = std::mem::take(&mut self.intent.quote).invalidate();
    }

    fn price_pinned(&mut self) {
        let Some(pinned) = self.intent.pinned.as_deref() else {
            return;
        };
        let price = self.markets.quote(pinned).map(|quote| &quote.price);

        if let (Some(amount), Some(price)) =
            (self.intent.from_amount.as_ref(), price)
        {
            if let Ok(to_amount) = counter_amount(amount, price) {
                self.intent.to_amount = Some(to_amount);
            }
        }
    }
}

struct Inner<A, W, S> {
    config: Config,
    api: AppState<A>,
    wallet: Option<W>,
    store: AppState<S>,
    quote_backoff: Backoff,
    state: Mutex<WidgetState>,
    notifications: mpsc::UnboundedSender<Notification>,
    updates: watch::Sender<u64>,
}

impl<A, W, S> Inner<A, W, S> {
    fn lock(&self) -> Result<MutexGuard<'_, WidgetState>, Error> {
        self.state
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))
    }

    fn changed(&self) {
        self.updates.send_modify(|version| *version += 1);
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

pub struct SwapWidget<A, W, S> {
    inner: Arc<Inner<A, W, S>>,
    quote_task: Arc<Mutex<ScheduledTask>>,
    balance_task: Mutex<ScheduledTask>,
    balance_backoff: Backoff,
    debouncer: Debouncer<Option<BigDecimal>>,
    driver: JoinHandle<()>,
}

impl<A, W, S> SwapWidget<A, W, S>
where
    A: SwapApi + BalanceApi,
    W: WalletSigner,
    S: KeyValueStore,
{
    /// Must be called inside a tokio runtime. Returns the widget and the
    /// stream of swap notifications.
    pub fn new(
        config: &Config,
        api: AppState<A>,
        wallet: Option<W>,
        store: AppState<S>,
        route: SwapRoute,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), Error> {
        store.init()?;

        let symbol = resolve_symbol(route.symbol.as_deref(), &route.path);
        let from_address = config.default_from_address.to_owned();
        let to_address = store.read(PREFERRED_TOKEN_KEY)?;

        let from_symbol = config
            .symbol_of(&from_address)
            .map(str::to_owned)
            .or_else(|| symbol.clone());
        let to_symbol = to_address
            .as_deref()
            .and_then(|address| config.symbol_of(address))
            .map(str::to_owned)
            .or_else(|| symbol.clone());

        let intent = SwapIntent {
            symbol: symbol.clone(),
            from_address: Some(from_address),
            from_symbol,
            to_address,
            to_symbol,
            referral: route.referral,
            ..SwapIntent::default()
        };
        let state = WidgetState {
            intent,
            markets: QuoteAggregator::new(symbol),
            ..WidgetState::default()
        };

        let (notifications, notifications_rx) = mpsc::unbounded_channel();
        let (updates, _) = watch::channel(0);
        let retry_max = Duration::from_millis(config.retry_max_interval_ms);

        let inner = Arc::new(Inner {
            config: config.clone(),
            api,
            wallet,
            store,
            quote_backoff: Backoff::new(
                Duration::from_millis(config.quote_interval_ms),
                retry_max,
            ),
            state: Mutex::new(state),
            notifications,
            updates,
        });

        let quote_task = Arc::new(Mutex::new(ScheduledTask::idle("quote")));
        let (debouncer, settled) = Debouncer::new(
            None,
            Duration::from_millis(config.quote_debounce_ms),
        );
        let driver = tokio::spawn(drive_quotes(
            inner.clone(),
            quote_task.clone(),
            settled,
        ));

        let widget = SwapWidget {
            inner,
            quote_task,
            balance_task: Mutex::new(ScheduledTask::idle("balances")),
            balance_backoff: Backoff::new(
                Duration::from_millis(config.balance_interval_ms),
                retry_max,
            ),
            debouncer,
            driver,
        };

        Ok((widget, notifications_rx))
    }

    pub fn intent(&self) -> Result<SwapIntent, Error> {
        Ok(self.inner.lock()?.intent.clone())
    }

    pub fn markets(&self) -> Result<Vec<MarketRow>, Error> {
        let state = self.inner.lock()?;
        Ok(state.markets.rows(state.intent.pinned.as_deref()))
    }

    pub fn balances(&self) -> Result<Loadable<Balances>, Error> {
        Ok(self.inner.lock()?.balances.clone())
    }

    pub fn balance_of(&self, token: &str) -> Result<f64, Error> {
        let state = self.inner.lock()?;
        Ok(state
            .balances
            .value()
            .map(|balances| balance_of(balances, token))
            .unwrap_or(0.0))
    }

    /// Bumped whenever the quote state or destination amount changes.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }

    pub fn set_from_amount(
        &self,
        amount: Option<BigDecimal>,
    ) -> Result<(), Error> {
        {
            let mut state = self.inner.lock()?;
            state.intent.from_amount = amount.clone();
            state.invalidate_quote();
            state.price_pinned();
        }
        self.debouncer.push(amount);
        self.inner.changed();
        Ok(())
    }

    /// Half of the source balance, rounded for display.
    pub fn half(&self) -> Result<(), Error> {
        let from = self.intent()?.from_address.unwrap_or_default();
        let balance = self.balance_of(&from)?;
        self.set_from_amount(display_amount(balance / 2.0)?)
    }

    pub fn max(&self) -> Result<(), Error> {
        let from = self.intent()?.from_address.unwrap_or_default();
        let balance = self.balance_of(&from)?;
        self.set_from_amount(display_amount(balance)?)
    }

    /// Swaps the two sides along with their amounts. The swapped amount
    /// settles through the debouncer like any other edit.
    pub fn flip(&self) -> Result<(), Error> {
        let config = &self.inner.config;
        let from_amount = {
            let mut state = self.inner.lock()?;
            let intent = &mut state.intent;

            std::mem::swap(&mut intent.from_address, &mut intent.to_address);
            intent.from_symbol = side_symbol(config, intent, true);
            intent.to_symbol = side_symbol(config, intent, false);

            let from_amount =
                intent.to_amount.as_ref().map(rounded).transpose()?;
            let to_amount =
                intent.from_amount.as_ref().map(rounded).transpose()?;
            intent.from_amount = from_amount.clone();
            intent.to_amount = to_amount;

            state.invalidate_quote();
            from_amount
        };

        self.debouncer.push(from_amount);
        self.inner.changed();
        Ok(())
    }

    pub fn select_from(&self, address: &str, symbol: &str) -> Result<(), Error> {
        {
            let mut state = self.inner.lock()?;
            state.intent.from_address = Some(address.to_owned());
            state.intent.from_symbol = Some(symbol.to_owned());
            state.invalidate_quote();
        }
        self.reschedule()
    }

    /// Selects the destination token and remembers it for the next session.
    pub fn select_to(&self, address: &str, symbol: &str) -> Result<(), Error> {
        self.inner.store.write(PREFERRED_TOKEN_KEY, address)?;
        {
            let mut state = self.inner.lock()?;
            state.intent.to_address = Some(address.to_owned());
            state.intent.to_symbol = Some(symbol.to_owned());
            state.invalidate_quote();
        }
        self.reschedule()
    }

    /// Pins `exchange` as the trading venue, or unpins it when it already is.
    pub fn pin_exchange(&self, exchange: &str) -> Result<(), Error> {
        {
            let mut state = self.inner.lock()?;
            if state.intent.pinned.as_deref() == Some(exchange) {
                state.intent.pinned = None;
            } else {
                state.intent.pinned = Some(exchange.to_owned());
                state.price_pinned();
            }
            state.invalidate_quote();
            info!("Pinned exchange: {:?}", state.intent.pinned);
        }
        self.reschedule()
    }

    /// Applies one quote feed event. A discovery that fills in the
    /// destination token restarts the quote schedule.
    pub fn apply_event(&self, event: FeedEvent) -> Result<(), Error> {
        let discovered = {
            let mut state = self.inner.lock()?;
            let pinned = state.intent.pinned.clone();
            let updated = state
                .markets
                .apply(event)
                .map(|quote| quote.exchange.to_owned());

            if updated.is_some() && updated == pinned {
                state.price_pinned();
            }

            let mut discovered = false;
            if state.intent.symbol.is_none() {
                state.intent.symbol =
                    state.markets.symbol().map(str::to_owned);
            }
            if state.intent.to_address.is_none() {
                if let Some(address) = state.markets.to_address() {
                    let address = address.to_owned();
                    state.intent.to_symbol = state.intent.symbol.clone();
                    state.intent.to_address = Some(address);
                    discovered = true;
                }
            }
            discovered
        };

        self.inner.changed();
        if discovered {
            self.reschedule()?;
        }
        Ok(())
    }

    /// Applies feed events until the subscription ends.
    pub async fn run_feed(
        &self,
        mut subscription: Subscription,
    ) -> Result<(), Error> {
        while let Some(event) = subscription.next().await {
            self.apply_event(event)?;
        }
        debug!("Quote feed subscription ended");
        Ok(())
    }

    /// Fetches a quote for the settled amount right away.
    pub async fn refresh_quote(&self) -> Result<(), Error> {
        refresh_quote(self.inner.clone()).await
    }

    /// Sets the amount without the debounce delay and restarts the quote
    /// schedule for it.
    pub fn settle_amount(
        &self,
        amount: Option<BigDecimal>,
    ) -> Result<(), Error> {
        {
            let mut state = self.inner.lock()?;
            state.intent.from_amount = amount.clone();
            state.intent.settled_amount = amount;
            state.invalidate_quote();
            state.price_pinned();
        }
        self.reschedule()
    }

    fn reschedule(&self) -> Result<(), Error> {
        let result = reschedule(&self.inner, &self.quote_task);
        self.inner.changed();
        result
    }

    /// Fetches balances now and on every balance interval. Without a
    /// connected wallet there is nothing to fetch.
    pub fn start_balances(&self) -> Result<(), Error> {
        let Some(wallet) = self.inner.wallet.as_ref() else {
            warn!("No wallet connected, balances are not fetched");
            return Ok(());
        };
        info!("Starting balance refresh for {}", wallet.address());

        let mut task = self
            .balance_task
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?;
        let inner = self.inner.clone();

        task.restart(self.balance_backoff, move || {
            let inner = inner.clone();
            async move { refresh_balances(&inner).await }
        });

        Ok(())
    }

    pub async fn refresh_balances(&self) -> Result<(), Error> {
        refresh_balances(&self.inner).await
    }

    /// Signs and submits the live quote's transaction. The quote is discarded
    /// and balances are refreshed whatever the outcome.
    pub async fn submit(&self) -> Result<serde_json::Value, Error> {
        let wallet = self
            .inner
            .wallet
            .as_ref()
            .ok_or_else(|| Error::MissingParams(String::from("wallet")))?;

        let transaction = {
            let state = self.inner.lock()?;
            state
                .intent
                .quote
                .live()
                .and_then(|quote| quote.transaction.clone())
                .ok_or(Error::NoQuote)?
        };

        self.inner.notify(Notification::Loading);
        let result =
            sign_and_send(&**self.inner.api, wallet, &transaction).await;

        {
            let mut state = self.inner.lock()?;
            state.epoch += 1;
            state.intent.quote = QuoteState::NoQuote;
        }
        self.inner.changed();

        match &result {
            Ok(response) => {
                info!(
                    "Swap {} submitted: {}",
                    transaction.request_id, response
                );
                self.inner
                    .notify(Notification::Success(SWAP_SUCCESS.to_owned()));
            },
            Err(e) => {
                error!("Swap {} failed: {}", transaction.request_id, e);
                self.inner
                    .notify(Notification::Failure(SWAP_FAILURE.to_owned()));
            },
        }

        if let Err(e) = refresh_balances(&self.inner).await {
            warn!("Balance refresh after swap failed: {}", e);
        }

        result
    }
}

impl<A, W, S> Drop for SwapWidget<A, W, S> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn sign_and_send<A, W>(
    api: &A,
    wallet: &W,
    transaction: &UnsignedTransaction,
) -> Result<serde_json::Value, Error>
where
    A: SwapApi,
    W: WalletSigner,
{
    let unsigned = decode_transaction(&transaction.payload)?;
    let signed = wallet.sign_transaction(unsigned).await?;

    let request = SwapSubmitRequest {
        txn: encode_transaction(&signed)?,
        request_id: transaction.request_id.to_owned(),
    };

    api.submit_swap(&request).await
}

async fn drive_quotes<A, W, S>(
    inner: Arc<Inner<A, W, S>>,
    task: Arc<Mutex<ScheduledTask>>,
    mut settled: watch::Receiver<Option<BigDecimal>>,
) where
    A: SwapApi + BalanceApi,
    W: WalletSigner,
    S: KeyValueStore,
{
    while settled.changed().await.is_ok() {
        let amount = settled.borrow_and_update().clone();
        debug!("Settled amount {:?}", amount);

        let result = inner
            .lock()
            .map(|mut state| state.intent.settled_amount = amount);
        let result = result.and_then(|_| reschedule(&inner, &task));

        inner.changed();
        if let Err(e) = result {
            error!("Unable to reschedule quotes: {}", e);
        }
    }
}

/// Polls the backend quote while nothing is pinned and an amount is settled;
/// otherwise stops polling. An empty amount also clears the quote.
fn reschedule<A, W, S>(
    inner: &Arc<Inner<A, W, S>>,
    task: &Mutex<ScheduledTask>,
) -> Result<(), Error>
where
    A: SwapApi + BalanceApi,
    W: WalletSigner,
    S: KeyValueStore,
{
    let mut task = task.lock().map_err(|e| Error::LockError(e.to_string()))?;

    let poll = {
        let mut state = inner.lock()?;
        if state.intent.pinned.is_some() {
            false
        } else if state.intent.settled().is_none() {
            state.epoch += 1;
            state.intent.to_amount = None;
            state.intent.quote = QuoteState::NoQuote;
            false
        } else {
            true
        }
    };

    if !poll {
        task.cancel();
        return Ok(());
    }

    let job_inner = inner.clone();
    task.restart(inner.quote_backoff, move || {
        refresh_quote(job_inner.clone())
    });

    Ok(())
}

async fn refresh_quote<A, W, S>(inner: Arc<Inner<A, W, S>>) -> Result<(), Error>
where
    A: SwapApi + BalanceApi,
    W: WalletSigner,
    S: KeyValueStore,
{
    let wallet = inner.wallet.as_ref().map(|wallet| wallet.address());
    let (seq, request) = {
        let mut state = inner.lock()?;
        let request = quote_request(&state.intent, wallet);
        let Some(request) = request else {
            return Ok(());
        };

        state.epoch += 1;
        let seq = state.epoch;
        if state.intent.quote.live().is_none() {
            state.intent.quote = QuoteState::QuotePending { seq };
        }
        (seq, request)
    };
    debug!("Requesting quote {} for {} {}", seq, request.amount, request.address);

    let response = inner.api.swap_quote(&request).await;
    let quote = response
        .and_then(|response| SwapQuote::from_response(response, request.amount));

    let result = {
        let mut state = inner.lock()?;
        if state.epoch != seq {
            debug!("Discarding superseded quote {}", seq);
            return Ok(());
        }

        match quote {
            Ok(quote) => {
                state.intent.to_amount = Some(quote.to_amount.clone());
                state.intent.quote = QuoteState::QuoteReady { seq, quote };
                state.intent.quote_error = None;
                Ok(())
            },
            Err(e) => {
                if state.intent.quote.is_pending() {
                    state.intent.quote = QuoteState::NoQuote;
                }
                state.intent.quote_error = Some(e.to_string());
                Err(e)
            },
        }
    };

    inner.changed();
    result
}

async fn refresh_balances<A, W, S>(inner: &Inner<A, W, S>) -> Result<(), Error>
where
    A: SwapApi + BalanceApi,
    W: WalletSigner,
    S: KeyValueStore,
{
    let Some(wallet) = inner.wallet.as_ref() else {
        return Ok(());
    };

    let result = fetch_balances(&**inner.api, wallet.address()).await;

    let mut state = inner.lock()?;
    match result {
        Ok(balances) => {
            state.balances = Loadable::Loaded(balances);
            Ok(())
        },
        Err(e) => {
            state.balances = std::mem::take(&mut state.balances).fail(&e);
            Err(e)
        },
    }
}

fn quote_request(
    intent: &SwapIntent,
    wallet: Option<&str>,
) -> Option<SwapQuoteRequest> {
    if intent.pinned.is_some() {
        return None;
    }

    Some(SwapQuoteRequest {
        address: intent.to_address.to_owned()?,
        amount: intent.quotable()?.clone(),
        address_from: intent.from_address.clone(),
        wallet_address: wallet.map(str::to_owned),
        referral: intent.referral.clone(),
    })
}

fn side_symbol(config: &Config, intent: &SwapIntent, from: bool) -> Option<String> {
    let address = match from {
        true => intent.from_address.as_deref(),
        false => intent.to_address.as_deref(),
    };

    address
        .and_then(|address| config.symbol_of(address))
        .map(str::to_owned)
        .or_else(|| intent.symbol.clone())
}

fn rounded(amount: &BigDecimal) -> Result<BigDecimal, Error> {
    Ok(BigDecimal::from_str(&get_price(amount))?)
}

fn display_amount(value: f64) -> Result<Option<BigDecimal>, Error> {
    let amount = rounded(&decimal_from_f64(value)?)?;

    if amount.is_zero() {
        return Ok(None);
    }
    Ok(Some(amount))
}
