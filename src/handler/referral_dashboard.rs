use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    configuration::{AppState, Config},
    error::Error,
    helpers::format_time_difference,
    model::{LeaderboardSort, Loadable, ReferralEntry},
    provider::ReferralApi,
    scheduler::{Backoff, ScheduledTask},
    storage::{KeyValueStore, REFERRAL_CODE_KEY},
    types::{EarnBalance, RefInfo, RefListItem},
};

#[derive(Debug, Clone, PartialEq)]
pub struct StatCard {
    pub title: &'static str,
    pub sol: String,
    pub usd: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub rank: Option<usize>,
    pub ref_id: String,
    pub countdown: String,
    pub volume: String,
    pub reward: String,
    pub traders: usize,
    pub extra_reward: String,
    pub overview_link: String,
    pub trade_link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub code: Option<String>,
    pub share_link: Option<String>,
    pub stats: Vec<StatCard>,
    pub info_error: Option<String>,
    pub sort: LeaderboardSort,
    pub title: &'static str,
    pub description: &'static str,
    pub rows: Vec<LeaderboardRow>,
    pub leaderboard_error: Option<String>,
}

#[derive(Debug, Default)]
struct DashboardState {
    code: Option<String>,
    info: Loadable<RefInfo>,
    sort: LeaderboardSort,
    entries: Loadable<Vec<ReferralEntry>>,
}

struct Inner<A, S> {
    config: Config,
    api: AppState<A>,
    store: AppState<S>,
    reward_delay: Duration,
    state: Mutex<DashboardState>,
    updates: watch::Sender<u64>,
}

impl<A, S> Inner<A, S> {
    fn lock(&self) -> Result<MutexGuard<'_, DashboardState>, Error> {
        self.state
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))
    }

    fn changed(&self) {
        self.updates.send_modify(|version| *version += 1);
    }
}

/// Referral page: the viewer's code and earnings plus the polled
/// leaderboard. Dropping it stops the leaderboard and countdown timers.
pub struct ReferralDashboard<A, S> {
    inner: Arc<Inner<A, S>>,
    leaderboard: Mutex<ScheduledTask>,
    countdown: Mutex<ScheduledTask>,
    clock: Arc<watch::Sender<DateTime<Utc>>>,
}

impl<A, S> ReferralDashboard<A, S>
where
    A: ReferralApi,
    S: KeyValueStore,
{
    pub fn new(
        config: &Config,
        api: AppState<A>,
        store: AppState<S>,
    ) -> Result<Self, Error> {
        store.init()?;

        let reward_delay = Duration::try_days(config.reward_delay_days)
            .ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "REWARD_DELAY_DAYS out of range: {}",
                    config.reward_delay_days
                ))
            })?;
        let (updates, _) = watch::channel(0);
        let (clock, _) = watch::channel(Utc::now());

        Ok(ReferralDashboard {
            inner: Arc::new(Inner {
                config: config.clone(),
                api,
                store,
                reward_delay,
                state: Mutex::new(DashboardState::default()),
                updates,
            }),
            leaderboard: Mutex::new(ScheduledTask::idle("leaderboard")),
            countdown: Mutex::new(ScheduledTask::idle("countdown")),
            clock: Arc::new(clock),
        })
    }

    /// Reads the stored referral code. Nothing is generated when it is
    /// missing.
    pub fn load_code(&self) -> Result<Option<String>, Error> {
        let code = self
            .inner
            .store
            .read(REFERRAL_CODE_KEY)?
            .filter(|code| !code.is_empty());

        if code.is_none() {
            warn!("No referral code stored");
        }
        self.inner.lock()?.code = code.clone();
        Ok(code)
    }

    /// Fetches the viewer's stats once. A failure is kept in the view and
    /// not retried.
    pub async fn load_info(&self) -> Result<(), Error> {
        let code = self.inner.lock()?.code.clone();
        let Some(code) = code else {
            return Ok(());
        };

        let result = self.inner.api.ref_info(&code).await;

        let mut state = self.inner.lock()?;
        let result = match result {
            Ok(info) => {
                debug!("Loaded referral info for {}", code);
                state.info = Loadable::Loaded(info);
                Ok(())
            },
            Err(e) => {
                warn!("Unable to load referral info for {}: {}", code, e);
                state.info = std::mem::take(&mut state.info).fail(&e);
                Err(e)
            },
        };
        self.inner.changed();
        result
    }

    /// Fetches the leaderboard now and then on every leaderboard interval,
    /// replacing any schedule that is already running.
    pub fn start_leaderboard(&self, sort: LeaderboardSort) -> Result<(), Error> {
        self.select_sort(sort)?;
        info!("Polling leaderboard sorted by {}", sort);

        let backoff = Backoff::new(
            std::time::Duration::from_millis(
                self.inner.config.leaderboard_interval_ms,
            ),
            std::time::Duration::from_millis(
                self.inner.config.retry_max_interval_ms,
            ),
        );
        let inner = self.inner.clone();

        self.leaderboard
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?
            .restart(backoff, move || poll_leaderboard(inner.clone(), sort));

        Ok(())
    }

    /// Switches the sort key. The schedule restarts only when the key
    /// changes or nothing is polling yet.
    pub fn set_sort(&self, sort: LeaderboardSort) -> Result<(), Error> {
        let current = self.inner.lock()?.sort;
        let running = self
            .leaderboard
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?
            .is_running();

        if current == sort && running {
            return Ok(());
        }
        self.start_leaderboard(sort)
    }

    /// Single leaderboard fetch, outside of any schedule.
    pub async fn refresh_leaderboard(
        &self,
        sort: LeaderboardSort,
    ) -> Result<(), Error> {
        self.select_sort(sort)?;
        poll_leaderboard(self.inner.clone(), sort).await
    }

    /// Rows fetched for another key are not shown under the new one.
    fn select_sort(&self, sort: LeaderboardSort) -> Result<(), Error> {
        let mut state = self.inner.lock()?;
        if state.sort != sort {
            state.entries = Loadable::NotLoaded;
        }
        state.sort = sort;
        Ok(())
    }

    /// Publishes the current time on every countdown interval. Only the
    /// displayed countdowns change; nothing is refetched.
    pub fn start_countdown(
        &self,
    ) -> Result<watch::Receiver<DateTime<Utc>>, Error> {
        let clock = self.clock.clone();
        let period = std::time::Duration::from_millis(
            self.inner.config.countdown_interval_ms,
        );

        self.countdown
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?
            .restart(Backoff::fixed(period), move || {
                clock.send_replace(Utc::now());
                future::ready(Ok(()))
            });

        Ok(self.clock.subscribe())
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.leaderboard
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?
            .cancel();
        self.countdown
            .lock()
            .map_err(|e| Error::LockError(e.to_string()))?
            .cancel();
        Ok(())
    }

    /// Bumped after every info or leaderboard fetch.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }

    pub fn entries(&self) -> Result<Loadable<Vec<ReferralEntry>>, Error> {
        Ok(self.inner.lock()?.entries.clone())
    }

    pub fn view(&self, now: DateTime<Utc>) -> Result<DashboardView, Error> {
        let config = &self.inner.config;
        let state = self.inner.lock()?;

        let info = state.info.value().cloned().unwrap_or_default();
        let stats = vec![
            stat_card("Total Rewards", &info.earn_balance),
            stat_card("Unclaimed", &info.unclaimed_earn),
            stat_card("Claimed Rewards", &info.claimed_earn),
        ];

        let rows = state
            .entries
            .value()
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| {
                        leaderboard_row(config, state.sort, index, entry, now)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(DashboardView {
            code: state.code.clone(),
            share_link: state.code.as_deref().map(|c| config.share_link(c)),
            stats,
            info_error: state.info.error().map(str::to_owned),
            sort: state.sort,
            title: state.sort.title(),
            description: state.sort.description(),
            rows,
            leaderboard_error: state.entries.error().map(str::to_owned),
        })
    }
}

async fn poll_leaderboard<A, S>(
    inner: Arc<Inner<A, S>>,
    sort: LeaderboardSort,
) -> Result<(), Error>
where
    A: ReferralApi,
    S: KeyValueStore,
{
    let result = inner.api.ref_list(sort).await;

    let mut state = inner.lock()?;
    if state.sort != sort {
        debug!("Dropping leaderboard for previous sort {}", sort);
        return Ok(());
    }

    let result = match result {
        Ok(items) => {
            let entries = to_entries(items, inner.reward_delay);
            debug!("Leaderboard {} has {} entries", sort, entries.len());
            state.entries = Loadable::Loaded(entries);
            Ok(())
        },
        Err(e) => {
            state.entries = std::mem::take(&mut state.entries).fail(&e);
            Err(e)
        },
    };
    inner.changed();

    result
}

fn to_entries(
    items: Vec<RefListItem>,
    reward_delay: Duration,
) -> Vec<ReferralEntry> {
    items
        .into_iter()
        .filter_map(|item| {
            let ref_id = item.ref_id.to_owned();
            match ReferralEntry::from_item(item, reward_delay) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping leaderboard entry {}: {}", ref_id, e);
                    None
                },
            }
        })
        .collect()
}

fn stat_card(title: &'static str, balance: &EarnBalance) -> StatCard {
    StatCard {
        title,
        sol: format!("{:.2} SOL", balance.sol),
        usd: format!("${:.4}", balance.usd),
    }
}

fn leaderboard_row(
    config: &Config,
    sort: LeaderboardSort,
    index: usize,
    entry: &ReferralEntry,
    now: DateTime<Utc>,
) -> LeaderboardRow {
    LeaderboardRow {
        rank: sort.is_ranked().then_some(index + 1),
        ref_id: entry.ref_id.to_owned(),
        countdown: format_time_difference(entry.spin_at, now),
        volume: format!("${:.2}", entry.volume_usd()),
        reward: format!("${:.2}", entry.ref_balance_usd),
        traders: entry.traders,
        extra_reward: format!(
            "${:.2}",
            entry.top_balance_share_usd.unwrap_or(0.0)
        ),
        overview_link: config.overview_link(&entry.ref_id),
        trade_link: config.trade_link(&entry.ref_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::TimeZone;
    use tokio::time::sleep;

    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct FakeReferrals {
        fail_list: AtomicBool,
        fail_info: AtomicBool,
        info_calls: Mutex<Vec<String>>,
        list_calls: Mutex<Vec<LeaderboardSort>>,
    }

    impl FakeReferrals {
        fn list_count(&self) -> usize {
            self.list_calls.lock().unwrap().len()
        }
    }

    impl ReferralApi for FakeReferrals {
        async fn ref_info(&self, code: &str) -> Result<RefInfo, Error> {
            self.info_calls.lock().unwrap().push(code.to_owned());
            if self.fail_info.load(Ordering::SeqCst) {
                return Err(Error::HttpStatus {
                    status: 502,
                    url: format!("https://api.cryptoscan.pro/ref/{}", code),
                });
            }
            Ok(serde_json::from_str(
                r#"{"refId":"alpha",
                    "earnBalance":{"sol":1.234,"usd":210.5},
                    "unclaimedEarn":{"sol":0.5,"usd":85.25},
                    "claimedEarn":{"sol":0.734,"usd":125.25}}"#,
            )?)
        }

        async fn ref_list(
            &self,
            sort: LeaderboardSort,
        ) -> Result<Vec<RefListItem>, Error> {
            self.list_calls.lock().unwrap().push(sort);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Error::HttpStatus {
                    status: 500,
                    url: String::from("https://api.cryptoscan.pro/ref/list"),
                });
            }
            Ok(serde_json::from_str(
                r#"[{"refId":"alpha","registeredAt":"2024-05-01T12:00:00Z",
                     "refBalanceUsd":4.0,"earnSenders":{"a":1,"b":1,"c":1},
                     "topBalanceShareUsd":24.0},
                    {"refId":"beta","registeredAt":"2024-05-03T00:00:00Z",
                     "refBalanceUsd":0.5},
                    {"refId":"broken","registeredAt":"soon"}]"#,
            )?)
        }
    }

    fn dashboard(
        code: Option<&str>,
    ) -> (
        ReferralDashboard<FakeReferrals, MemoryStore>,
        AppState<FakeReferrals>,
    ) {
        let api = AppState::new(FakeReferrals::default());
        let entries: Vec<(&str, &str)> =
            code.map(|c| vec![(REFERRAL_CODE_KEY, c)]).unwrap_or_default();
        let store = AppState::new(MemoryStore::with_entries(&entries));

        let dashboard =
            ReferralDashboard::new(&Config::default(), api.clone(), store)
                .unwrap();
        (dashboard, api)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_info_requires_code() {
        let (dashboard, api) = dashboard(None);

        assert_eq!(dashboard.load_code().unwrap(), None);
        dashboard.load_info().await.unwrap();
        assert!(api.info_calls.lock().unwrap().is_empty());

        let view = dashboard.view(now()).unwrap();
        assert_eq!(view.share_link, None);
        assert_eq!(view.stats[0].sol, "0.00 SOL");
        assert_eq!(view.stats[0].usd, "$0.0000");
    }

    #[tokio::test]
    async fn test_info_and_share_link() {
        let (dashboard, _api) = dashboard(Some("alpha"));
        dashboard.load_code().unwrap();
        dashboard.load_info().await.unwrap();

        let view = dashboard.view(now()).unwrap();
        assert_eq!(
            view.share_link.as_deref(),
            Some("https://cryptoscan.pro?ref=alpha")
        );
        assert_eq!(view.stats[0].title, "Total Rewards");
        assert_eq!(view.stats[0].sol, "1.23 SOL");
        assert_eq!(view.stats[1].usd, "$85.2500");
        assert_eq!(view.info_error, None);
    }

    #[tokio::test]
    async fn test_info_failure_is_reported_once() {
        let (dashboard, api) = dashboard(Some("alpha"));
        api.fail_info.store(true, Ordering::SeqCst);
        dashboard.load_code().unwrap();

        assert!(dashboard.load_info().await.is_err());
        let view = dashboard.view(now()).unwrap();

        assert!(view.info_error.unwrap().contains("502"));
        assert_eq!(view.stats[2].sol, "0.00 SOL");
        assert_eq!(api.info_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaderboard_polls_with_stable_reward_time() {
        let (dashboard, api) = dashboard(None);
        dashboard.start_leaderboard(LeaderboardSort::Volume).unwrap();

        sleep(std::time::Duration::from_millis(10)).await;
        let first = dashboard.entries().unwrap();
        sleep(std::time::Duration::from_secs(5)).await;
        let second = dashboard.entries().unwrap();

        assert_eq!(api.list_count(), 2);
        assert_eq!(first, second);

        let entries = second.value().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].spin_at,
            Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap()
        );

        let view = dashboard.view(now()).unwrap();
        let row = &view.rows[0];
        assert_eq!(row.rank, Some(1));
        assert_eq!(row.countdown, "2d 02:00:00");
        assert_eq!(row.volume, "$2000.00");
        assert_eq!(row.reward, "$4.00");
        assert_eq!(row.traders, 3);
        assert_eq!(row.extra_reward, "$24.00");
        assert_eq!(row.overview_link, "https://cryptoscan.pro/referral/alpha");
        assert_eq!(row.trade_link, "https://cryptoscan.pro/?ref=alpha");
        assert_eq!(view.rows[1].extra_reward, "$0.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_rows_and_backs_off() {
        let (dashboard, api) = dashboard(None);
        dashboard.start_leaderboard(LeaderboardSort::Soon).unwrap();
        sleep(std::time::Duration::from_millis(10)).await;

        api.fail_list.store(true, Ordering::SeqCst);
        sleep(std::time::Duration::from_secs(5)).await;

        let view = dashboard.view(now()).unwrap();
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].rank, None);
        assert!(view.leaderboard_error.is_some());
        assert_eq!(api.list_count(), 2);

        // next attempt after 10s instead of 5s
        sleep(std::time::Duration::from_secs(6)).await;
        assert_eq!(api.list_count(), 2);
        sleep(std::time::Duration::from_secs(5)).await;
        assert_eq!(api.list_count(), 3);

        api.fail_list.store(false, Ordering::SeqCst);
        sleep(std::time::Duration::from_secs(20)).await;
        let view = dashboard.view(now()).unwrap();
        assert_eq!(view.leaderboard_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sort_restarts_schedule() {
        let (dashboard, api) = dashboard(None);
        dashboard.set_sort(LeaderboardSort::Volume).unwrap();
        sleep(std::time::Duration::from_millis(10)).await;

        // same key while running does not refetch
        dashboard.set_sort(LeaderboardSort::Volume).unwrap();
        sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(api.list_count(), 1);

        dashboard.set_sort(LeaderboardSort::New).unwrap();
        sleep(std::time::Duration::from_millis(10)).await;
        sleep(std::time::Duration::from_secs(5)).await;

        assert_eq!(
            *api.list_calls.lock().unwrap(),
            vec![
                LeaderboardSort::Volume,
                LeaderboardSort::New,
                LeaderboardSort::New
            ]
        );
        let view = dashboard.view(now()).unwrap();
        assert_eq!(view.sort, LeaderboardSort::New);
        assert_eq!(view.title, "New Referral");

        dashboard.stop().unwrap();
        sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(api.list_count(), 3);
    }

    #[tokio::test]
    async fn test_single_refresh_switches_sort() {
        let (dashboard, api) = dashboard(None);

        dashboard.refresh_leaderboard(LeaderboardSort::New).await.unwrap();
        let view = dashboard.view(now()).unwrap();

        assert_eq!(view.sort, LeaderboardSort::New);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(*api.list_calls.lock().unwrap(), vec![LeaderboardSort::New]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_without_fetching() {
        let (dashboard, api) = dashboard(None);
        let mut clock = dashboard.start_countdown().unwrap();

        clock.changed().await.unwrap();
        clock.borrow_and_update();
        sleep(std::time::Duration::from_millis(1_100)).await;
        assert!(clock.has_changed().unwrap());
        assert_eq!(api.list_count(), 0);
    }
}
