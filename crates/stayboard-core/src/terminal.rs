// ── Display terminal ──
//
// Pairing state machine for a signage terminal:
//
//   Unpaired ──code──▶ Loading ──ok──▶ Displaying
//                        │  ▲
//            invalid ◀───┤  └── retry (backoff or manual)
//            token       ▼
//                      Error
//
// While displaying, two independent timers run under one cancellation
// token: a configuration refresh and a liveness heartbeat. Every fetch
// carries the epoch it was started in; results from an older epoch are
// discarded.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TerminalConfig;
use crate::delivery::ConfigDeliveryClient;
use crate::error::CoreError;
use crate::model::ConfigSnapshot;
use crate::storage::{DEVICE_TOKEN_KEY, LocalStorage};

// ── Pairing code ─────────────────────────────────────────────────────

/// A six-digit pairing code, which doubles as the device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode(String);

impl PairingCode {
    pub const LEN: usize = 6;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PairingCode {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim();
        if code.len() == Self::LEN && code.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(code.to_owned()))
        } else {
            Err(CoreError::validation(format!(
                "pairing code must be {} digits",
                Self::LEN
            )))
        }
    }
}

// ── State ────────────────────────────────────────────────────────────

/// Why the last configuration fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    NotConfigured,
    Transient,
}

impl FailureReason {
    /// Plain-language message for the display.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NotConfigured => {
                "This display is paired but has not been set up yet. \
                 Ask your host to finish the display settings."
            }
            Self::Transient => "We can't reach the server right now. Retrying shortly.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    Unpaired,
    Loading,
    Displaying(Arc<ConfigSnapshot>),
    Error {
        reason: FailureReason,
        message: String,
        /// Consecutive failed fetches, starting at 1.
        attempts: u32,
    },
}

/// What a terminal should put on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Pairing,
    Spinner,
    RetryPrompt(String),
    Display(Arc<ConfigSnapshot>),
}

impl TerminalState {
    /// The first transient failure still shows a spinner; repeated
    /// failures and missing configuration show a retry prompt.
    pub fn screen(&self) -> Screen {
        match self {
            Self::Unpaired => Screen::Pairing,
            Self::Loading
            | Self::Error {
                reason: FailureReason::Transient,
                attempts: 1,
                ..
            } => Screen::Spinner,
            Self::Error { message, .. } => Screen::RetryPrompt(message.clone()),
            Self::Displaying(snapshot) => Screen::Display(Arc::clone(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Option<&Arc<ConfigSnapshot>> {
        match self {
            Self::Displaying(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

// ── Terminal ─────────────────────────────────────────────────────────

type LoadFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A display terminal. Cheaply cloneable; all clones drive one state
/// machine. Call [`shutdown`](Self::shutdown) to stop its timers.
#[derive(Clone)]
pub struct DisplayTerminal {
    inner: Arc<TerminalInner>,
}

struct TerminalInner {
    client: ConfigDeliveryClient,
    storage: Arc<dyn LocalStorage>,
    config: TerminalConfig,
    state: watch::Sender<TerminalState>,
    /// Root token; cancelled on shutdown.
    cancel: CancellationToken,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    epoch: u64,
    /// Cancels the timers belonging to the current epoch.
    timers: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    failures: u32,
}

impl Session {
    fn stop_timers(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.cancel();
        }
        self.tasks.retain(|t| !t.is_finished());
    }
}

impl DisplayTerminal {
    pub fn new(
        client: ConfigDeliveryClient,
        storage: Arc<dyn LocalStorage>,
        config: TerminalConfig,
    ) -> Self {
        let (state, _) = watch::channel(TerminalState::Unpaired);
        Self {
            inner: Arc::new(TerminalInner {
                client,
                storage,
                config,
                state,
                cancel: CancellationToken::new(),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn state(&self) -> TerminalState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TerminalState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.inner.state.borrow().snapshot().cloned()
    }

    pub fn error_message(&self) -> Option<String> {
        self.inner.state.borrow().error_message().map(str::to_owned)
    }

    /// Resume from a persisted token, or wait for a pairing code.
    pub async fn start(&self) -> Result<(), CoreError> {
        match self.inner.storage.get(DEVICE_TOKEN_KEY)? {
            Some(token) => {
                info!("resuming with stored device token");
                self.load(token).await;
            }
            None => {
                info!("no stored device token, waiting for pairing code");
                self.inner.state.send_replace(TerminalState::Unpaired);
            }
        }
        Ok(())
    }

    /// Pair with a code entered on the terminal.
    ///
    /// The code is persisted before the fetch so a restart mid-pairing
    /// resumes instead of prompting again.
    pub async fn submit_code(&self, raw: &str) -> Result<(), CoreError> {
        let code: PairingCode = raw.parse()?;
        if !matches!(*self.inner.state.borrow(), TerminalState::Unpaired) {
            return Err(CoreError::validation("terminal is already paired"));
        }
        self.inner.storage.set(DEVICE_TOKEN_KEY, code.as_str())?;
        info!("pairing code accepted");
        self.load(code.0).await;
        Ok(())
    }

    /// Retry immediately from `Error`. No-op in any other state.
    pub async fn retry(&self) -> Result<(), CoreError> {
        if !matches!(*self.inner.state.borrow(), TerminalState::Error { .. }) {
            return Ok(());
        }
        match self.inner.storage.get(DEVICE_TOKEN_KEY)? {
            Some(token) => self.load(token).await,
            None => {
                self.lock_session().stop_timers();
                self.inner.state.send_replace(TerminalState::Unpaired);
            }
        }
        Ok(())
    }

    /// Cancel every timer and in-flight fetch, then wait for background
    /// tasks to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let tasks = {
            let mut session = self.lock_session();
            session.epoch += 1;
            session.stop_timers();
            std::mem::take(&mut session.tasks)
        };
        for task in tasks {
            let _ = task.await;
        }
        debug!("terminal shut down");
    }

    // ── Loading ──────────────────────────────────────────────────────

    fn load(&self, token: String) -> LoadFuture {
        let terminal = self.clone();
        Box::pin(async move {
            let Some(epoch) = terminal.begin_epoch() else {
                return;
            };
            let cancel = terminal.inner.cancel.clone();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = terminal.inner.client.fetch(&token) => result,
            };
            terminal.finish_load(epoch, token, result);
        })
    }

    fn begin_epoch(&self) -> Option<u64> {
        if self.inner.cancel.is_cancelled() {
            return None;
        }
        let mut session = self.lock_session();
        session.epoch += 1;
        session.stop_timers();
        self.inner.state.send_replace(TerminalState::Loading);
        Some(session.epoch)
    }

    fn finish_load(&self, epoch: u64, token: String, result: Result<ConfigSnapshot, CoreError>) {
        let mut session = self.lock_session();
        if session.epoch != epoch || self.inner.cancel.is_cancelled() {
            debug!(epoch, "discarding stale configuration fetch");
            return;
        }

        match result {
            Ok(snapshot) => {
                session.failures = 0;
                info!(listing = %snapshot.settings.listing_id, "displaying configuration");
                self.inner
                    .state
                    .send_replace(TerminalState::Displaying(Arc::new(snapshot)));

                let timers = self.inner.cancel.child_token();
                session.tasks.push(tokio::spawn(self.clone().refresh_loop(
                    token.clone(),
                    epoch,
                    timers.clone(),
                )));
                session
                    .tasks
                    .push(tokio::spawn(self.clone().heartbeat_loop(token, timers.clone())));
                session.timers = Some(timers);
            }
            Err(CoreError::InvalidCredential { message }) => {
                warn!(%message, "device token rejected, returning to pairing");
                if let Err(e) = self.inner.storage.remove(DEVICE_TOKEN_KEY) {
                    warn!(error = %e, "failed to clear stored device token");
                }
                session.failures = 0;
                self.inner.state.send_replace(TerminalState::Unpaired);
            }
            Err(err) => {
                let reason = match err {
                    CoreError::NotConfigured { .. } => FailureReason::NotConfigured,
                    _ => FailureReason::Transient,
                };
                session.failures += 1;
                let attempts = session.failures;
                let delay = self.inner.config.retry.delay(attempts - 1);
                warn!(error = %err, attempts, retry_in = ?delay, "configuration fetch failed");
                self.inner.state.send_replace(TerminalState::Error {
                    reason,
                    message: reason.user_message().to_owned(),
                    attempts,
                });

                let timers = self.inner.cancel.child_token();
                session.tasks.push(tokio::spawn(self.clone().retry_after(
                    token,
                    epoch,
                    delay,
                    timers.clone(),
                )));
                session.timers = Some(timers);
            }
        }
    }

    // ── Background tasks ─────────────────────────────────────────────

    async fn retry_after(
        self,
        token: String,
        epoch: u64,
        delay: Duration,
        timers: CancellationToken,
    ) {
        tokio::select! {
            biased;
            () = timers.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        if self.lock_session().epoch != epoch {
            return;
        }
        debug!("retrying configuration fetch");
        self.load(token).await;
    }

    async fn refresh_loop(self, token: String, epoch: u64, timers: CancellationToken) {
        let mut ticker = interval(self.inner.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = timers.cancelled() => break,
                _ = ticker.tick() => {
                    let result = tokio::select! {
                        biased;
                        () = timers.cancelled() => break,
                        result = self.inner.client.fetch(&token) => result,
                    };
                    match result {
                        Ok(snapshot) => self.replace_snapshot(epoch, snapshot),
                        Err(e) => warn!(error = %e, "background refresh failed, keeping current configuration"),
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(self, token: String, timers: CancellationToken) {
        let mut ticker = interval(self.inner.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = timers.cancelled() => break,
                _ = ticker.tick() => {
                    let result = tokio::select! {
                        biased;
                        () = timers.cancelled() => break,
                        result = self.inner.client.ping(&token) => result,
                    };
                    if let Err(e) = result {
                        debug!(error = %e, "heartbeat failed");
                    }
                }
            }
        }
    }

    fn replace_snapshot(&self, epoch: u64, snapshot: ConfigSnapshot) {
        let session = self.lock_session();
        let displaying = matches!(*self.inner.state.borrow(), TerminalState::Displaying(_));
        if session.epoch == epoch && displaying {
            debug!("configuration refreshed");
            self.inner
                .state
                .send_replace(TerminalState::Displaying(Arc::new(snapshot)));
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::config::WeatherCacheConfig;
    use crate::delivery::{DeviceBackend, DeviceConfig};
    use crate::model::{DisplaySettings, EntityId, UnifiedMediaState, Units, Weather};
    use crate::storage::MemoryStorage;
    use crate::weather::{WeatherCache, WeatherLookup};

    // ── Fakes ────────────────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedBackend {
        /// Responses consumed in order; once empty, fetches succeed.
        script: Mutex<VecDeque<Result<DeviceConfig, CoreError>>>,
        fetch_delay: Mutex<Duration>,
        fetches: AtomicUsize,
        pings: AtomicUsize,
    }

    impl ScriptedBackend {
        fn then(&self, result: Result<DeviceConfig, CoreError>) {
            self.script.lock().unwrap().push_back(result);
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn pings(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }
    }

    fn configured() -> DeviceConfig {
        DeviceConfig {
            settings: Some(DisplaySettings {
                listing_id: EntityId::from("l1"),
                welcome_message: Some("Welcome!".into()),
                wifi_name: None,
                wifi_password: None,
                show_checkout_time: true,
                weather: None,
                media: UnifiedMediaState::default(),
            }),
            occupant: None,
        }
    }

    #[async_trait]
    impl DeviceBackend for ScriptedBackend {
        async fn device_config(&self, _token: &str) -> Result<DeviceConfig, CoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let delay = *self.fetch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(configured()))
        }

        async fn heartbeat(&self, _token: &str) -> Result<(), CoreError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::transient("heartbeat endpoint down"))
        }
    }

    struct NoWeather;

    #[async_trait]
    impl WeatherLookup for NoWeather {
        async fn lookup(&self, city: &str, units: Units) -> Result<Weather, CoreError> {
            Ok(Weather::fallback(city, units))
        }
    }

    fn terminal(backend: &Arc<ScriptedBackend>, storage: &Arc<MemoryStorage>) -> DisplayTerminal {
        let weather = Arc::new(WeatherCache::new(
            Arc::new(NoWeather),
            WeatherCacheConfig::default(),
        ));
        let client = ConfigDeliveryClient::new(backend.clone(), weather);
        DisplayTerminal::new(client, storage.clone(), TerminalConfig::default())
    }

    fn stored_token(storage: &MemoryStorage) -> Option<String> {
        storage.get(DEVICE_TOKEN_KEY).unwrap()
    }

    // ── Pairing ──────────────────────────────────────────────────────

    #[test]
    fn pairing_codes_are_six_digits() {
        assert_eq!(
            " 123456\n".parse::<PairingCode>().unwrap().as_str(),
            "123456"
        );
        assert!("12345".parse::<PairingCode>().is_err());
        assert!("1234567".parse::<PairingCode>().is_err());
        assert!("12a456".parse::<PairingCode>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_token_waits_for_code() {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        terminal.start().await.unwrap();
        assert_eq!(terminal.state(), TerminalState::Unpaired);
        assert_eq!(terminal.state().screen(), Screen::Pairing);
        assert_eq!(backend.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_code_is_rejected_before_any_fetch() {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        assert!(terminal.submit_code("12-34").await.is_err());
        assert_eq!(backend.fetches(), 0);
        assert_eq!(stored_token(&storage), None);
    }

    #[tokio::test(start_paused = true)]
    async fn paired_token_survives_restart() {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(MemoryStorage::new());

        let first = terminal(&backend, &storage);
        first.submit_code("123456").await.unwrap();
        assert!(first.snapshot().is_some());
        assert_eq!(stored_token(&storage).as_deref(), Some("123456"));
        first.shutdown().await;

        let second = terminal(&backend, &storage);
        second.start().await.unwrap();
        assert!(matches!(second.state(), TerminalState::Displaying(_)));
        second.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn code_is_persisted_before_fetch_completes() {
        let backend = Arc::new(ScriptedBackend::default());
        *backend.fetch_delay.lock().unwrap() = Duration::from_secs(10);
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        let pairing = {
            let terminal = terminal.clone();
            tokio::spawn(async move { terminal.submit_code("654321").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(terminal.state(), TerminalState::Loading);
        assert_eq!(stored_token(&storage).as_deref(), Some("654321"));

        pairing.await.unwrap().unwrap();
        terminal.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_credential_clears_token() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.then(Err(CoreError::InvalidCredential {
            message: "invalid_token".into(),
        }));
        let storage = Arc::new(MemoryStorage::new());
        storage.set(DEVICE_TOKEN_KEY, "111111").unwrap();

        let terminal = terminal(&backend, &storage);
        terminal.start().await.unwrap();
        assert_eq!(terminal.state(), TerminalState::Unpaired);
        assert_eq!(stored_token(&storage), None);

        // Never retried automatically.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(backend.fetches(), 1);

        let restarted = self::terminal(&backend, &storage);
        restarted.start().await.unwrap();
        assert_eq!(restarted.state(), TerminalState::Unpaired);
    }

    // ── Failures and retry ───────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_with_backoff() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.then(Err(CoreError::transient("connection reset")));
        backend.then(Err(CoreError::transient("connection reset")));
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        terminal.submit_code("123456").await.unwrap();
        let state = terminal.state();
        assert!(matches!(
            state,
            TerminalState::Error {
                reason: FailureReason::Transient,
                attempts: 1,
                ..
            }
        ));
        assert_eq!(state.screen(), Screen::Spinner);
        assert_eq!(stored_token(&storage).as_deref(), Some("123456"));

        // First retry after ~1s fails again and shows the prompt.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(backend.fetches(), 2);
        assert!(matches!(terminal.state().screen(), Screen::RetryPrompt(_)));

        // Second retry after ~2.4s succeeds.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.fetches(), 3);
        assert!(matches!(terminal.state(), TerminalState::Displaying(_)));
        terminal.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn not_configured_shows_distinct_prompt_and_manual_retry_works() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.then(Err(CoreError::NotConfigured {
            message: "not_configured".into(),
        }));
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        terminal.submit_code("123456").await.unwrap();
        assert_eq!(
            terminal.state().screen(),
            Screen::RetryPrompt(FailureReason::NotConfigured.user_message().into())
        );
        assert_eq!(
            terminal.error_message().as_deref(),
            Some(FailureReason::NotConfigured.user_message())
        );

        terminal.retry().await.unwrap();
        assert!(matches!(terminal.state(), TerminalState::Displaying(_)));
        assert_eq!(backend.fetches(), 2);

        // The cancelled backoff timer does not fire a third fetch.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.fetches(), 2);
        terminal.shutdown().await;
    }

    // ── Timers ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn displaying_runs_heartbeat_and_refresh() {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        terminal.submit_code("123456").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.pings(), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(backend.pings(), 4);
        assert_eq!(backend.fetches(), 1);

        // Failed heartbeats never leave Displaying; neither does a
        // failed refresh.
        backend.then(Err(CoreError::transient("refresh failed")));
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(backend.fetches(), 2);
        assert!(matches!(terminal.state(), TerminalState::Displaying(_)));

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(backend.fetches(), 3);
        assert!(matches!(terminal.state(), TerminalState::Displaying(_)));
        terminal.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_background_work() {
        let backend = Arc::new(ScriptedBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let terminal = terminal(&backend, &storage);

        terminal.submit_code("123456").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        terminal.shutdown().await;
        terminal.shutdown().await;

        let (pings, fetches) = (backend.pings(), backend.fetches());
        tokio::time::sleep(Duration::from_secs(4 * 60 * 60)).await;
        assert_eq!(backend.pings(), pings);
        assert_eq!(backend.fetches(), fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_resolving_after_shutdown_is_discarded() {
        let backend = Arc::new(ScriptedBackend::default());
        *backend.fetch_delay.lock().unwrap() = Duration::from_secs(10);
        let storage = Arc::new(MemoryStorage::new());
        storage.set(DEVICE_TOKEN_KEY, "123456").unwrap();
        let terminal = terminal(&backend, &storage);

        let starting = {
            let terminal = terminal.clone();
            tokio::spawn(async move { terminal.start().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        terminal.shutdown().await;
        starting.await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(terminal.state(), TerminalState::Loading);
        assert_eq!(backend.pings(), 0);
    }
}
