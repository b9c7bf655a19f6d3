use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock, broadcast, watch},
    time::sleep,
};

use crate::{
    api::{ApiError, InstanceApi},
    pairing::{self, normalize_digits},
    poller::{CancelFlag, PollerStatus, StatusPoller},
    store::{CredentialStore, StateStore, StoreError},
};

/// Minimum digit count accepted for a national phone number.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Wizard position, persisted as its numeric step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WizardStep {
    /// Choosing an instance name.
    NamingInstance,
    /// Entering the phone number.
    EnteringPhone,
    /// Showing QR and pairing code while waiting for the connection.
    AwaitingConnection,
}

impl From<WizardStep> for u8 {
    fn from(step: WizardStep) -> Self {
        match step {
            WizardStep::NamingInstance => 1,
            WizardStep::EnteringPhone => 2,
            WizardStep::AwaitingConnection => 3,
        }
    }
}

impl TryFrom<u8> for WizardStep {
    type Error = String;

    fn try_from(step: u8) -> Result<Self, Self::Error> {
        match step {
            1 => Ok(Self::NamingInstance),
            2 => Ok(Self::EnteringPhone),
            3 => Ok(Self::AwaitingConnection),
            other => Err(format!("invalid wizard step: {other}")),
        }
    }
}

/// Persisted wizard record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingState {
    pub step: WizardStep,
    /// Raw user-chosen identifier; sanitized only at creation time.
    pub instance_name: String,
    /// Bearer credential issued by instance creation; empty until step 2.
    pub token: String,
    /// National phone digits, no country code.
    pub phone: String,
    /// Most recently fetched QR image payload.
    pub qr_base64: String,
    /// Most recently extracted pairing code.
    pub pairing_code: String,
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self {
            step: WizardStep::NamingInstance,
            instance_name: String::new(),
            token: String::new(),
            phone: String::new(),
            qr_base64: String::new(),
            pairing_code: String::new(),
        }
    }
}

/// Events emitted by the wizard for a front end to consume.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    StepChanged(WizardStep),
    QrRefreshed,
    PairingCodeReady(String),
    Connected,
    /// Fired once per wizard session, after the post-connection grace period.
    NavigateToDashboard,
}

/// Timing knobs for the wizard's timers.
#[derive(Debug, Clone, Copy)]
pub struct WizardTiming {
    /// Connection-status polling interval while awaiting connection.
    pub status_interval: Duration,
    /// Delay between QR issuance and the first pairing request.
    pub settle_delay: Duration,
    /// Delay between pairing rounds.
    pub retry_delay: Duration,
    /// Period of the automatic QR/pair refresh.
    pub refresh_interval: Duration,
    /// Grace period between observing the connection and navigating away.
    pub navigate_grace: Duration,
}

impl Default for WizardTiming {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(1500),
            retry_delay: Duration::from_millis(3000),
            refresh_interval: Duration::from_secs(30),
            navigate_grace: Duration::from_millis(2000),
        }
    }
}

/// Navigation context supplied when the wizard is entered from the
/// dashboard's reconnect flow.
#[derive(Debug, Clone, Default)]
pub struct EntryContext {
    pub token: Option<String>,
    pub phone: Option<String>,
}

/// Errors surfaced by wizard operations.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("instance name must not be empty")]
    EmptyInstanceName,
    #[error("phone number must have at least {MIN_PHONE_DIGITS} digits")]
    PhoneTooShort,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Driver for the three-step onboarding flow.
///
/// Cheap to clone; background tasks hold clones and share the same state.
#[derive(Clone)]
pub struct Wizard {
    api: Arc<dyn InstanceApi>,
    store: Arc<dyn StateStore>,
    credentials: Arc<dyn CredentialStore>,
    timing: WizardTiming,
    state: Arc<RwLock<OnboardingState>>,
    event_tx: broadcast::Sender<WizardEvent>,
    closed: Arc<AtomicBool>,
    navigated: Arc<AtomicBool>,
    connection: Arc<Mutex<Option<ConnectionTasks>>>,
}

struct ConnectionTasks {
    poller: StatusPoller,
    cancel: CancelFlag,
}

impl Wizard {
    /// Opens a wizard session, resolving the initial step from the entry
    /// context and any persisted record.
    ///
    /// An external token and phone land directly on the connection step; a
    /// token alone lands on the phone step; otherwise the persisted record
    /// (or defaults) applies. Entering the connection step starts the status
    /// poller, the periodic refresh, and a one-shot recovery refresh, since
    /// QR and pairing code do not survive reloads reliably.
    pub async fn open(
        api: Arc<dyn InstanceApi>,
        store: Arc<dyn StateStore>,
        credentials: Arc<dyn CredentialStore>,
        entry: EntryContext,
        timing: WizardTiming,
    ) -> Self {
        let saved = store.load().await;
        let initial = resolve_initial_state(entry, saved);

        let (event_tx, _) = broadcast::channel(64);
        let wizard = Self {
            api,
            store,
            credentials,
            timing,
            state: Arc::new(RwLock::new(initial.clone())),
            event_tx,
            closed: Arc::new(AtomicBool::new(false)),
            navigated: Arc::new(AtomicBool::new(false)),
            connection: Arc::new(Mutex::new(None)),
        };

        if let Err(error) = wizard.store.save(&initial).await {
            tracing::warn!(error = %error, "failed to persist wizard state");
        }

        if initial.step == WizardStep::AwaitingConnection && !initial.token.is_empty() {
            wizard.start_connection_tasks().await;
            if !initial.phone.is_empty() {
                wizard.spawn_recovery_refresh();
            }
        }

        wizard
    }

    /// Creates the instance and advances to the phone step.
    ///
    /// The issued token is stored in the wizard record and in the session
    /// credential store.
    pub async fn submit_instance_name(&self, raw_name: &str) -> Result<(), WizardError> {
        let sanitized = sanitize_instance_name(raw_name);
        if sanitized.is_empty() {
            return Err(WizardError::EmptyInstanceName);
        }

        let created = self.api.create_instance(&sanitized).await?;
        tracing::info!(name = %sanitized, "instance created");

        if let Err(error) = self.credentials.save(&created.token).await {
            tracing::warn!(error = %error, "failed to persist session credential");
        }

        let raw_name = raw_name.to_owned();
        self.apply(|state| {
            state.instance_name = raw_name;
            state.token = created.token;
            state.step = WizardStep::EnteringPhone;
        })
        .await;
        self.emit(WizardEvent::StepChanged(WizardStep::EnteringPhone));

        Ok(())
    }

    /// Runs the initial QR/pair acquisition and advances to the connection
    /// step on success.
    pub async fn submit_phone(&self, raw_phone: &str) -> Result<(), WizardError> {
        let digits = normalize_digits(raw_phone);
        if digits.len() < MIN_PHONE_DIGITS {
            return Err(WizardError::PhoneTooShort);
        }

        {
            let digits = digits.clone();
            self.apply(|state| state.phone = digits).await;
        }

        let token = self.state.read().await.token.clone();
        self.run_refresh_cycle(&token, &digits).await?;

        self.apply(|state| state.step = WizardStep::AwaitingConnection)
            .await;
        self.emit(WizardEvent::StepChanged(WizardStep::AwaitingConnection));
        self.start_connection_tasks().await;

        Ok(())
    }

    /// Manually re-runs the QR/pair refresh cycle.
    pub async fn refresh_now(&self) -> Result<(), WizardError> {
        let (token, phone) = {
            let state = self.state.read().await;
            (state.token.clone(), state.phone.clone())
        };

        self.run_refresh_cycle(&token, &phone).await
    }

    /// Returns to step 1 and clears the persisted record.
    ///
    /// The session credential is left untouched: reset affects wizard
    /// progress, not authentication.
    pub async fn reset(&self) {
        self.stop_connection_tasks().await;

        if let Err(error) = self.store.clear().await {
            tracing::warn!(error = %error, "failed to clear wizard state");
        }

        self.apply(|state| *state = OnboardingState::default()).await;
        self.emit(WizardEvent::StepChanged(WizardStep::NamingInstance));
    }

    /// Tears down the wizard's background activity.
    ///
    /// In-flight completions after close are discarded; nothing writes to
    /// the record anymore.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_connection_tasks().await;
    }

    /// Snapshot of the current wizard record.
    pub async fn snapshot(&self) -> OnboardingState {
        self.state.read().await.clone()
    }

    /// Subscribes to wizard events.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.event_tx.subscribe()
    }

    /// Latest poller status, when the connection step is active.
    pub async fn connection_status(&self) -> Option<PollerStatus> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|tasks| tasks.poller.status())
    }

    /// Fetches a fresh QR, waits for the remote session to settle, then
    /// requests a pairing code. QR and code are persisted as they arrive.
    async fn run_refresh_cycle(&self, token: &str, phone: &str) -> Result<(), WizardError> {
        let qr = self.api.fetch_qr(token).await?;
        self.apply(|state| state.qr_base64 = qr.qr_base64).await;
        self.emit(WizardEvent::QrRefreshed);

        // The remote session initializes after QR issuance; pairing requests
        // made too early come back empty.
        sleep(self.timing.settle_delay).await;

        let payload =
            pairing::request_pairing(self.api.as_ref(), token, phone, self.timing.retry_delay)
                .await?;
        let code = pairing::extract_pairing_code(&payload);

        {
            let code = code.clone();
            self.apply(|state| state.pairing_code = code).await;
        }
        self.emit(WizardEvent::PairingCodeReady(code));

        Ok(())
    }

    async fn start_connection_tasks(&self) {
        let token = self.state.read().await.token.clone();
        if token.is_empty() {
            return;
        }

        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            return;
        }

        let cancel = CancelFlag::new();
        let poller = StatusPoller::spawn(self.api.clone(), token, self.timing.status_interval);

        self.spawn_connected_watcher(poller.subscribe(), cancel.clone());
        self.spawn_auto_refresh(poller.subscribe(), cancel.clone());

        *slot = Some(ConnectionTasks { poller, cancel });
    }

    async fn stop_connection_tasks(&self) {
        if let Some(tasks) = self.connection.lock().await.take() {
            tasks.cancel.cancel();
            tasks.poller.cancel();
        }
    }

    /// Watches the poller and emits the dashboard navigation event once,
    /// after the grace period.
    fn spawn_connected_watcher(
        &self,
        mut status_rx: watch::Receiver<PollerStatus>,
        cancel: CancelFlag,
    ) {
        let wizard = self.clone();
        tokio::spawn(async move {
            loop {
                let connected = status_rx.borrow_and_update().is_connected();
                if connected {
                    wizard.emit(WizardEvent::Connected);
                    if wizard.navigated.swap(true, Ordering::SeqCst) {
                        return;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sleep(wizard.timing.navigate_grace) => {
                            if !wizard.closed.load(Ordering::SeqCst) {
                                wizard.emit(WizardEvent::NavigateToDashboard);
                            }
                        }
                    }
                    return;
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Periodically refreshes QR and pairing code until connected.
    fn spawn_auto_refresh(&self, status_rx: watch::Receiver<PollerStatus>, cancel: CancelFlag) {
        let wizard = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(wizard.timing.refresh_interval) => {}
                }

                if status_rx.borrow().is_connected() || wizard.closed.load(Ordering::SeqCst) {
                    return;
                }

                let (token, phone) = {
                    let state = wizard.state.read().await;
                    (state.token.clone(), state.phone.clone())
                };
                if phone.is_empty() {
                    return;
                }

                if let Err(error) = wizard.run_refresh_cycle(&token, &phone).await {
                    tracing::warn!(error = %error, "automatic refresh failed");
                }
            }
        });
    }

    /// One-shot refresh after restoring a session into the connection step.
    fn spawn_recovery_refresh(&self) {
        let wizard = self.clone();
        tokio::spawn(async move {
            let (token, phone) = {
                let state = wizard.state.read().await;
                (state.token.clone(), state.phone.clone())
            };

            if let Err(error) = wizard.run_refresh_cycle(&token, &phone).await {
                tracing::warn!(error = %error, "session recovery refresh failed");
            }
        });
    }

    /// Mutates the record and persists the full snapshot before returning.
    /// A closed wizard discards the write.
    async fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&mut OnboardingState),
    {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let snapshot = {
            let mut state = self.state.write().await;
            mutate(&mut state);
            state.clone()
        };

        if let Err(error) = self.store.save(&snapshot).await {
            tracing::warn!(error = %error, "failed to persist wizard state");
        }
    }

    fn emit(&self, event: WizardEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn resolve_initial_state(entry: EntryContext, saved: Option<OnboardingState>) -> OnboardingState {
    let entry_token = entry.token.filter(|token| !token.is_empty());
    let entry_phone = entry.phone.filter(|phone| !phone.is_empty());

    match entry_token {
        Some(token) => {
            let step = if entry_phone.is_some() {
                WizardStep::AwaitingConnection
            } else {
                WizardStep::EnteringPhone
            };
            let saved = saved.unwrap_or_default();

            OnboardingState {
                step,
                instance_name: saved.instance_name,
                token,
                phone: entry_phone.unwrap_or(saved.phone),
                qr_base64: saved.qr_base64,
                pairing_code: saved.pairing_code,
            }
        }
        None => saved.unwrap_or_default(),
    }
}

fn sanitize_instance_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::{
        EntryContext, OnboardingState, WizardStep, resolve_initial_state, sanitize_instance_name,
    };

    #[test]
    fn record_round_trips_through_json() {
        let state = OnboardingState {
            step: WizardStep::AwaitingConnection,
            instance_name: "Clinic One".to_owned(),
            token: "tok-1".to_owned(),
            phone: "41999999999".to_owned(),
            qr_base64: "data:image/png;base64,AAA".to_owned(),
            pairing_code: "ABCD-1234".to_owned(),
        };

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: OnboardingState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn record_uses_the_original_storage_keys() {
        let encoded = serde_json::to_value(OnboardingState::default()).unwrap();
        for key in ["step", "instanceName", "token", "phone", "qrBase64", "pairingCode"] {
            assert!(encoded.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(encoded["step"], 1);
    }

    #[test]
    fn out_of_range_step_fails_deserialization() {
        let result = serde_json::from_str::<OnboardingState>(r#"{"step":7}"#);
        assert!(result.is_err());
    }

    #[test]
    fn entry_token_and_phone_resolve_to_the_connection_step() {
        let resolved = resolve_initial_state(
            EntryContext {
                token: Some("tok-1".to_owned()),
                phone: Some("41999999999".to_owned()),
            },
            None,
        );

        assert_eq!(resolved.step, WizardStep::AwaitingConnection);
        assert_eq!(resolved.token, "tok-1");
        assert_eq!(resolved.phone, "41999999999");
    }

    #[test]
    fn entry_token_alone_resolves_to_the_phone_step() {
        let saved = OnboardingState {
            phone: "1188887777".to_owned(),
            ..OnboardingState::default()
        };
        let resolved = resolve_initial_state(
            EntryContext {
                token: Some("tok-2".to_owned()),
                phone: None,
            },
            Some(saved),
        );

        assert_eq!(resolved.step, WizardStep::EnteringPhone);
        assert_eq!(resolved.phone, "1188887777");
    }

    #[test]
    fn no_entry_falls_back_to_saved_or_defaults() {
        let saved = OnboardingState {
            step: WizardStep::EnteringPhone,
            token: "tok-3".to_owned(),
            ..OnboardingState::default()
        };
        let resolved = resolve_initial_state(EntryContext::default(), Some(saved.clone()));
        assert_eq!(resolved, saved);

        let resolved = resolve_initial_state(EntryContext::default(), None);
        assert_eq!(resolved, OnboardingState::default());
    }

    #[test]
    fn instance_name_sanitization_collapses_whitespace() {
        assert_eq!(sanitize_instance_name("Clinic One"), "Clinic-One");
        assert_eq!(sanitize_instance_name("  spaced   out  "), "spaced-out");
        assert_eq!(sanitize_instance_name("   "), "");
    }
}
