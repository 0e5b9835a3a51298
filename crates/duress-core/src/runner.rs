use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, Instant};

use crate::{
    actions::{
        correlation::{CorrelationStrategy, ExactTextCorrelation},
        Action, ActionContext,
    },
    bundle::AccountActions,
    domain::AccountId,
    location::StaticLocation,
    notifications::NotificationCenter,
    ports::{LocationProvider, SessionProvider},
    store::{ActionStore, SaveRequests},
    Result,
};

const CONFIRMATION_POLL: Duration = Duration::from_millis(50);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerReport {
    pub accounts_run: usize,
    pub accounts_skipped: usize,
    pub actions_run: usize,
    pub saved: bool,
}

/// Holds every account's configured actions and runs them when the trigger
/// fires.
pub struct ActionRunner {
    accounts: Vec<AccountActions>,
    sessions: Arc<dyn SessionProvider>,
    notifications: Arc<NotificationCenter>,
    location: Arc<dyn LocationProvider>,
    correlation: Arc<dyn CorrelationStrategy>,
    store: Arc<dyn ActionStore>,
    saves: Arc<SaveRequests>,
    confirmation_timeout: Duration,
}

impl ActionRunner {
    pub fn new(
        accounts: Vec<AccountActions>,
        sessions: Arc<dyn SessionProvider>,
        notifications: Arc<NotificationCenter>,
        store: Arc<dyn ActionStore>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            notifications,
            location: Arc::new(StaticLocation::default()),
            correlation: Arc::new(ExactTextCorrelation),
            store,
            saves: Arc::new(SaveRequests::default()),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    /// Build a runner from whatever the store currently holds.
    pub fn load(
        sessions: Arc<dyn SessionProvider>,
        notifications: Arc<NotificationCenter>,
        store: Arc<dyn ActionStore>,
    ) -> Result<Self> {
        let accounts = store.load()?;
        Ok(Self::new(accounts, sessions, notifications, store))
    }

    pub fn with_location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = location;
        self
    }

    pub fn with_correlation(mut self, correlation: Arc<dyn CorrelationStrategy>) -> Self {
        self.correlation = correlation;
        self
    }

    /// How long log-out waits for decoy deletes before running anyway.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn accounts(&self) -> &[AccountActions] {
        &self.accounts
    }

    pub fn account(&self, id: AccountId) -> Option<&AccountActions> {
        self.accounts.iter().find(|a| a.account_id == id)
    }

    /// The bundle for `id`, created empty if missing.
    pub fn account_mut(&mut self, id: AccountId) -> &mut AccountActions {
        let idx = match self.accounts.iter().position(|a| a.account_id == id) {
            Some(i) => i,
            None => {
                self.accounts.push(AccountActions::new(id));
                self.accounts.len() - 1
            }
        };
        &mut self.accounts[idx]
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.accounts)
    }

    /// Run every configured action, account by account, in order.
    ///
    /// Actions that end the session (log-out) are held back until the decoy
    /// deletes queued by the first pass have drained or the confirmation
    /// timeout has passed.
    pub async fn trigger(&mut self) -> TriggerReport {
        let mut report = TriggerReport::default();
        let mut contexts: Vec<Option<ActionContext>> = Vec::with_capacity(self.accounts.len());

        for bundle in self.accounts.iter_mut() {
            let Some(session) = self.sessions.session(bundle.account_id) else {
                tracing::warn!(account = %bundle.account_id, "no session for account, skipping");
                report.accounts_skipped += 1;
                contexts.push(None);
                continue;
            };

            let ctx = ActionContext {
                session,
                notifications: self.notifications.clone(),
                location: self.location.clone(),
                correlation: self.correlation.clone(),
                persistence: self.saves.clone(),
            };
            for action in bundle.actions_mut() {
                if action.runs_after_drain() {
                    continue;
                }
                action.execute(&ctx).await;
                report.actions_run += 1;
            }
            report.accounts_run += 1;
            contexts.push(Some(ctx));
        }

        let deferred = self
            .accounts
            .iter()
            .zip(&contexts)
            .any(|(b, ctx)| ctx.is_some() && b.actions().iter().any(Action::runs_after_drain));
        if deferred {
            self.wait_for_confirmations(self.confirmation_timeout).await;
            for (bundle, ctx) in self.accounts.iter_mut().zip(&contexts) {
                let Some(ctx) = ctx else {
                    continue;
                };
                for action in bundle.actions_mut() {
                    if action.runs_after_drain() {
                        action.execute(ctx).await;
                        report.actions_run += 1;
                    }
                }
            }
        }

        if self.saves.take() {
            match self.store.save(&self.accounts) {
                Ok(()) => report.saved = true,
                Err(e) => tracing::error!("failed to save action configuration: {e}"),
            }
        }

        tracing::info!(
            accounts = report.accounts_run,
            skipped = report.accounts_skipped,
            actions = report.actions_run,
            saved = report.saved,
            "panic actions executed"
        );
        report
    }

    /// Decoy messages across all accounts still waiting for confirmation.
    pub async fn outstanding(&self) -> usize {
        let mut total = 0;
        for bundle in &self.accounts {
            total += bundle.outstanding().await;
        }
        total
    }

    /// Wait until every decoy confirmation has been handled or `timeout`
    /// passes. Returns whether nothing is left outstanding.
    pub async fn wait_for_confirmations(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let left = self.outstanding().await;
            if left == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(outstanding = left, "gave up waiting for decoy confirmations");
                return false;
            }
            sleep(CONFIRMATION_POLL).await;
        }
    }
}
