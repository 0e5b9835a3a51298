//! Per-account publish/subscribe bus for asynchronous session events.
//!
//! Sessions publish (many writers); listeners subscribe with an explicit
//! handle. Each subscription runs in its own task, so listeners are always
//! invoked off the caller's task. Every subscriber has its own unbounded
//! queue: a slow listener delays its own events but never loses them.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{AccountId, ConfirmedMessage, LocalMessageId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    MessageReceivedByServer,
    MessageSendFailed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A queued message was persisted by the server. `message` is `None` when
    /// the session could not decode the server's copy.
    MessageReceivedByServer {
        old_local_id: LocalMessageId,
        message: Option<ConfirmedMessage>,
    },
    /// A queued message was rejected and will never be confirmed.
    MessageSendFailed { local_id: LocalMessageId },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::MessageReceivedByServer { .. } => NotificationKind::MessageReceivedByServer,
            Self::MessageSendFailed { .. } => NotificationKind::MessageSendFailed,
        }
    }
}

#[async_trait]
pub trait NotificationListener: Send + Sync {
    async fn on_notification(&self, account: AccountId, notification: Notification);
}

struct Subscriber {
    kinds: Vec<NotificationKind>,
    tx: mpsc::UnboundedSender<Notification>,
}

#[derive(Default)]
pub struct NotificationCenter {
    subscribers: Mutex<HashMap<AccountId, Vec<Subscriber>>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every live subscriber of `account` interested in this
    /// kind. Returns how many subscribers it was queued for.
    pub async fn publish(&self, account: AccountId, notification: Notification) -> usize {
        let mut map = self.subscribers.lock().await;
        let Some(subs) = map.get_mut(&account) else {
            return 0;
        };
        subs.retain(|s| !s.tx.is_closed());

        let kind = notification.kind();
        let mut delivered = 0;
        for sub in subs.iter().filter(|s| s.kinds.contains(&kind)) {
            if sub.tx.send(notification.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub async fn subscriber_count(&self, account: AccountId) -> usize {
        let map = self.subscribers.lock().await;
        map.get(&account)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Start delivering `kinds` for `account` to `listener` until the returned
    /// handle is cancelled or dropped.
    pub async fn subscribe(
        &self,
        account: AccountId,
        kinds: &[NotificationKind],
        listener: Arc<dyn NotificationListener>,
    ) -> Subscription {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(account)
            .or_default()
            .push(Subscriber {
                kinds: kinds.to_vec(),
                tx,
            });

        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = tok.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(n) => listener.on_notification(account, n).await,
                        None => break,
                    }
                }
            }
        });

        Subscription {
            account,
            cancel,
            handle: Some(handle),
        }
    }
}

/// Scoped subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    account: AccountId,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Token that stops delivery when cancelled. Listeners may hold a clone
    /// to unsubscribe themselves.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .handle
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false)
    }

    /// Unsubscribe and wait for the delivery task to exit.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{eventually, eventually_within};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<(AccountId, Notification)>>,
    }

    #[async_trait]
    impl NotificationListener for Recorder {
        async fn on_notification(&self, account: AccountId, notification: Notification) {
            self.seen.lock().unwrap().push((account, notification));
        }
    }

    fn confirmed(local: i64) -> Notification {
        Notification::MessageReceivedByServer {
            old_local_id: LocalMessageId(local),
            message: None,
        }
    }

    #[tokio::test]
    async fn delivers_only_subscribed_kinds_for_the_account() {
        let bus = NotificationCenter::new();
        let rec = Arc::new(Recorder::default());
        let _sub = bus
            .subscribe(
                AccountId(1),
                &[NotificationKind::MessageReceivedByServer],
                rec.clone(),
            )
            .await;

        bus.publish(AccountId(2), confirmed(1)).await;
        bus.publish(
            AccountId(1),
            Notification::MessageSendFailed {
                local_id: LocalMessageId(2),
            },
        )
        .await;
        bus.publish(AccountId(1), confirmed(3)).await;

        eventually(|| rec.seen.lock().unwrap().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = rec.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(AccountId(1), confirmed(3))]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = NotificationCenter::new();
        let rec = Arc::new(Recorder::default());
        let sub = bus
            .subscribe(
                AccountId(1),
                &[NotificationKind::MessageReceivedByServer],
                rec.clone(),
            )
            .await;
        assert!(sub.is_active());
        assert_eq!(bus.subscriber_count(AccountId(1)).await, 1);

        sub.unsubscribe().await;
        assert_eq!(bus.subscriber_count(AccountId(1)).await, 0);
        assert_eq!(bus.publish(AccountId(1), confirmed(1)).await, 0);
    }

    #[tokio::test]
    async fn independent_subscribers_each_receive_events() {
        let bus = NotificationCenter::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let kinds = [NotificationKind::MessageReceivedByServer];
        let _sa = bus.subscribe(AccountId(1), &kinds, a.clone()).await;
        let _sb = bus.subscribe(AccountId(1), &kinds, b.clone()).await;

        assert_eq!(bus.publish(AccountId(1), confirmed(9)).await, 2);
        eventually(|| a.seen.lock().unwrap().len() == 1 && b.seen.lock().unwrap().len() == 1)
            .await;
    }

    struct SlowRecorder {
        seen: StdMutex<Vec<LocalMessageId>>,
    }

    #[async_trait]
    impl NotificationListener for SlowRecorder {
        async fn on_notification(&self, _account: AccountId, notification: Notification) {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if let Notification::MessageReceivedByServer { old_local_id, .. } = notification {
                self.seen.lock().unwrap().push(old_local_id);
            }
        }
    }

    #[tokio::test]
    async fn slow_listener_receives_every_event_in_order() {
        const N: i64 = 600;
        let bus = NotificationCenter::new();
        let rec = Arc::new(SlowRecorder {
            seen: StdMutex::new(Vec::new()),
        });
        let _sub = bus
            .subscribe(
                AccountId(1),
                &[NotificationKind::MessageReceivedByServer],
                rec.clone(),
            )
            .await;

        for i in 0..N {
            assert_eq!(bus.publish(AccountId(1), confirmed(i)).await, 1);
        }

        eventually_within(Duration::from_secs(20), || {
            rec.seen.lock().unwrap().len() == N as usize
        })
        .await;
        let seen = rec.seen.lock().unwrap().clone();
        assert_eq!(seen, (0..N).map(LocalMessageId).collect::<Vec<_>>());
    }
}
