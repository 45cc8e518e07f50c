use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use shared::headers::Header;
use shared::message::{Message, MessageType};
use shared::types::{Advertisement, Notification, Update};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pool::{ControlPool, InterfacePool};
use crate::scope::Scope;

/// Default capacity of the notification channel
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Handle to a running discovery service.
///
/// Construction starts the pool and the processing task; `stop` is terminal.
pub struct DiscoveryService<P: ControlPool = InterfacePool> {
    pool: Arc<P>,
    scope: Scope,
    task: JoinHandle<()>,
}

impl<P: ControlPool> DiscoveryService<P> {
    pub fn new(
        pool: Arc<P>,
        messages: mpsc::Receiver<Message>,
        scope: Scope,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);

        let reconciler = Reconciler {
            known: HashMap::new(),
            pool: Arc::clone(&pool),
            notifications: tx,
            cancel: scope.child_token(),
        };
        let task = scope.spawn(reconciler.run(messages));

        let started = pool.start(None);
        tracing::info!("Discovery service started on {} interface(s)", started);

        (Self { pool, scope, task }, rx)
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// Search for everything on every interface
    pub fn search(&self) {
        self.pool.search(None, None);
    }

    /// Stop the pool and cancel the processing task. Not restartable.
    pub fn stop(&self) {
        self.pool.stop(None);
        self.scope.cancel();
        tracing::info!("Discovery service stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Owns the known-device registry; only its task ever touches it
struct Reconciler<P> {
    known: HashMap<String, Message>,
    pool: Arc<P>,
    notifications: mpsc::Sender<Notification>,
    cancel: CancellationToken,
}

impl<P: ControlPool> Reconciler<P> {
    async fn run(mut self, mut messages: mpsc::Receiver<Message>) {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => {
                        let kind = message.kind();
                        if let Err(e) = self.process(message).await {
                            tracing::warn!("Ignoring {}: {}", kind, e);
                        }
                    }
                    None => {
                        tracing::info!("Inbound queue closed");
                        break;
                    }
                },
            }
        }
        tracing::debug!("Discovery processing task exited with {} known device(s)", self.known.len());
    }

    async fn process(&mut self, message: Message) -> Result<()> {
        match message.kind() {
            MessageType::Search => Ok(()),
            MessageType::SearchResponse | MessageType::NotifyAlive => {
                self.on_advertisement(message).await
            }
            MessageType::NotifyUpdate => self.on_update(&message).await,
            MessageType::NotifyByeBye => self.on_byebye(&message).await,
        }
    }

    async fn on_advertisement(&mut self, message: Message) -> Result<()> {
        let ad = Advertisement::from_message(&message)?;
        tracing::debug!("New advertisement: {:?}", ad);

        if !ad.is_valid() {
            tracing::debug!("Advertisement from {} already expired", ad.usn);
            return Ok(());
        }

        self.known.insert(ad.usn.clone(), message);
        self.emit(Notification::add(&ad)).await;
        Ok(())
    }

    async fn on_update(&mut self, message: &Message) -> Result<()> {
        let update = Update::from_message(message)?;
        tracing::debug!("New update: {:?}", update);

        match self.known.get_mut(&update.usn) {
            Some(known) if known.boot_id() == update.boot_id => {
                known.set_boot_id(update.next_boot_id);
                return Ok(());
            }
            // boot id moved without an update we saw: the device rebooted
            Some(_) => self.remove(&update.usn).await,
            None => {}
        }

        tracing::debug!("Update for unknown device or with unexpected boot id: {}", update.usn);
        self.pool
            .search(Some(update.device_uuid()), update.sender);
        Ok(())
    }

    async fn on_byebye(&mut self, message: &Message) -> Result<()> {
        let usn = message.required_header(Header::UniqueServiceName)?.to_string();
        tracing::debug!("ByeBye from {}", usn);
        self.remove(&usn).await;
        Ok(())
    }

    async fn remove(&mut self, usn: &str) {
        self.known.remove(usn);
        self.emit(Notification::remove(usn)).await;
    }

    /// Waits for room in the channel unless the service is stopped first
    async fn emit(&self, notification: Notification) {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!("Notification dropped: service stopped");
            }
            sent = self.notifications.send(notification) => {
                if sent.is_err() {
                    tracing::warn!("Notification receiver dropped");
                }
            }
        }
    }
}
