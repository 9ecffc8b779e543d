//! Lifecycle signals that gate and cancel requests.

use derive_more::Display;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum LifecycleState {
    /// Exists but isn't visible yet; requests wait.
    Created,
    Started,
    /// Gone for good; waiting and running requests are cancelled.
    Destroyed,
}

/// An observable state machine owned by something outside the pipeline,
/// typically whatever displays the image.
pub trait Lifecycle: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<LifecycleState>;
}

/// A lifecycle driven by explicit calls.
///
/// ```
/// use sketch::lifecycle::{Lifecycle, LifecycleState, ManualLifecycle};
///
/// let lifecycle = ManualLifecycle::new();
/// let receiver = lifecycle.subscribe();
/// lifecycle.start();
/// assert_eq!(*receiver.borrow(), LifecycleState::Started);
/// ```
#[derive(Debug)]
pub struct ManualLifecycle {
    sender: watch::Sender<LifecycleState>,
}

impl ManualLifecycle {
    /// A lifecycle in the [`Created`](LifecycleState::Created) state.
    pub fn new() -> Self {
        Self::with_state(LifecycleState::Created)
    }

    pub fn started() -> Self {
        Self::with_state(LifecycleState::Started)
    }

    pub fn with_state(state: LifecycleState) -> Self {
        Self { sender: watch::Sender::new(state) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.sender.borrow()
    }

    pub fn set_state(&self, state: LifecycleState) {
        self.sender.send_replace(state);
    }

    pub fn start(&self) {
        self.set_state(LifecycleState::Started);
    }

    pub fn destroy(&self) {
        self.set_state(LifecycleState::Destroyed);
    }
}

impl Default for ManualLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for ManualLifecycle {
    fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }
}

/// Wait until `receiver` reports started. Returns `false` if it was
/// destroyed (or dropped) first.
pub(crate) async fn wait_started(receiver: &mut watch::Receiver<LifecycleState>) -> bool {
    match receiver.wait_for(|state| *state != LifecycleState::Created).await {
        Ok(state) => *state == LifecycleState::Started,
        Err(_) => false,
    }
}

/// Resolves once `receiver` reports destroyed. Never resolves if the
/// lifecycle goes away without being destroyed.
pub(crate) async fn destroyed(mut receiver: watch::Receiver<LifecycleState>) {
    if receiver.wait_for(|state| *state == LifecycleState::Destroyed).await.is_err() {
        std::future::pending::<()>().await;
    }
}
