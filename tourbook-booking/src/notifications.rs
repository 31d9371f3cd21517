use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tourbook_core::notify::{BookingNotification, NotificationKind, NotificationSink};
use tourbook_core::Booking;
use tracing::{debug, warn};

/// Fire-and-forget handoff of status-change notifications.
///
/// `dispatch` never blocks and never fails: a full or closed channel drops the
/// message with a warning, and sink errors are logged by the worker.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: Option<mpsc::Sender<BookingNotification>>,
}

impl NotificationDispatcher {
    /// Start a worker draining into `sink`.
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<BookingNotification>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = sink.deliver(&notification).await {
                    warn!(
                        booking_id = %notification.booking_id,
                        "Failed to deliver {:?} notification: {}",
                        notification.kind,
                        e
                    );
                }
            }
            debug!("Notification worker stopped");
        });
        (Self { tx: Some(tx) }, handle)
    }

    /// Dispatcher plus the raw receiving end, for callers that drain it themselves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BookingNotification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn dispatch(&self, kind: NotificationKind, booking: &Booking) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(BookingNotification::from_booking(kind, booking)) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!(booking_id = %n.booking_id, "Notification queue full, dropping {:?}", n.kind);
            }
            Err(TrySendError::Closed(n)) => {
                warn!(booking_id = %n.booking_id, "Notification worker gone, dropping {:?}", n.kind);
            }
        }
    }
}
