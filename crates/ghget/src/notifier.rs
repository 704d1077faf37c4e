use ghget_check::{Notification, Notifier, NotifyError};

/// Announces new releases through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            event = %notification.event_id,
            title = %notification.title,
            "update available: {}",
            notification.body
        );
        Ok(())
    }
}
