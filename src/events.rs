//! Status-change events published through the observation hub.
//!
//! Every asynchronous outcome (registration result, device update, report)
//! and every intake change produces exactly one event. Presentation layers
//! subscribe to these instead of polling component state.

use crate::error::PushError;
use crate::platform::PermissionStatus;
use crate::record::NotificationRecord;
use crate::registration::RegistrationState;
use crate::stats::StatisticsSnapshot;

/// Change notification delivered to hub subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// The registration state machine moved between states.
    ///
    /// A failed registration arrives as a transition to
    /// [`RegistrationState::Failed`] carrying the error.
    StateChanged {
        /// State before the transition.
        from: RegistrationState,
        /// State after the transition.
        to: RegistrationState,
    },

    /// The platform's push permission changed.
    PermissionChanged {
        /// Permission before the change.
        from: PermissionStatus,
        /// Permission after the change.
        to: PermissionStatus,
    },

    /// Device metadata was re-submitted successfully.
    DeviceInfoUpdated,

    /// Device metadata update failed; registration remains valid.
    DeviceInfoUpdateFailed {
        /// Why the update failed.
        error: PushError,
    },

    /// A fresh notification was appended to history.
    NotificationReceived(NotificationRecord),

    /// A notification matched a recently seen dedup key and was not stored.
    DuplicateSuppressed(NotificationRecord),

    /// History and dedup store were emptied in one step.
    HistoryCleared,

    /// Statistics were accepted by the backend.
    StatisticsReported(StatisticsSnapshot),

    /// A statistics report failed and was dropped.
    StatisticsDropped {
        /// Why the report failed.
        error: PushError,
    },
}

impl StatusEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::PermissionChanged { .. } => "permission_changed",
            Self::DeviceInfoUpdated => "device_info_updated",
            Self::DeviceInfoUpdateFailed { .. } => "device_info_update_failed",
            Self::NotificationReceived(_) => "notification_received",
            Self::DuplicateSuppressed(_) => "duplicate_suppressed",
            Self::HistoryCleared => "history_cleared",
            Self::StatisticsReported(_) => "statistics_reported",
            Self::StatisticsDropped { .. } => "statistics_dropped",
        }
    }
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChanged { from, to } => write!(f, "{} -> {}", from.label(), to.label()),
            Self::PermissionChanged { from, to } => {
                write!(f, "permission {} -> {}", from.label(), to.label())
            }
            Self::DeviceInfoUpdateFailed { error } | Self::StatisticsDropped { error } => {
                write!(f, "{}: {error}", self.name())
            }
            Self::NotificationReceived(record) | Self::DuplicateSuppressed(record) => {
                write!(f, "{} {}", self.name(), record.identifier())
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}
