use subtag_annotation_sync::{SyncEvent, SyncRuntime};

/// Background outcomes go to the log; the CLI has no other surface for
/// them.
pub struct CliRuntime;

impl SyncRuntime for CliRuntime {
    fn emit(&self, event: SyncEvent) {
        match &event {
            SyncEvent::WriteConfirmed {
                cache_key,
                record_id,
            } => {
                tracing::debug!(cache_key = %cache_key, record_id = %record_id, "write_confirmed");
            }
            SyncEvent::WriteFailed {
                cache_key,
                record_id,
                error,
                rolled_back,
            } => {
                tracing::error!(
                    cache_key = %cache_key,
                    record_id = %record_id,
                    rolled_back,
                    error = %error,
                    "write_failed"
                );
            }
            SyncEvent::RefreshFailed { cache_key, error } => {
                tracing::warn!(cache_key = %cache_key, error = %error, "refresh_failed");
            }
        }
    }
}
