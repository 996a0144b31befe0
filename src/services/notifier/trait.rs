use crate::config::IpcConfig;
use crate::error::Result;
use crate::events::Snapshot;

/// Trait for best-effort delivery of active-window snapshots.
///
/// `notify` never blocks and never fails: delivery problems are logged by the
/// implementation and dropped.
pub trait Notifier: Send {
    fn notify(&self, snapshot: &Snapshot);
}

/// Factory function to create an appropriate notifier based on the dry_run flag
pub async fn create_notifier(ipc: &IpcConfig, dry_run: bool) -> Result<Box<dyn Notifier>> {
    if dry_run {
        Ok(Box::new(super::dry_run::DryRunNotifier::new()))
    } else {
        Ok(Box::new(super::dbus::DBusNotifier::connect(ipc.clone()).await?))
    }
}
