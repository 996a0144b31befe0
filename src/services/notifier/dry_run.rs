use crate::events::Snapshot;
use tracing::info;

use super::dbus::encode;
use super::r#trait::Notifier;

pub struct DryRunNotifier;

impl DryRunNotifier {
    pub fn new() -> Self {
        info!("Dry-run режим - уведомления D-Bus только логируются");
        Self
    }
}

impl Notifier for DryRunNotifier {
    fn notify(&self, snapshot: &Snapshot) {
        let (uid, pid, x, y, width, height) = encode(snapshot);
        info!(
            "[DRY RUN] updateActiveWindow(\"{}\", {}, {}, {}, {}, {})",
            uid, pid, x, y, width, height
        );
    }
}
