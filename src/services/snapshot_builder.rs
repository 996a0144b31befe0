//! Maps the window-manager view of the active window to a [`Snapshot`].
//!
//! Pure: everything it needs is passed in, the caller queries the host.

use crate::events::{Snapshot, WindowState, WorkspaceId};
use crate::trace_if_enabled;

/// Строит снимок активного окна.
///
/// `ignore_hidden` отключает проверку скрытости, чтобы разворачивание
/// свёрнутого окна было заметно до того, как менеджер пометит его видимым.
pub fn build(
    window: Option<&WindowState>,
    active_workspace: Option<WorkspaceId>,
    ignore_hidden: bool,
) -> Snapshot {
    let Some(window) = window else {
        return Snapshot::sentinel();
    };

    if !window.alive || (!ignore_hidden && window.hidden) || window.minimized {
        return Snapshot::sentinel();
    }

    if !window.is_normal() {
        return Snapshot::sentinel();
    }

    if !window.on_all_workspaces && (window.workspace.is_none() || window.workspace != active_workspace) {
        return Snapshot::sentinel();
    }

    let Some((x, y, width, height)) = window.frame.complete() else {
        return Snapshot::sentinel();
    };

    // Прямоугольник уже в логических координатах; масштаб только проверяем
    let scale = window.scale.filter(|s| s.is_finite()).unwrap_or(1.0);
    trace_if_enabled!("Окно {}: масштаб монитора {}", window.id, scale);

    Snapshot::visible(
        window.id.to_string(),
        window.pid.unwrap_or(-1),
        x,
        y,
        width,
        height,
    )
}
