pub mod snapshot;
pub mod window;

pub use snapshot::Snapshot;
pub use window::{
    FrameRect, SubscriptionToken, WindowEvent, WindowId, WindowState, WindowType, WorkspaceId,
};

/// Канал, по которому источник событий передаёт их трекеру.
/// Неограниченный: события оконного менеджера не теряются.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<WindowEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<WindowEvent>;
