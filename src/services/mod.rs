pub mod active_window_tracker;
pub mod change_detector;
pub mod notifier;
pub mod receiver;
pub mod service;
pub mod snapshot_builder;
pub mod window_source;

pub use active_window_tracker::{ActiveWindowTracker, TrackerService};
pub use notifier::create_notifier;
pub use receiver::ReceiverService;
pub use service::Service;
pub use window_source::create_window_source;
