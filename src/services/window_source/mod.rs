//! Host window managers behind the `WindowSource` trait

mod dry_run;
mod sway;
mod x11;
mod r#trait;

#[cfg(test)]
pub use self::dry_run::{DryRunSource, SimulatedDesktop};
pub use self::r#trait::{create_window_source, WindowSource};
