mod dbus;
mod dry_run;
mod r#trait;

pub use self::r#trait::{create_notifier, Notifier};

/// Адрес получателя в Shijima-Qt. Должен совпадать побитно.
pub const SERVICE_NAME: &str = "com.pixelomer.ShijimaQt";
pub const OBJECT_PATH: &str = "/";
pub const INTERFACE_NAME: &str = "com.pixelomer.ShijimaQt";
pub const METHOD_NAME: &str = "updateActiveWindow";

#[cfg(test)]
pub use self::recording::RecordingNotifier;
