use crate::config::Config;
use crate::error::Result;
use crate::events::{EventSender, SubscriptionToken, WindowId, WindowState, WorkspaceId};
use crate::tracker_error;
use std::str::FromStr;
use tracing::{info, warn};

/// Capability interface over a host window manager.
///
/// A source is a relay: it connects listeners, forwards host events in host
/// order through the channel handed to `subscribe_global`, and answers
/// queries. Per-window events are only forwarded for windows subscribed via
/// `subscribe_window`. It makes no decisions about which window is active.
pub trait WindowSource: Send {
    fn name(&self) -> &'static str;

    /// Start delivering global events (window created, workspace changed)
    /// and per-window events for subscribed windows.
    fn subscribe_global(&mut self, events: EventSender) -> Result<()>;

    fn unsubscribe_global(&mut self);

    /// Top-level windows that currently exist
    fn windows(&self) -> Result<Vec<WindowId>>;

    fn subscribe_window(&mut self, id: WindowId) -> Result<SubscriptionToken>;

    /// Must tolerate windows that are already gone
    fn unsubscribe_window(&mut self, id: WindowId, token: SubscriptionToken);

    /// `None` when the host can no longer describe the window
    fn window_state(&self, id: WindowId) -> Option<WindowState>;

    fn active_workspace(&self) -> Option<WorkspaceId>;

    /// The window currently holding input focus according to the host
    fn focused_window(&self) -> Option<WindowId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Auto,
    X11,
    Sway,
}

impl FromStr for HostKind {
    type Err = crate::error::TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "x11" => Ok(Self::X11),
            "sway" => Ok(Self::Sway),
            other => Err(tracker_error!(host_unavailable, "неизвестный оконный менеджер '{}'", other)),
        }
    }
}

impl HostKind {
    /// Определяет оконный менеджер по окружению сессии
    pub fn detect() -> Result<Self> {
        Self::detect_from(|name| std::env::var(name).ok())
    }

    fn detect_from(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |name: &str| env(name).is_some_and(|v| !v.is_empty());

        if present("SWAYSOCK") || present("I3SOCK") {
            return Ok(Self::Sway);
        }

        if present("DISPLAY") {
            if env("XDG_SESSION_TYPE").as_deref() == Some("wayland") {
                warn!("Wayland-сессия: через Xwayland будут видны только X11-окна");
            }
            return Ok(Self::X11);
        }

        Err(tracker_error!(
            host_unavailable,
            "не найден поддерживаемый оконный менеджер (нет SWAYSOCK и DISPLAY)"
        ))
    }
}

/// Factory function to create the window source for the configured host
pub fn create_window_source(config: &Config, dry_run: bool) -> Result<Box<dyn WindowSource>> {
    if dry_run {
        return Ok(Box::new(super::dry_run::DryRunSource::scripted()));
    }

    let kind = match config.tracker.host.parse::<HostKind>()? {
        HostKind::Auto => HostKind::detect()?,
        kind => kind,
    };
    info!("Оконный менеджер: {:?}", kind);

    match kind {
        HostKind::X11 => Ok(Box::new(super::x11::X11Source::connect()?)),
        HostKind::Sway => Ok(Box::new(super::sway::SwaySource::new(config.sway.command.clone()))),
        HostKind::Auto => Err(tracker_error!(internal, "оконный менеджер не определён")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_detect_prefers_sway() {
        let env = env_of(&[("SWAYSOCK", "/run/user/1000/sway-ipc.sock"), ("DISPLAY", ":0")]);
        assert_eq!(HostKind::detect_from(env).unwrap(), HostKind::Sway);
    }

    #[test]
    fn test_detect_x11() {
        let env = env_of(&[("DISPLAY", ":0"), ("XDG_SESSION_TYPE", "x11")]);
        assert_eq!(HostKind::detect_from(env).unwrap(), HostKind::X11);
    }

    #[test]
    fn test_detect_nothing() {
        assert!(HostKind::detect_from(env_of(&[("DISPLAY", "")])).is_err());
    }

    #[test]
    fn test_parse_host_kind() {
        assert_eq!("x11".parse::<HostKind>().unwrap(), HostKind::X11);
        assert!("kwin".parse::<HostKind>().is_err());
    }
}
