use crate::error::Result;
use crate::events::{
    EventSender, FrameRect, SubscriptionToken, WindowEvent, WindowId, WindowState, WorkspaceId,
};
use crate::tracker_error;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::info;

use super::r#trait::WindowSource;

/// Эмулируемый рабочий стол: окна, фокус, рабочие столы и подписки.
///
/// Изменения состояния рассылают события так же, как это делает настоящий
/// оконный менеджер: события окна приходят только для подписанных окон.
#[derive(Clone, Default)]
pub struct SimulatedDesktop {
    state: Arc<RwLock<DesktopState>>,
}

#[derive(Default)]
struct DesktopState {
    windows: BTreeMap<WindowId, WindowState>,
    active_workspace: WorkspaceId,
    focused: Option<WindowId>,
    subscriptions: HashMap<WindowId, Vec<SubscriptionToken>>,
    next_token: u64,
    events: Option<EventSender>,
}

impl DesktopState {
    fn emit(&self, event: WindowEvent) {
        if let Some(events) = &self.events {
            // Трекер мог уже завершиться
            let _ = events.send(event);
        }
    }

    fn emit_for(&self, id: WindowId, event: WindowEvent) {
        if self.subscriptions.contains_key(&id) {
            self.emit(event);
        }
    }
}

impl SimulatedDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, window: WindowState) {
        let mut state = self.state.write();
        let id = window.id;
        state.windows.insert(id, window);
        state.emit(WindowEvent::WindowCreated(id));
    }

    pub fn focus(&self, id: WindowId) {
        let mut state = self.state.write();
        state.focused = Some(id);
        state.emit_for(id, WindowEvent::WindowActivated(id));
    }

    pub fn set_frame(&self, id: WindowId, frame: FrameRect) {
        let mut state = self.state.write();
        if let Some(window) = state.windows.get_mut(&id) {
            window.frame = frame;
            state.emit_for(id, WindowEvent::WindowGeometryChanged(id));
        }
    }

    pub fn set_minimized(&self, id: WindowId, minimized: bool) {
        let mut state = self.state.write();
        if let Some(window) = state.windows.get_mut(&id) {
            window.minimized = minimized;
            window.hidden = minimized;
            state.emit_for(id, WindowEvent::WindowMinimizedChanged(id));
        }
    }

    /// Меняет только свёрнутость: менеджер ещё не снял флаг скрытости
    #[cfg(test)]
    pub fn set_minimized_keep_hidden(&self, id: WindowId, minimized: bool) {
        let mut state = self.state.write();
        if let Some(window) = state.windows.get_mut(&id) {
            window.minimized = minimized;
            state.emit_for(id, WindowEvent::WindowMinimizedChanged(id));
        }
    }

    #[cfg(test)]
    pub fn move_to_workspace(&self, id: WindowId, workspace: WorkspaceId) {
        let mut state = self.state.write();
        if let Some(window) = state.windows.get_mut(&id) {
            window.workspace = Some(workspace);
            state.emit_for(id, WindowEvent::WindowGeometryChanged(id));
        }
    }

    #[cfg(test)]
    /// Окно уничтожается; подписки остаются, пока их не снимет трекер
    pub fn close(&self, id: WindowId) {
        let mut state = self.state.write();
        if state.windows.remove(&id).is_some() {
            if state.focused == Some(id) {
                state.focused = None;
            }
            state.emit_for(id, WindowEvent::WindowClosed(id));
        }
    }

    #[cfg(test)]
    /// Меняет фокус без события активации (менеджер уже выбрал новое окно)
    pub fn set_focus_silently(&self, id: Option<WindowId>) {
        self.state.write().focused = id;
    }

    pub fn switch_workspace(&self, workspace: WorkspaceId) {
        let mut state = self.state.write();
        state.active_workspace = workspace;
        state.emit(WindowEvent::ActiveWorkspaceChanged);
    }

    #[cfg(test)]
    pub fn subscription_count(&self, id: WindowId) -> usize {
        self.state
            .read()
            .subscriptions
            .get(&id)
            .map_or(0, |tokens| tokens.len())
    }

    #[cfg(test)]
    pub fn total_subscriptions(&self) -> usize {
        self.state.read().subscriptions.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn global_subscribed(&self) -> bool {
        self.state.read().events.is_some()
    }
}

pub struct DryRunSource {
    desktop: SimulatedDesktop,
    scripted: bool,
    scenario: Option<JoinHandle<()>>,
}

impl DryRunSource {
    #[cfg(test)]
    pub fn new(desktop: SimulatedDesktop) -> Self {
        Self {
            desktop,
            scripted: false,
            scenario: None,
        }
    }

    /// Источник с эмуляцией действий пользователя для режима --dry-run
    pub fn scripted() -> Self {
        info!("Dry-run режим - оконный менеджер эмулируется");
        Self {
            desktop: SimulatedDesktop::new(),
            scripted: true,
            scenario: None,
        }
    }

    async fn run_scenario(desktop: SimulatedDesktop) {
        let fake_windows = [
            (WindowId(101), 4101, "Terminal - dry_run", FrameRect::new(40.0, 60.0, 800.0, 500.0)),
            (WindowId(102), 4102, "Browser - dry_run", FrameRect::new(200.0, 120.0, 1200.0, 800.0)),
            (WindowId(103), 4103, "Editor - dry_run", FrameRect::new(0.0, 0.0, 960.0, 1080.0)),
        ];

        for (id, pid, title, frame) in fake_windows {
            info!("Dry-run: открываем окно {} ({})", title, id);
            desktop.open(
                WindowState::new(id)
                    .with_pid(pid)
                    .with_workspace(WorkspaceId(0))
                    .with_frame(frame),
            );
        }

        let mut step = 0usize;
        let mut interval = interval(Duration::from_secs(10));

        loop {
            interval.tick().await;

            let (id, _, title, frame) = fake_windows[step % fake_windows.len()];
            match step % 4 {
                0 => {
                    info!("Dry-run: эмулируем фокус на {}", title);
                    desktop.focus(id);
                }
                1 => {
                    info!("Dry-run: эмулируем перемещение {}", title);
                    desktop.focus(id);
                    let moved = FrameRect::new(
                        frame.x.unwrap_or(0.0) + 25.0,
                        frame.y.unwrap_or(0.0) + 25.0,
                        frame.width.unwrap_or(640.0),
                        frame.height.unwrap_or(480.0),
                    );
                    desktop.set_frame(id, moved);
                }
                2 => {
                    info!("Dry-run: эмулируем свёртывание и разворачивание {}", title);
                    desktop.focus(id);
                    desktop.set_minimized(id, true);
                    desktop.set_minimized(id, false);
                }
                _ => {
                    info!("Dry-run: эмулируем переключение рабочего стола");
                    desktop.switch_workspace(WorkspaceId(1));
                    desktop.switch_workspace(WorkspaceId(0));
                }
            }

            step += 1;
        }
    }
}

impl WindowSource for DryRunSource {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn subscribe_global(&mut self, events: EventSender) -> Result<()> {
        self.desktop.state.write().events = Some(events);

        if self.scripted && self.scenario.is_none() {
            let desktop = self.desktop.clone();
            self.scenario = Some(tokio::spawn(Self::run_scenario(desktop)));
        }
        Ok(())
    }

    fn unsubscribe_global(&mut self) {
        self.desktop.state.write().events = None;
        if let Some(scenario) = self.scenario.take() {
            scenario.abort();
        }
    }

    fn windows(&self) -> Result<Vec<WindowId>> {
        Ok(self.desktop.state.read().windows.keys().copied().collect())
    }

    fn subscribe_window(&mut self, id: WindowId) -> Result<SubscriptionToken> {
        let mut state = self.desktop.state.write();
        if !state.windows.contains_key(&id) {
            return Err(tracker_error!(internal, "окно {} не существует", id));
        }
        state.next_token += 1;
        let token = SubscriptionToken(state.next_token);
        state.subscriptions.entry(id).or_default().push(token);
        Ok(token)
    }

    fn unsubscribe_window(&mut self, id: WindowId, token: SubscriptionToken) {
        let mut state = self.desktop.state.write();
        if let Some(tokens) = state.subscriptions.get_mut(&id) {
            tokens.retain(|t| *t != token);
            if tokens.is_empty() {
                state.subscriptions.remove(&id);
            }
        }
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.desktop.state.read().windows.get(&id).cloned()
    }

    fn active_workspace(&self) -> Option<WorkspaceId> {
        Some(self.desktop.state.read().active_workspace)
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.desktop.state.read().focused
    }
}
