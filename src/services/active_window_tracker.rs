use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{
    EventReceiver, EventSender, Snapshot, SubscriptionToken, WindowEvent, WindowId,
};
use crate::services::change_detector::ChangeDetector;
use crate::services::notifier::Notifier;
use crate::services::service::Service;
use crate::services::snapshot_builder;
use crate::services::window_source::WindowSource;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    NoActiveWindow,
    ActiveVisible,
    ActiveHidden,
}

/// Отслеживает активное окно и сообщает об изменениях его состояния.
///
/// Все события обрабатываются последовательно одним владельцем, поэтому
/// состояние не защищено блокировками.
pub struct ActiveWindowTracker {
    source: Box<dyn WindowSource>,
    notifier: Box<dyn Notifier>,
    active_window: Option<WindowId>,
    change_detector: ChangeDetector,
    // Ровно одна подписка на каждое наблюдаемое окно
    registry: HashMap<WindowId, SubscriptionToken>,
    started: bool,
}

impl ActiveWindowTracker {
    pub fn new(source: Box<dyn WindowSource>, notifier: Box<dyn Notifier>) -> Self {
        info!("Инициализация ActiveWindowTracker (источник: {})", source.name());
        Self {
            source,
            notifier,
            active_window: None,
            change_detector: ChangeDetector::new(),
            registry: HashMap::new(),
            started: false,
        }
    }

    /// Подписывается на глобальные события, регистрирует существующие окна
    /// и отправляет начальное состояние.
    pub fn start(&mut self, events: EventSender) -> Result<()> {
        self.source.subscribe_global(events)?;
        self.started = true;

        for id in self.source.windows()? {
            self.register(id);
        }
        info!("Отслеживается {} окон", self.registry.len());

        if let Some(focused) = self.source.focused_window() {
            if self.registry.contains_key(&focused) {
                self.active_window = Some(focused);
            }
        }

        self.resolve_and_notify(false);
        Ok(())
    }

    pub fn handle_event(&mut self, event: WindowEvent) {
        debug_if_enabled!("Событие: {}", event);

        match event {
            WindowEvent::WindowCreated(id) => self.register(id),
            WindowEvent::WindowActivated(id) => {
                self.active_window = Some(id);
                self.resolve_and_notify(false);
            }
            WindowEvent::WindowGeometryChanged(id) => {
                if self.active_window == Some(id) {
                    self.resolve_and_notify(false);
                }
            }
            WindowEvent::WindowMinimizedChanged(id) => {
                if self.active_window == Some(id) {
                    self.resolve_and_notify(true);
                }
            }
            WindowEvent::WindowClosed(id) => self.handle_closed(id),
            WindowEvent::ActiveWorkspaceChanged => self.resolve_and_notify(false),
        }
    }

    fn handle_closed(&mut self, id: WindowId) {
        self.deregister(id);

        if self.active_window != Some(id) {
            return;
        }

        // Сначала сообщаем об уничтожении окна, затем о новом состоянии
        self.active_window = None;
        self.send(Snapshot::sentinel());

        self.active_window = self
            .source
            .focused_window()
            .filter(|next| *next != id && self.registry.contains_key(next));
        self.resolve_and_notify(false);
    }

    fn register(&mut self, id: WindowId) {
        if self.registry.contains_key(&id) {
            return;
        }

        let Some(window) = self.source.window_state(id) else {
            debug_if_enabled!("Окно {} исчезло до регистрации", id);
            return;
        };
        if !window.is_normal() {
            return;
        }

        match self.source.subscribe_window(id) {
            Ok(token) => {
                debug_if_enabled!("Зарегистрировано {}", window);
                self.registry.insert(id, token);
            }
            Err(e) => warn!("Не удалось подписаться на окно {}: {}", id, e),
        }
    }

    fn deregister(&mut self, id: WindowId) {
        if let Some(token) = self.registry.remove(&id) {
            self.source.unsubscribe_window(id, token);
            debug_if_enabled!("Окно {} снято с учёта", id);
        }
    }

    fn resolve_and_notify(&mut self, ignore_hidden: bool) {
        let snapshot = self.resolve(ignore_hidden);
        if self.change_detector.is_changed(&snapshot) {
            self.send(snapshot);
        }
    }

    fn resolve(&self, ignore_hidden: bool) -> Snapshot {
        let window = self.active_window.and_then(|id| self.source.window_state(id));
        snapshot_builder::build(window.as_ref(), self.source.active_workspace(), ignore_hidden)
    }

    fn send(&mut self, snapshot: Snapshot) {
        info!("Активное окно: {}", snapshot);
        self.notifier.notify(&snapshot);
        self.change_detector.record(snapshot);
        debug_if_enabled!("Состояние трекера: {:?}", self.phase());
    }

    /// Снимает все подписки. Повторный вызов ничего не делает.
    pub fn shutdown(&mut self) {
        if !self.started && self.registry.is_empty() {
            return;
        }

        let count = self.registry.len();
        for (id, token) in self.registry.drain() {
            self.source.unsubscribe_window(id, token);
        }

        if self.started {
            self.source.unsubscribe_global();
            self.started = false;
        }

        self.active_window = None;
        info!("ActiveWindowTracker остановлен, снято {} подписок", count);
    }

    pub fn phase(&self) -> TrackerPhase {
        match (self.active_window, self.change_detector.last_sent()) {
            (None, _) => TrackerPhase::NoActiveWindow,
            (Some(_), Some(snapshot)) if snapshot.is_visible() => TrackerPhase::ActiveVisible,
            (Some(_), _) => TrackerPhase::ActiveHidden,
        }
    }
}

impl Drop for ActiveWindowTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Цикл обработки событий трекера
pub struct TrackerService {
    tracker: ActiveWindowTracker,
}

impl TrackerService {
    pub fn new(tracker: ActiveWindowTracker) -> Self {
        Self { tracker }
    }
}

#[async_trait::async_trait]
impl Service for TrackerService {
    async fn run(self: Box<Self>, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        let mut tracker = self.tracker;
        let (events, mut incoming): (EventSender, EventReceiver) = mpsc::unbounded_channel();

        tracker.start(events)?;
        info!("ActiveWindowTracker запущен");

        loop {
            tokio::select! {
                event = incoming.recv() => match event {
                    Some(event) => tracker.handle_event(event),
                    None => {
                        warn!("Источник событий окон завершил работу");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Получен сигнал остановки трекера");
                    break;
                }
            }
        }

        tracker.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FrameRect, WindowState, WindowType, WorkspaceId};
    use crate::services::notifier::RecordingNotifier;
    use crate::services::window_source::{DryRunSource, SimulatedDesktop};

    impl ActiveWindowTracker {
        fn active_window(&self) -> Option<WindowId> {
            self.active_window
        }

        fn is_registered(&self, id: WindowId) -> bool {
            self.registry.contains_key(&id)
        }

        fn registered_count(&self) -> usize {
            self.registry.len()
        }
    }

    const W1: WindowId = WindowId(42);
    const W2: WindowId = WindowId(43);

    struct Harness {
        desktop: SimulatedDesktop,
        notifier: RecordingNotifier,
        tracker: ActiveWindowTracker,
        incoming: EventReceiver,
    }

    impl Harness {
        fn start_with(windows: Vec<WindowState>) -> Self {
            let desktop = SimulatedDesktop::new();
            for window in windows {
                desktop.open(window);
            }

            let notifier = RecordingNotifier::default();
            let mut tracker = ActiveWindowTracker::new(
                Box::new(DryRunSource::new(desktop.clone())),
                Box::new(notifier.clone()),
            );
            let (events, incoming) = mpsc::unbounded_channel();
            tracker.start(events).unwrap();

            Self {
                desktop,
                notifier,
                tracker,
                incoming,
            }
        }

        fn start() -> Self {
            Self::start_with(Vec::new())
        }

        fn pump(&mut self) {
            while let Ok(event) = self.incoming.try_recv() {
                self.tracker.handle_event(event);
            }
        }

        fn sent(&self) -> Vec<Snapshot> {
            self.notifier.sent()
        }
    }

    fn w1() -> WindowState {
        WindowState::new(W1)
            .with_pid(100)
            .with_workspace(WorkspaceId(0))
            .with_frame(FrameRect::new(10.0, 20.0, 300.0, 400.0))
    }

    fn w2() -> WindowState {
        WindowState::new(W2)
            .with_pid(200)
            .with_workspace(WorkspaceId(0))
            .with_frame(FrameRect::new(500.0, 50.0, 640.0, 480.0))
    }

    fn w1_snapshot() -> Snapshot {
        Snapshot::visible("42", 100, 10.0, 20.0, 300.0, 400.0)
    }

    /// Окно W1 создано и получило фокус
    fn focused_w1() -> Harness {
        let mut h = Harness::start();
        h.desktop.open(w1());
        h.pump();
        h.desktop.focus(W1);
        h.pump();
        h
    }

    #[test]
    fn test_no_windows_sends_single_sentinel() {
        let mut h = Harness::start();
        h.pump();

        assert_eq!(h.sent(), vec![Snapshot::sentinel()]);
        assert_eq!(h.tracker.phase(), TrackerPhase::NoActiveWindow);
    }

    #[test]
    fn test_activated_window_is_sent_once() {
        let mut h = focused_w1();
        assert_eq!(h.sent(), vec![Snapshot::sentinel(), w1_snapshot()]);
        assert_eq!(h.tracker.phase(), TrackerPhase::ActiveVisible);

        // повторная активация того же окна не меняет снимок
        h.desktop.focus(W1);
        h.pump();
        assert_eq!(h.notifier.count(), 2);
    }

    #[test]
    fn test_minimize_sends_one_sentinel() {
        let mut h = focused_w1();
        h.desktop.set_minimized(W1, true);
        h.pump();

        assert_eq!(h.notifier.count(), 3);
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));
        assert_eq!(h.tracker.phase(), TrackerPhase::ActiveHidden);

        h.desktop.set_minimized(W1, false);
        h.pump();
        assert_eq!(h.sent().last(), Some(&w1_snapshot()));
    }

    #[test]
    fn test_restore_ignores_stale_hidden_flag() {
        let mut h = focused_w1();
        h.desktop.set_minimized(W1, true);
        h.pump();
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));

        // окно развёрнуто, но менеджер всё ещё сообщает hidden
        h.desktop.set_minimized_keep_hidden(W1, false);
        h.pump();
        assert_eq!(h.notifier.count(), 4);
        assert_eq!(h.sent().last(), Some(&w1_snapshot()));
    }

    #[test]
    fn test_geometry_event_respects_hidden_flag() {
        let mut h = focused_w1();
        h.desktop.set_minimized(W1, true);
        h.pump();
        h.desktop.set_minimized_keep_hidden(W1, false);
        h.desktop.set_frame(W1, FrameRect::new(10.0, 20.0, 300.0, 400.0));
        h.pump();

        // разворачивание дало снимок, а геометрия при hidden его снова скрыла
        let sent = h.sent();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[3], w1_snapshot());
        assert_eq!(sent[4], Snapshot::sentinel());
    }

    #[test]
    fn test_closing_active_window_sends_single_sentinel() {
        let mut h = focused_w1();
        h.desktop.close(W1);
        h.pump();

        assert_eq!(
            h.sent(),
            vec![Snapshot::sentinel(), w1_snapshot(), Snapshot::sentinel()]
        );
        assert_eq!(h.tracker.active_window(), None);
        assert!(!h.tracker.is_registered(W1));
        assert_eq!(h.desktop.subscription_count(W1), 0);
    }

    #[test]
    fn test_closing_is_always_announced() {
        let mut h = focused_w1();
        h.desktop.set_minimized(W1, true);
        h.pump();
        let before = h.notifier.count();

        // последний снимок уже "нет окна", но закрытие всё равно сообщается
        h.desktop.close(W1);
        h.pump();
        assert_eq!(h.notifier.count(), before + 1);
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));
    }

    #[test]
    fn test_closing_active_window_then_new_focus() {
        let mut h = focused_w1();
        h.desktop.open(w2());
        h.pump();

        h.desktop.close(W1);
        h.desktop.set_focus_silently(Some(W2));
        h.pump();

        let sent = h.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2], Snapshot::sentinel());
        assert_eq!(sent[3], Snapshot::visible("43", 200, 500.0, 50.0, 640.0, 480.0));
        assert_eq!(h.tracker.active_window(), Some(W2));
    }

    #[test]
    fn test_closing_inactive_window_is_silent() {
        let mut h = focused_w1();
        h.desktop.open(w2());
        h.pump();

        h.desktop.close(W2);
        h.pump();
        assert_eq!(h.notifier.count(), 2);
        assert!(!h.tracker.is_registered(W2));
        assert_eq!(h.desktop.subscription_count(W2), 0);
    }

    #[test]
    fn test_geometry_change_of_active_window() {
        let mut h = focused_w1();
        h.desktop.set_frame(W1, FrameRect::new(15.0, 25.0, 310.0, 410.0));
        h.pump();

        assert_eq!(
            h.sent().last(),
            Some(&Snapshot::visible("42", 100, 15.0, 25.0, 310.0, 410.0))
        );
        assert_eq!(h.notifier.count(), 3);
    }

    #[test]
    fn test_geometry_change_of_inactive_window_is_ignored() {
        let mut h = focused_w1();
        h.desktop.open(w2());
        h.pump();

        h.desktop.set_frame(W2, FrameRect::new(0.0, 0.0, 100.0, 100.0));
        h.pump();
        assert_eq!(h.notifier.count(), 2);
    }

    #[test]
    fn test_unchanged_geometry_is_deduplicated() {
        let mut h = focused_w1();
        h.desktop.set_frame(W1, FrameRect::new(10.0, 20.0, 300.0, 400.0));
        h.desktop.set_frame(W1, FrameRect::new(10.0, 20.0, 300.0, 400.0));
        h.pump();
        assert_eq!(h.notifier.count(), 2);
    }

    #[test]
    fn test_missing_geometry_hides_window() {
        let mut h = focused_w1();
        h.desktop.set_frame(
            W1,
            FrameRect {
                width: None,
                ..FrameRect::new(10.0, 20.0, 300.0, 400.0)
            },
        );
        h.pump();
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));
    }

    #[test]
    fn test_workspace_switch_hides_and_restores() {
        let mut h = focused_w1();

        h.desktop.switch_workspace(WorkspaceId(1));
        h.pump();
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));

        h.desktop.switch_workspace(WorkspaceId(0));
        h.pump();
        assert_eq!(h.sent().last(), Some(&w1_snapshot()));
        assert_eq!(h.notifier.count(), 4);
    }

    #[test]
    fn test_moving_active_window_to_other_workspace() {
        let mut h = focused_w1();
        h.desktop.move_to_workspace(W1, WorkspaceId(2));
        h.pump();
        assert_eq!(h.sent().last(), Some(&Snapshot::sentinel()));
    }

    #[test]
    fn test_non_normal_windows_are_not_registered() {
        let mut h = Harness::start();
        h.desktop.open(WindowState::new(W2).with_type(WindowType::Dock));
        h.pump();

        assert!(!h.tracker.is_registered(W2));
        assert_eq!(h.desktop.subscription_count(W2), 0);
    }

    #[test]
    fn test_existing_windows_registered_at_start() {
        let desktop_windows = vec![w1(), w2()];
        let mut h = Harness::start_with(desktop_windows);
        h.pump();

        assert_eq!(h.tracker.registered_count(), 2);
        assert_eq!(h.desktop.subscription_count(W1), 1);
        assert_eq!(h.desktop.subscription_count(W2), 1);
    }

    #[test]
    fn test_start_uses_current_focus() {
        let desktop = SimulatedDesktop::new();
        desktop.open(w1());
        desktop.set_focus_silently(Some(W1));

        let notifier = RecordingNotifier::default();
        let mut tracker = ActiveWindowTracker::new(
            Box::new(DryRunSource::new(desktop.clone())),
            Box::new(notifier.clone()),
        );
        let (events, _incoming) = mpsc::unbounded_channel();
        tracker.start(events).unwrap();

        assert_eq!(notifier.sent(), vec![w1_snapshot()]);
    }

    #[test]
    fn test_duplicate_created_event_does_not_double_subscribe() {
        let mut h = Harness::start();
        h.desktop.open(w1());
        h.tracker.handle_event(WindowEvent::WindowCreated(W1));
        h.pump();

        assert_eq!(h.desktop.subscription_count(W1), 1);
    }

    #[test]
    fn test_closing_unknown_window_is_noop() {
        let mut h = Harness::start();
        h.tracker.handle_event(WindowEvent::WindowClosed(WindowId(999)));
        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.tracker.registered_count(), 0);
    }

    #[test]
    fn test_shutdown_drains_registry() {
        let mut h = Harness::start_with(vec![w1(), w2()]);
        h.desktop.focus(W1);
        h.pump();

        h.tracker.shutdown();
        assert_eq!(h.tracker.registered_count(), 0);
        assert_eq!(h.desktop.total_subscriptions(), 0);
        assert!(!h.desktop.global_subscribed());

        // повторный вызов безопасен
        h.tracker.shutdown();
        assert_eq!(h.tracker.registered_count(), 0);
    }

    #[test]
    fn test_drop_releases_subscriptions() {
        let desktop = SimulatedDesktop::new();
        desktop.open(w1());
        {
            let mut tracker = ActiveWindowTracker::new(
                Box::new(DryRunSource::new(desktop.clone())),
                Box::new(RecordingNotifier::default()),
            );
            let (events, _incoming) = mpsc::unbounded_channel();
            tracker.start(events).unwrap();
            assert_eq!(desktop.total_subscriptions(), 1);
        }
        assert_eq!(desktop.total_subscriptions(), 0);
        assert!(!desktop.global_subscribed());
    }

    #[tokio::test]
    async fn test_service_tears_down_on_shutdown() {
        let desktop = SimulatedDesktop::new();
        desktop.open(w1());

        let notifier = RecordingNotifier::default();
        let tracker = ActiveWindowTracker::new(
            Box::new(DryRunSource::new(desktop.clone())),
            Box::new(notifier.clone()),
        );
        let service: Box<dyn Service> = Box::new(TrackerService::new(tracker));

        let (stop, shutdown) = oneshot::channel();
        let handle = tokio::spawn(service.run(shutdown));

        tokio::task::yield_now().await;
        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(desktop.total_subscriptions(), 0);
        assert!(!desktop.global_subscribed());
        assert_eq!(notifier.count(), 1);
    }
}
