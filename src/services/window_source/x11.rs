use crate::error::Result;
use crate::events::{
    EventSender, FrameRect, SubscriptionToken, WindowEvent, WindowId, WindowState, WindowType,
    WorkspaceId,
};
use crate::{trace_if_enabled, tracker_error};
use dashmap::DashSet;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt,
    CreateWindowAux, EventMask, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::r#trait::WindowSource;

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_ACTIVE_WINDOW,
        _NET_CLIENT_LIST,
        _NET_CURRENT_DESKTOP,
        _NET_WM_DESKTOP,
        _NET_WM_PID,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_FRAME_EXTENTS,
        WM_STATE,
        _SHIJIMA_TRACKER_WAKEUP,
    }
}

// _NET_WM_DESKTOP для окон, видимых на всех рабочих столах
const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;
// ICCCM IconicState
const ICONIC_STATE: u32 = 3;

/// Ширина рамки менеджера вокруг клиентского окна
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FrameExtents {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl FrameExtents {
    fn from_values(values: &[u32]) -> Self {
        match values {
            [left, right, top, bottom, ..] => Self {
                left: *left,
                right: *right,
                top: *top,
                bottom: *bottom,
            },
            _ => Self::default(),
        }
    }

    /// Прямоугольник окна вместе с рамкой
    fn outer(&self, x: i16, y: i16, width: u16, height: u16) -> FrameRect {
        FrameRect::new(
            f64::from(x) - f64::from(self.left),
            f64::from(y) - f64::from(self.top),
            f64::from(width) + f64::from(self.left) + f64::from(self.right),
            f64::from(height) + f64::from(self.top) + f64::from(self.bottom),
        )
    }
}

fn classify(types: &[Atom], atoms: &Atoms) -> WindowType {
    // Менеджеры без _NET_WM_WINDOW_TYPE считаются обычными окнами
    if types.is_empty() {
        return WindowType::Normal;
    }

    types
        .iter()
        .find_map(|&atom| match atom {
            a if a == atoms._NET_WM_WINDOW_TYPE_NORMAL => Some(WindowType::Normal),
            a if a == atoms._NET_WM_WINDOW_TYPE_DIALOG => Some(WindowType::Dialog),
            a if a == atoms._NET_WM_WINDOW_TYPE_DOCK => Some(WindowType::Dock),
            a if a == atoms._NET_WM_WINDOW_TYPE_DESKTOP => Some(WindowType::Desktop),
            _ => None,
        })
        .unwrap_or(WindowType::Other)
}

/// `(workspace, on_all_workspaces)` из значения `_NET_WM_DESKTOP`
fn desktop_placement(desktop: Option<u32>) -> (Option<WorkspaceId>, bool) {
    match desktop {
        Some(ALL_DESKTOPS) | None => (None, true),
        Some(index) => (Some(WorkspaceId(u64::from(index))), false),
    }
}

fn diff_clients(before: &BTreeSet<Window>, after: &BTreeSet<Window>) -> (Vec<Window>, Vec<Window>) {
    let added = after.difference(before).copied().collect();
    let removed = before.difference(after).copied().collect();
    (added, removed)
}

fn window_id(window: Window) -> WindowId {
    WindowId(u64::from(window))
}

fn xid(id: WindowId) -> Result<Window> {
    Window::try_from(id.0).map_err(|_| tracker_error!(internal, "{} не является X11 окном", id))
}

/// Соединение, общее для запросов и потока чтения событий
struct XServer {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    // Невидимое окно, через которое будится поток событий
    wakeup: Window,
}

impl XServer {
    fn property32(&self, window: Window, property: Atom, type_: Atom, length: u32) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, length)
            .ok()?
            .reply()
            .ok()?;
        let values: Vec<u32> = reply.value32()?.collect();
        (!values.is_empty()).then_some(values)
    }

    fn first32(&self, window: Window, property: Atom, type_: Atom) -> Option<u32> {
        self.property32(window, property, type_, 1)?.first().copied()
    }

    fn client_list(&self) -> Result<BTreeSet<Window>> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_CLIENT_LIST,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )?
            .reply()?;

        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn active_window(&self) -> Option<Window> {
        self.first32(self.root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW.into())
            .filter(|&window| window != x11rb::NONE)
    }

    fn current_desktop(&self) -> Option<u32> {
        self.first32(self.root, self.atoms._NET_CURRENT_DESKTOP, AtomEnum::CARDINAL.into())
    }

    fn select_events(&self, window: Window, mask: EventMask) -> Result<()> {
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        self.conn.flush()?;
        Ok(())
    }

    /// ClientMessage без маски доставляется владельцу окна, то есть нам
    fn wake_reader(&self) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            self.wakeup,
            self.atoms._SHIJIMA_TRACKER_WAKEUP,
            [0u32; 5],
        );
        self.conn
            .send_event(false, self.wakeup, EventMask::NO_EVENT, event)?;
        self.conn.flush()?;
        Ok(())
    }

    fn window_state(&self, window: Window) -> Option<WindowState> {
        // Окно уже уничтожено, если геометрию получить нельзя
        let geometry = self.conn.get_geometry(window).ok()?.reply().ok()?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;

        let atoms = &self.atoms;
        let extents = self
            .property32(window, atoms._NET_FRAME_EXTENTS, AtomEnum::CARDINAL.into(), 4)
            .map(|values| FrameExtents::from_values(&values))
            .unwrap_or_default();
        let types = self
            .property32(window, atoms._NET_WM_WINDOW_TYPE, AtomEnum::ATOM.into(), 32)
            .unwrap_or_default();
        let net_state = self
            .property32(window, atoms._NET_WM_STATE, AtomEnum::ATOM.into(), 32)
            .unwrap_or_default();
        let wm_state = self.first32(window, atoms.WM_STATE, atoms.WM_STATE);
        let desktop = self.first32(window, atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL.into());
        let (workspace, on_all_workspaces) = desktop_placement(desktop);

        let mut state = WindowState::new(window_id(window)).with_frame(extents.outer(
            origin.dst_x,
            origin.dst_y,
            geometry.width,
            geometry.height,
        ));
        state.pid = self
            .first32(window, atoms._NET_WM_PID, AtomEnum::CARDINAL.into())
            .and_then(|pid| i32::try_from(pid).ok());
        state.window_type = classify(&types, atoms);
        state.hidden = net_state.contains(&atoms._NET_WM_STATE_HIDDEN);
        state.minimized = wm_state == Some(ICONIC_STATE);
        state.workspace = workspace;
        state.on_all_workspaces = on_all_workspaces;

        Some(state)
    }
}

/// Читает события X-сервера в отдельном потоке и переводит их в `WindowEvent`
struct EventReader {
    server: Arc<XServer>,
    subscribed: Arc<DashSet<WindowId>>,
    running: Arc<AtomicBool>,
    events: EventSender,
    clients: BTreeSet<Window>,
}

impl EventReader {
    fn run(mut self) {
        debug!("Поток событий X11 запущен");

        while self.running.load(Ordering::Acquire) {
            let event = match self.server.conn.wait_for_event() {
                Ok(event) => event,
                Err(e) => {
                    error!("Соединение с X11 разорвано: {}", e);
                    break;
                }
            };

            if !self.running.load(Ordering::Acquire) {
                break;
            }

            for translated in self.translate(event) {
                trace_if_enabled!("X11: {}", translated);
                if self.events.send(translated).is_err() {
                    // Трекер завершился
                    return;
                }
            }
        }

        debug!("Поток событий X11 остановлен");
    }

    fn is_subscribed(&self, window: Window) -> bool {
        self.subscribed.contains(&window_id(window))
    }

    fn translate(&mut self, event: Event) -> Vec<WindowEvent> {
        let server = Arc::clone(&self.server);
        let atoms = &server.atoms;

        match event {
            Event::PropertyNotify(e) if e.window == server.root => {
                if e.atom == atoms._NET_CLIENT_LIST {
                    self.refresh_clients()
                } else if e.atom == atoms._NET_ACTIVE_WINDOW {
                    server
                        .active_window()
                        .filter(|&window| self.is_subscribed(window))
                        .map(|window| WindowEvent::WindowActivated(window_id(window)))
                        .into_iter()
                        .collect()
                } else if e.atom == atoms._NET_CURRENT_DESKTOP {
                    vec![WindowEvent::ActiveWorkspaceChanged]
                } else {
                    Vec::new()
                }
            }
            Event::PropertyNotify(e) if self.is_subscribed(e.window) => {
                let id = window_id(e.window);
                if e.atom == atoms._NET_WM_STATE || e.atom == atoms.WM_STATE {
                    vec![WindowEvent::WindowMinimizedChanged(id)]
                } else if e.atom == atoms._NET_WM_DESKTOP || e.atom == atoms._NET_FRAME_EXTENTS {
                    vec![WindowEvent::WindowGeometryChanged(id)]
                } else {
                    Vec::new()
                }
            }
            Event::ConfigureNotify(e) if self.is_subscribed(e.window) => {
                vec![WindowEvent::WindowGeometryChanged(window_id(e.window))]
            }
            Event::DestroyNotify(e) => {
                // Окно могло уже уйти из _NET_CLIENT_LIST
                if self.clients.remove(&e.window) && self.is_subscribed(e.window) {
                    vec![WindowEvent::WindowClosed(window_id(e.window))]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn refresh_clients(&mut self) -> Vec<WindowEvent> {
        let current = match self.server.client_list() {
            Ok(current) => current,
            Err(e) => {
                warn!("Не удалось прочитать _NET_CLIENT_LIST: {}", e);
                return Vec::new();
            }
        };

        let (added, removed) = diff_clients(&self.clients, &current);
        self.clients = current;

        let created = added
            .into_iter()
            .map(|window| WindowEvent::WindowCreated(window_id(window)));
        let closed = removed
            .into_iter()
            .filter(|&window| self.is_subscribed(window))
            .map(|window| WindowEvent::WindowClosed(window_id(window)));

        created.chain(closed).collect()
    }
}

/// Источник окон для EWMH-совместимых менеджеров X11
pub struct X11Source {
    server: Arc<XServer>,
    subscribed: Arc<DashSet<WindowId>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    next_token: u64,
}

impl X11Source {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| tracker_error!(host_unavailable, "нет экрана X11 {}", screen_num))?;
        let atoms = Atoms::new(&conn)?.reply()?;

        let wakeup = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wakeup,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )?;
        conn.flush()?;

        info!("Подключено к X11, корневое окно {:#x}", root);

        Ok(Self {
            server: Arc::new(XServer {
                conn,
                root,
                atoms,
                wakeup,
            }),
            subscribed: Arc::new(DashSet::new()),
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
            next_token: 0,
        })
    }
}

impl WindowSource for X11Source {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn subscribe_global(&mut self, events: EventSender) -> Result<()> {
        let server = &self.server;
        server.select_events(server.root, EventMask::PROPERTY_CHANGE)?;
        self.running.store(true, Ordering::Release);

        let reader = EventReader {
            server: Arc::clone(server),
            subscribed: Arc::clone(&self.subscribed),
            running: Arc::clone(&self.running),
            events,
            clients: server.client_list()?,
        };

        self.reader = Some(
            thread::Builder::new()
                .name("x11-events".to_string())
                .spawn(move || reader.run())?,
        );
        Ok(())
    }

    fn unsubscribe_global(&mut self) {
        self.running.store(false, Ordering::Release);
        let server = &self.server;
        if let Err(e) = server.select_events(server.root, EventMask::NO_EVENT) {
            warn!("Не удалось отписаться от корневого окна: {}", e);
        }

        let Some(reader) = self.reader.take() else {
            return;
        };
        match server.wake_reader() {
            Ok(()) => {
                if reader.join().is_err() {
                    warn!("Поток событий X11 завершился с паникой");
                }
            }
            // Без пробуждения поток выйдет на следующем событии сервера
            Err(e) => warn!("Не удалось разбудить поток событий X11: {}", e),
        }
    }

    fn windows(&self) -> Result<Vec<WindowId>> {
        Ok(self
            .server
            .client_list()?
            .into_iter()
            .map(window_id)
            .collect())
    }

    fn subscribe_window(&mut self, id: WindowId) -> Result<SubscriptionToken> {
        let window = xid(id)?;
        self.server
            .select_events(window, EventMask::STRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE)?;
        self.subscribed.insert(id);

        self.next_token += 1;
        Ok(SubscriptionToken(self.next_token))
    }

    fn unsubscribe_window(&mut self, id: WindowId, _token: SubscriptionToken) {
        self.subscribed.remove(&id);

        let Ok(window) = xid(id) else {
            return;
        };
        // Окно могло быть уже уничтожено
        if let Err(e) = self.server.select_events(window, EventMask::NO_EVENT) {
            debug!("Сброс маски событий окна {}: {}", id, e);
        }
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.server.window_state(xid(id).ok()?)
    }

    fn active_workspace(&self) -> Option<WorkspaceId> {
        self.server
            .current_desktop()
            .map(|index| WorkspaceId(u64::from(index)))
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.server.active_window().map(window_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        Atoms {
            _NET_ACTIVE_WINDOW: 301,
            _NET_CLIENT_LIST: 302,
            _NET_CURRENT_DESKTOP: 303,
            _NET_WM_DESKTOP: 304,
            _NET_WM_PID: 305,
            _NET_WM_STATE: 306,
            _NET_WM_STATE_HIDDEN: 307,
            _NET_WM_WINDOW_TYPE: 308,
            _NET_WM_WINDOW_TYPE_NORMAL: 309,
            _NET_WM_WINDOW_TYPE_DIALOG: 310,
            _NET_WM_WINDOW_TYPE_DOCK: 311,
            _NET_WM_WINDOW_TYPE_DESKTOP: 312,
            _NET_FRAME_EXTENTS: 313,
            WM_STATE: 314,
            _SHIJIMA_TRACKER_WAKEUP: 315,
        }
    }

    #[test]
    fn test_classify_window_types() {
        let atoms = fake_atoms();
        assert_eq!(classify(&[], &atoms), WindowType::Normal);
        assert_eq!(classify(&[309], &atoms), WindowType::Normal);
        assert_eq!(classify(&[310], &atoms), WindowType::Dialog);
        assert_eq!(classify(&[311], &atoms), WindowType::Dock);
        assert_eq!(classify(&[312], &atoms), WindowType::Desktop);
        assert_eq!(classify(&[999], &atoms), WindowType::Other);
        // первый известный тип побеждает
        assert_eq!(classify(&[999, 310, 309], &atoms), WindowType::Dialog);
    }

    #[test]
    fn test_frame_includes_extents() {
        let extents = FrameExtents::from_values(&[2, 3, 24, 4]);
        let frame = extents.outer(100, 50, 640, 480);
        assert_eq!(frame, FrameRect::new(98.0, 26.0, 645.0, 508.0));
    }

    #[test]
    fn test_missing_extents_keep_client_rect() {
        let extents = FrameExtents::from_values(&[1, 2]);
        assert_eq!(extents, FrameExtents::default());
        assert_eq!(extents.outer(-10, 0, 200, 100), FrameRect::new(-10.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn test_desktop_placement() {
        assert_eq!(desktop_placement(Some(2)), (Some(WorkspaceId(2)), false));
        assert_eq!(desktop_placement(Some(ALL_DESKTOPS)), (None, true));
        assert_eq!(desktop_placement(None), (None, true));
    }

    #[test]
    fn test_client_list_diff() {
        let before: BTreeSet<Window> = [1, 2, 3].into_iter().collect();
        let after: BTreeSet<Window> = [2, 3, 4, 5].into_iter().collect();
        let (added, removed) = diff_clients(&before, &after);
        assert_eq!(added, vec![4, 5]);
        assert_eq!(removed, vec![1]);
    }

    #[test]
    #[ignore] // Requires X11 display
    fn test_unsubscribe_stops_reader() {
        let mut source = X11Source::connect().unwrap();
        let (events, _incoming) = tokio::sync::mpsc::unbounded_channel();
        source.subscribe_global(events).unwrap();
        assert!(source.reader.is_some());

        source.unsubscribe_global();
        assert!(source.reader.is_none());
        assert_eq!(Arc::strong_count(&source.server), 1);
    }

    #[test]
    fn test_xid_range() {
        assert_eq!(xid(WindowId(0x0340_0007)).unwrap(), 0x0340_0007);
        assert!(xid(WindowId(u64::MAX)).is_err());
    }
}
