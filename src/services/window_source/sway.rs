use crate::error::Result;
use crate::events::{
    EventSender, FrameRect, SubscriptionToken, WindowEvent, WindowId, WindowState, WindowType,
    WorkspaceId,
};
use crate::{trace_if_enabled, tracker_error};
use dashmap::DashSet;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::r#trait::WindowSource;

// Рабочий стол sway, на котором лежат окна из scratchpad
const SCRATCHPAD: &str = "__i3_scratch";
const SUBSCRIPTION: &str = r#"["window","workspace"]"#;

#[derive(Debug, Default, Deserialize)]
struct SwayRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct WindowProperties {
    window_type: Option<String>,
}

/// Узел дерева `get_tree`
#[derive(Debug, Deserialize)]
struct SwayNode {
    id: u64,
    #[serde(rename = "type")]
    node_type: String,
    name: Option<String>,
    pid: Option<i32>,
    app_id: Option<String>,
    #[serde(default)]
    focused: bool,
    visible: Option<bool>,
    #[serde(default)]
    rect: SwayRect,
    scale: Option<f64>,
    window_properties: Option<WindowProperties>,
    #[serde(default)]
    nodes: Vec<SwayNode>,
    #[serde(default)]
    floating_nodes: Vec<SwayNode>,
}

impl SwayNode {
    fn is_view(&self) -> bool {
        matches!(self.node_type.as_str(), "con" | "floating_con")
            && (self.pid.is_some() || self.app_id.is_some() || self.window_properties.is_some())
    }

    fn window_type(&self) -> WindowType {
        // Типы есть только у окон Xwayland
        match self
            .window_properties
            .as_ref()
            .and_then(|props| props.window_type.as_deref())
        {
            None | Some("normal") => WindowType::Normal,
            Some("dialog") => WindowType::Dialog,
            Some("dock") => WindowType::Dock,
            Some("desktop") => WindowType::Desktop,
            Some(_) => WindowType::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SwayWorkspace {
    id: u64,
    #[serde(default)]
    focused: bool,
}

#[derive(Debug, Deserialize)]
struct EventContainer {
    id: u64,
}

/// Событие из `swaymsg -m -t subscribe`. У событий окон есть `container`,
/// у событий рабочих столов его нет.
#[derive(Debug, Deserialize)]
struct SwayEvent {
    change: String,
    container: Option<EventContainer>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Placement {
    workspace: Option<WorkspaceId>,
    scratchpad: bool,
    scale: Option<f64>,
}

/// Снимок дерева sway, сведённый к окнам
#[derive(Debug, Clone, Default, PartialEq)]
struct SwayTree {
    windows: BTreeMap<WindowId, WindowState>,
    focused: Option<WindowId>,
    active_workspace: Option<WorkspaceId>,
}

impl SwayTree {
    fn from_json(tree: &str, workspaces: &str) -> Result<Self> {
        let root: SwayNode = serde_json::from_str(tree)?;
        let workspaces: Vec<SwayWorkspace> = serde_json::from_str(workspaces)?;

        let mut this = Self {
            active_workspace: workspaces
                .iter()
                .find(|ws| ws.focused)
                .map(|ws| WorkspaceId(ws.id)),
            ..Self::default()
        };
        this.collect(&root, Placement::default());
        Ok(this)
    }

    fn collect(&mut self, node: &SwayNode, mut placement: Placement) {
        match node.node_type.as_str() {
            "output" => placement.scale = node.scale,
            "workspace" => {
                placement.workspace = Some(WorkspaceId(node.id));
                placement.scratchpad = node.name.as_deref() == Some(SCRATCHPAD);
            }
            _ => {}
        }

        if node.is_view() {
            let id = WindowId(node.id);
            let mut state = WindowState::new(id).with_type(node.window_type()).with_frame(
                FrameRect::new(node.rect.x, node.rect.y, node.rect.width, node.rect.height),
            );
            state.pid = node.pid;
            state.minimized = placement.scratchpad;
            state.hidden = !node.visible.unwrap_or(true);
            state.workspace = placement.workspace;
            state.scale = placement.scale;

            if node.focused {
                self.focused = Some(id);
            }
            self.windows.insert(id, state);
        }

        for child in node.nodes.iter().chain(&node.floating_nodes) {
            self.collect(child, placement);
        }
    }
}

/// Переводит событие sway и изменение дерева в события трекера
fn translate(
    event: &SwayEvent,
    before: &SwayTree,
    after: &SwayTree,
    subscribed: &BTreeSet<WindowId>,
) -> Vec<WindowEvent> {
    let mut out = Vec::new();

    match (&event.container, event.change.as_str()) {
        (Some(container), "new") => out.push(WindowEvent::WindowCreated(WindowId(container.id))),
        (Some(container), "focus") if subscribed.contains(&WindowId(container.id)) => {
            out.push(WindowEvent::WindowActivated(WindowId(container.id)))
        }
        (Some(container), "close") if subscribed.contains(&WindowId(container.id)) => {
            out.push(WindowEvent::WindowClosed(WindowId(container.id)))
        }
        (None, "focus") => out.push(WindowEvent::ActiveWorkspaceChanged),
        _ => {}
    }

    for &id in subscribed {
        if out.contains(&WindowEvent::WindowClosed(id)) {
            continue;
        }

        match (before.windows.get(&id), after.windows.get(&id)) {
            (Some(old), Some(new)) => {
                if old.minimized != new.minimized || old.hidden != new.hidden {
                    out.push(WindowEvent::WindowMinimizedChanged(id));
                }
                if old.frame != new.frame || old.workspace != new.workspace {
                    out.push(WindowEvent::WindowGeometryChanged(id));
                }
            }
            // Окно пропало из дерева без события close
            (Some(_), None) => out.push(WindowEvent::WindowClosed(id)),
            _ => {}
        }
    }

    out
}

/// Накапливает вывод swaymsg и отдаёт целые JSON-документы
#[derive(Default)]
struct EventStream {
    buffer: Vec<u8>,
}

impl EventStream {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<SwayEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut failure = None;
        let consumed = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<SwayEvent>();
            loop {
                match stream.next() {
                    Some(Ok(event)) => events.push(event),
                    // Незаконченный документ ждёт следующей порции
                    Some(Err(e)) if e.is_eof() => break stream.byte_offset(),
                    Some(Err(e)) => {
                        failure = Some(e);
                        break self.buffer.len();
                    }
                    None => break stream.byte_offset(),
                }
            }
        };

        self.buffer.drain(..consumed);
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(events),
        }
    }
}

fn query(command: &str, kind: &str) -> Result<String> {
    let output = Command::new(command).args(["-r", "-t", kind]).output()?;
    check_output(command, kind, output)
}

async fn query_async(command: &str, kind: &str) -> Result<String> {
    let output = tokio::process::Command::new(command)
        .args(["-r", "-t", kind])
        .output()
        .await?;
    check_output(command, kind, output)
}

fn check_output(command: &str, kind: &str, output: std::process::Output) -> Result<String> {
    if !output.status.success() {
        return Err(tracker_error!(
            host_unavailable,
            "{} -t {} вернул ошибку: {}",
            command,
            kind,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn load_tree(command: &str) -> Result<SwayTree> {
    SwayTree::from_json(&query(command, "get_tree")?, &query(command, "get_workspaces")?)
}

async fn load_tree_async(command: &str) -> Result<SwayTree> {
    let tree = query_async(command, "get_tree").await?;
    let workspaces = query_async(command, "get_workspaces").await?;
    SwayTree::from_json(&tree, &workspaces)
}

async fn listen(
    mut child: Child,
    mut stdout: ChildStdout,
    command: String,
    tree: Arc<RwLock<SwayTree>>,
    subscribed: Arc<DashSet<WindowId>>,
    events: EventSender,
) {
    let mut chunk = vec![0u8; 8192];
    let mut stream = EventStream::default();

    'read: loop {
        let read = match stdout.read(&mut chunk).await {
            Ok(0) => {
                warn!("Подписка swaymsg завершилась");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                error!("Ошибка чтения событий sway: {}", e);
                break;
            }
        };

        let parsed = match stream.push(&chunk[..read]) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Не удалось разобрать событие sway: {}", e);
                continue;
            }
        };

        for event in parsed {
            let after = match load_tree_async(&command).await {
                Ok(after) => after,
                Err(e) => {
                    warn!("Не удалось обновить дерево sway: {}", e);
                    continue;
                }
            };
            let before = std::mem::replace(&mut *tree.write(), after.clone());
            let subscribed_now: BTreeSet<WindowId> = subscribed.iter().map(|id| *id).collect();

            for translated in translate(&event, &before, &after, &subscribed_now) {
                trace_if_enabled!("sway: {}", translated);
                if events.send(translated).is_err() {
                    break 'read;
                }
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!("swaymsg уже завершён: {}", e);
    }
}

/// Источник окон для sway через `swaymsg`
pub struct SwaySource {
    command: String,
    tree: Arc<RwLock<SwayTree>>,
    subscribed: Arc<DashSet<WindowId>>,
    next_token: u64,
    listener: Option<JoinHandle<()>>,
}

impl SwaySource {
    pub fn new(command: String) -> Self {
        info!("Sway: используется {}", command);
        Self {
            command,
            tree: Arc::new(RwLock::new(SwayTree::default())),
            subscribed: Arc::new(DashSet::new()),
            next_token: 0,
            listener: None,
        }
    }
}

impl WindowSource for SwaySource {
    fn name(&self) -> &'static str {
        "sway"
    }

    fn subscribe_global(&mut self, events: EventSender) -> Result<()> {
        *self.tree.write() = load_tree(&self.command)?;

        let mut child = tokio::process::Command::new(&self.command)
            .args(["-r", "-m", "-t", "subscribe", SUBSCRIPTION])
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| tracker_error!(internal, "нет stdout у {}", self.command))?;

        self.listener = Some(tokio::spawn(listen(
            child,
            stdout,
            self.command.clone(),
            Arc::clone(&self.tree),
            Arc::clone(&self.subscribed),
            events,
        )));
        Ok(())
    }

    fn unsubscribe_global(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    fn windows(&self) -> Result<Vec<WindowId>> {
        Ok(self.tree.read().windows.keys().copied().collect())
    }

    fn subscribe_window(&mut self, id: WindowId) -> Result<SubscriptionToken> {
        if !self.tree.read().windows.contains_key(&id) {
            return Err(tracker_error!(internal, "окно {} отсутствует в дереве sway", id));
        }
        self.subscribed.insert(id);

        self.next_token += 1;
        Ok(SubscriptionToken(self.next_token))
    }

    fn unsubscribe_window(&mut self, id: WindowId, _token: SubscriptionToken) {
        self.subscribed.remove(&id);
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.tree.read().windows.get(&id).cloned()
    }

    fn active_workspace(&self) -> Option<WorkspaceId> {
        self.tree.read().active_workspace
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.tree.read().focused
    }
}
