use serde::{Deserialize, Serialize};
use std::fmt;

/// Стабильный идентификатор окна (XID в X11, id контейнера в sway)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Идентификатор рабочего стола
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub u64);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Токен подписки на события конкретного окна, выдаётся оконным менеджером
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

/// Классификация окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowType {
    Normal,
    Dialog,
    Dock,
    Desktop,
    Other,
}

/// Прямоугольник окна в логических координатах оконного менеджера.
/// Отсутствующее поле означает, что менеджер его не сообщил.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameRect {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl FrameRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
        }
    }

    /// Все четыре поля присутствуют и конечны
    pub fn complete(&self) -> Option<(f64, f64, f64, f64)> {
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
        Some((
            finite(self.x)?,
            finite(self.y)?,
            finite(self.width)?,
            finite(self.height)?,
        ))
    }
}

/// Состояние окна на момент запроса к оконному менеджеру
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    pub id: WindowId,
    pub pid: Option<i32>,
    pub alive: bool,
    pub window_type: WindowType,
    pub hidden: bool,
    pub minimized: bool,
    pub workspace: Option<WorkspaceId>,
    pub on_all_workspaces: bool,
    pub frame: FrameRect,
    pub scale: Option<f64>,
}

impl WindowState {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            pid: None,
            alive: true,
            window_type: WindowType::Normal,
            hidden: false,
            minimized: false,
            workspace: None,
            on_all_workspaces: false,
            frame: FrameRect::default(),
            scale: None,
        }
    }

    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_frame(mut self, frame: FrameRect) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceId) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_type(mut self, window_type: WindowType) -> Self {
        self.window_type = window_type;
        self
    }

    #[cfg(test)]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn is_normal(&self) -> bool {
        self.window_type == WindowType::Normal
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "окно {} (pid {:?}, {:?})", self.id, self.pid, self.window_type)
    }
}

/// События оконного менеджера, передаваемые трекеру
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    WindowCreated(WindowId),
    WindowActivated(WindowId),
    WindowGeometryChanged(WindowId),
    WindowMinimizedChanged(WindowId),
    WindowClosed(WindowId),
    ActiveWorkspaceChanged,
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowCreated(id) => write!(f, "создано окно {}", id),
            Self::WindowActivated(id) => write!(f, "активировано окно {}", id),
            Self::WindowGeometryChanged(id) => write!(f, "изменена геометрия окна {}", id),
            Self::WindowMinimizedChanged(id) => write!(f, "изменено свёртывание окна {}", id),
            Self::WindowClosed(id) => write!(f, "закрыто окно {}", id),
            Self::ActiveWorkspaceChanged => write!(f, "сменился активный рабочий стол"),
        }
    }
}
