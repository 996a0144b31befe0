use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка D-Bus: {0}")]
    DBus(#[from] zbus::Error),

    #[error("Не удалось подключиться к X11: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("Соединение с X11 разорвано: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("Ошибка ответа X11: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("Не удалось создать окно X11: {0}")]
    X11Id(#[from] x11rb::errors::ReplyOrIdError),

    #[error("Не удалось разобрать ответ sway: {0}")]
    SwayParse(#[from] serde_json::Error),

    #[error("Оконный менеджер недоступен: {0}")]
    HostUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

// Удобный макрос для создания ошибок
#[macro_export]
macro_rules! tracker_error {
    (host_unavailable, $($arg:tt)*) => {
        $crate::error::TrackerError::HostUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::TrackerError::Internal(format!($($arg)*))
    };
}
