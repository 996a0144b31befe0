use crate::config::IpcConfig;
use crate::error::Result;
use crate::events::Snapshot;
use crate::services::service::Service;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// Активное окно глазами получателя `updateActiveWindow`.
///
/// Обновления от собственного процесса (фокус на окне маскота) не считаются
/// сменой окна: предыдущее окно восстанавливается, если его успели убрать.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWindowObserver {
    current: Option<Snapshot>,
    previous: Option<Snapshot>,
    own_pid: i32,
}

impl ActiveWindowObserver {
    pub fn new(own_pid: i32) -> Self {
        Self {
            current: None,
            previous: None,
            own_pid,
        }
    }

    /// Возвращает `true`, если состояние изменилось
    pub fn update(&mut self, uid: &str, pid: i32, x: f64, y: f64, width: f64, height: f64) -> bool {
        if pid == self.own_pid {
            if self.current.is_none() && self.previous.is_some() {
                self.current = self.previous.clone();
                return true;
            }
            return false;
        }

        if width < 0.0 && self.current.is_some() && self.previous.is_none() {
            self.previous = self.current.take();
        } else {
            self.current = (width >= 0.0).then(|| Snapshot::visible(uid, pid, x, y, width, height));
            self.previous = None;
        }
        true
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }
}

/// D-Bus объект, принимающий состояние активного окна
pub struct ActiveWindowReceiver {
    observer: Arc<Mutex<ActiveWindowObserver>>,
}

#[zbus::interface(name = "com.pixelomer.ShijimaQt")]
impl ActiveWindowReceiver {
    #[zbus(name = "updateActiveWindow")]
    fn update_active_window(&self, uid: String, pid: i32, x: f64, y: f64, width: f64, height: f64) {
        let mut observer = self.observer.lock();
        if !observer.update(&uid, pid, x, y, width, height) {
            return;
        }

        match observer.current() {
            Some(window) => info!("Активное окно: {}", window),
            None => info!("Активное окно: {}", Snapshot::sentinel()),
        }
    }
}

/// Режим `listen`: занимает имя сервиса и печатает полученные обновления
pub struct ReceiverService {
    ipc: IpcConfig,
}

impl ReceiverService {
    pub fn new(ipc: IpcConfig) -> Self {
        Self { ipc }
    }
}

#[async_trait::async_trait]
impl Service for ReceiverService {
    async fn run(self: Box<Self>, shutdown: oneshot::Receiver<()>) -> Result<()> {
        let own_pid = i32::try_from(std::process::id()).unwrap_or(-1);
        let receiver = ActiveWindowReceiver {
            observer: Arc::new(Mutex::new(ActiveWindowObserver::new(own_pid))),
        };

        let _connection = zbus::connection::Builder::session()?
            .name(self.ipc.service.as_str())?
            .serve_at(self.ipc.object_path.as_str(), receiver)?
            .build()
            .await?;

        info!(
            "Ожидание вызовов {}.{} на {} {}",
            self.ipc.interface, self.ipc.method, self.ipc.service, self.ipc.object_path
        );

        // Соединение живёт до сигнала остановки
        let _ = shutdown.await;
        info!("Приёмник остановлен");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN_PID: i32 = 500;

    #[test]
    fn test_regular_update_replaces_current() {
        let mut observer = ActiveWindowObserver::new(OWN_PID);
        assert!(observer.update("42", 100, 10.0, 20.0, 300.0, 400.0));

        assert_eq!(
            observer.current(),
            Some(&Snapshot::visible("42", 100, 10.0, 20.0, 300.0, 400.0))
        );
        assert_eq!(observer.previous(), None);
    }

    #[test]
    fn test_sentinel_stashes_current() {
        let mut observer = ActiveWindowObserver::new(OWN_PID);
        observer.update("42", 100, 10.0, 20.0, 300.0, 400.0);
        observer.update("", -1, -1.0, -1.0, -1.0, -1.0);

        assert_eq!(observer.current(), None);
        assert_eq!(
            observer.previous(),
            Some(&Snapshot::visible("42", 100, 10.0, 20.0, 300.0, 400.0))
        );

        // второй sentinel сбрасывает и сохранённое окно
        observer.update("", -1, -1.0, -1.0, -1.0, -1.0);
        assert_eq!(observer.current(), None);
        assert_eq!(observer.previous(), None);
    }

    #[test]
    fn test_own_window_restores_previous() {
        let mut observer = ActiveWindowObserver::new(OWN_PID);
        observer.update("42", 100, 10.0, 20.0, 300.0, 400.0);
        observer.update("", -1, -1.0, -1.0, -1.0, -1.0);

        assert!(observer.update("7", OWN_PID, 0.0, 0.0, 128.0, 128.0));
        assert_eq!(
            observer.current(),
            Some(&Snapshot::visible("42", 100, 10.0, 20.0, 300.0, 400.0))
        );
    }

    #[test]
    fn test_own_window_is_ignored_otherwise() {
        let mut observer = ActiveWindowObserver::new(OWN_PID);
        observer.update("42", 100, 10.0, 20.0, 300.0, 400.0);
        let before = observer.clone();

        assert!(!observer.update("7", OWN_PID, 0.0, 0.0, 128.0, 128.0));
        assert_eq!(observer, before);

        let mut empty = ActiveWindowObserver::new(OWN_PID);
        assert!(!empty.update("7", OWN_PID, 0.0, 0.0, 128.0, 128.0));
        assert_eq!(empty.current(), None);
    }

    #[test]
    fn test_sentinel_without_current_is_stored_as_absent() {
        let mut observer = ActiveWindowObserver::new(OWN_PID);
        assert!(observer.update("", -1, -1.0, -1.0, -1.0, -1.0));
        assert_eq!(observer.current(), None);
        assert_eq!(observer.previous(), None);
    }
}
