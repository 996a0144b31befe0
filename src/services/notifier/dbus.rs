use crate::config::IpcConfig;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::Snapshot;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info};
use zbus::Connection;

use super::r#trait::Notifier;

/// Тело вызова `updateActiveWindow`: `(sidddd)`
pub type UpdateActiveWindowArgs = (String, i32, f64, f64, f64, f64);

pub fn encode(snapshot: &Snapshot) -> UpdateActiveWindowArgs {
    (
        snapshot.uid().to_string(),
        snapshot.pid(),
        snapshot.x(),
        snapshot.y(),
        snapshot.width(),
        snapshot.height(),
    )
}

pub struct DBusNotifier {
    queue: mpsc::UnboundedSender<UpdateActiveWindowArgs>,
}

impl DBusNotifier {
    pub async fn connect(ipc: IpcConfig) -> Result<Self> {
        info!("Подключение к сессионной шине D-Bus");
        let connection = Connection::session().await?;

        info!(
            "Получатель: {} {} {}.{}",
            ipc.service, ipc.object_path, ipc.interface, ipc.method
        );

        let (queue, pending) = mpsc::unbounded_channel();
        tokio::spawn(deliver_in_order(pending, move |args| {
            let connection = connection.clone();
            let ipc = ipc.clone();
            async move {
                connection
                    .call_method(
                        Some(ipc.service.as_str()),
                        ipc.object_path.as_str(),
                        Some(ipc.interface.as_str()),
                        ipc.method.as_str(),
                        &args,
                    )
                    .await
                    .map(|_| ())
            }
        }));

        Ok(Self { queue })
    }
}

/// Выполняет вызовы строго по одному в порядке `notify`.
/// Ошибка вызова не останавливает очередь.
async fn deliver_in_order<F, Fut>(mut pending: mpsc::UnboundedReceiver<UpdateActiveWindowArgs>, mut call: F)
where
    F: FnMut(UpdateActiveWindowArgs) -> Fut,
    Fut: Future<Output = zbus::Result<()>>,
{
    while let Some(args) = pending.recv().await {
        let uid = args.0.clone();
        if let Err(e) = call(args).await {
            debug!("Вызов updateActiveWindow(\"{}\") не доставлен: {}", uid, e);
        }
    }
    debug!("Очередь уведомлений D-Bus закрыта");
}

impl Notifier for DBusNotifier {
    fn notify(&self, snapshot: &Snapshot) {
        debug_if_enabled!("Отправка {}", snapshot);

        if self.queue.send(encode(snapshot)).is_err() {
            debug!("Отправитель D-Bus завершился, {} не доставлен", snapshot);
        }
    }
}
