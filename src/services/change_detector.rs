use crate::events::Snapshot;

/// Хранит последний отправленный снимок и решает, нужна ли новая отправка.
///
/// Сравнение точное по всем семи полям: значения приходят из дискретного
/// состояния оконного менеджера.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_sent: Option<Snapshot>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_changed(&self, snapshot: &Snapshot) -> bool {
        self.last_sent.as_ref() != Some(snapshot)
    }

    /// Запоминает снимок, фактически переданный уведомителю
    pub fn record(&mut self, snapshot: Snapshot) {
        self.last_sent = Some(snapshot);
    }

    pub fn last_sent(&self) -> Option<&Snapshot> {
        self.last_sent.as_ref()
    }
}
