use std::fmt;

/// Каноническое описание активного окна в момент времени.
///
/// Поля закрыты: невидимый снимок можно получить только через
/// [`Snapshot::sentinel`], поэтому все невидимые снимки равны между собой.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    visible: bool,
    uid: String,
    pid: i32,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Snapshot {
    /// Снимок "нет активного окна"
    pub fn sentinel() -> Self {
        Self {
            visible: false,
            uid: String::new(),
            pid: -1,
            x: -1.0,
            y: -1.0,
            width: -1.0,
            height: -1.0,
        }
    }

    pub fn visible(uid: impl Into<String>, pid: i32, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            visible: true,
            uid: uid.into(),
            pid,
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.visible {
            write!(
                f,
                "[uid:{} pid:{} origin:{},{} size:{}x{}]",
                self.uid, self.pid, self.x, self.y, self.width, self.height
            )
        } else {
            write!(f, "[нет активного окна]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_normalized() {
        let sentinel = Snapshot::sentinel();
        assert!(!sentinel.is_visible());
        assert_eq!(sentinel.uid(), "");
        assert_eq!(sentinel.pid(), -1);
        assert_eq!(
            (sentinel.x(), sentinel.y(), sentinel.width(), sentinel.height()),
            (-1.0, -1.0, -1.0, -1.0)
        );
        assert_eq!(sentinel, Snapshot::sentinel());
    }

    #[test]
    fn test_visible_snapshot_fields() {
        let snapshot = Snapshot::visible("42", 100, 10.0, 20.0, 300.0, 400.0);
        assert!(snapshot.is_visible());
        assert_eq!(snapshot.uid(), "42");
        assert_eq!(snapshot.pid(), 100);
        assert_ne!(snapshot, Snapshot::sentinel());
        assert_eq!(snapshot.to_string(), "[uid:42 pid:100 origin:10,20 size:300x400]");
    }
}
