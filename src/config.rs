use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::services::notifier::{INTERFACE_NAME, METHOD_NAME, OBJECT_PATH, SERVICE_NAME};

/// Переменная окружения Shijima-Qt, полностью отключающая отслеживание окон
pub const NO_WINDOW_TRACKING_ENV: &str = "SHIJIMA_NO_WINDOW_TRACKING";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub tracker: TrackerConfig,
    pub ipc: IpcConfig,
    pub sway: SwayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub host: String,
}

/// Адрес получателя `updateActiveWindow` на сессионной шине
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpcConfig {
    pub service: String,
    pub object_path: String,
    pub interface: String,
    pub method: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwayConfig {
    pub command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
            },
            tracker: TrackerConfig {
                enabled: true,
                host: "auto".to_string(),
            },
            ipc: IpcConfig::default(),
            sway: SwayConfig {
                command: "swaymsg".to_string(),
            },
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            object_path: OBJECT_PATH.to_string(),
            interface: INTERFACE_NAME.to_string(),
            method: METHOD_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("SHIJIMA_TRACKER_").split("__"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        if std::env::var(NO_WINDOW_TRACKING_ENV).as_deref() == Ok("1") {
            config.tracker.enabled = false;
        }

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация выбора оконного менеджера
        match self.tracker.host.as_str() {
            "auto" | "x11" | "sway" => {}
            _ => anyhow::bail!("Неизвестный оконный менеджер: {}", self.tracker.host),
        }

        // Валидация адреса получателя
        for (name, value) in [
            ("ipc.service", &self.ipc.service),
            ("ipc.object_path", &self.ipc.object_path),
            ("ipc.interface", &self.ipc.interface),
            ("ipc.method", &self.ipc.method),
        ] {
            if value.is_empty() {
                anyhow::bail!("{} не может быть пустым", name);
            }
        }

        if !self.ipc.object_path.starts_with('/') {
            anyhow::bail!("ipc.object_path должен начинаться с '/': {}", self.ipc.object_path);
        }

        if self.sway.command.is_empty() {
            anyhow::bail!("sway.command не может быть пустым");
        }

        Ok(())
    }
}
