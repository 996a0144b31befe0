use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
mod config;
mod error;
mod events;
mod services;
mod utils;

use config::{Config, NO_WINDOW_TRACKING_ENV};
use services::{
    create_notifier, create_window_source, ActiveWindowTracker, ReceiverService, Service,
    TrackerService,
};

#[derive(Parser, Debug)]
#[command(name = "shijima-tracker")]
#[command(about = "Передаёт положение активного окна в Shijima-Qt через D-Bus")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "shijima-tracker.toml")]
    config: String,

    /// Режим сухого запуска (эмуляция окон, без D-Bus)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Оконный менеджер
    #[arg(long, value_parser = ["auto", "x11", "sway"])]
    host: Option<String>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Mode {
    /// Отслеживать активное окно и отправлять обновления
    #[default]
    Run,
    /// Принимать обновления вместо Shijima-Qt и печатать их
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let mut config = Config::load(&args.config)?;
    if let Some(host) = &args.host {
        config.tracker.host = host.clone();
    }

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск Shijima Tracker v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    let mode = args.mode.unwrap_or_default();
    let service: Box<dyn Service> = match mode {
        Mode::Run => {
            if !config.tracker.enabled {
                info!(
                    "Отслеживание окон отключено ({}=1 или tracker.enabled = false)",
                    NO_WINDOW_TRACKING_ENV
                );
                return Ok(());
            }

            if args.dry_run {
                warn!("Режим сухого запуска - окна эмулируются, D-Bus не используется");
            }

            let source = create_window_source(&config, args.dry_run)?;
            let notifier = create_notifier(&config.ipc, args.dry_run).await?;
            Box::new(TrackerService::new(ActiveWindowTracker::new(source, notifier)))
        }
        Mode::Listen => Box::new(ReceiverService::new(config.ipc.clone())),
    };

    let (stop, shutdown) = oneshot::channel();
    let mut handle = tokio::spawn(service.run(shutdown));

    info!("Сервис запущен в режиме {:?}", mode);

    // Ожидание сигнала завершения
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
            Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
        },
        joined = &mut handle => {
            joined??;
            warn!("Сервис завершился без сигнала остановки");
            return Ok(());
        }
    }

    info!("Завершение работы...");

    let _ = stop.send(());

    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, handle).await {
        Ok(Ok(Ok(()))) => info!("Сервис завершил работу корректно"),
        Ok(Ok(Err(e))) => error!("Ошибка при остановке сервиса: {}", e),
        Ok(Err(e)) => error!("Задача сервиса завершилась аварийно: {}", e),
        Err(_) => warn!("Таймаут при завершении сервиса"),
    }

    info!("Shijima Tracker завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        "full" => registry.with(fmt::layer()).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }

    Ok(())
}
