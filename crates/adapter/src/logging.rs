//! Process-wide tracing setup.
//!
//! Logs go to stderr, since stdout carries DAP traffic in stdio mode. The
//! level filter and the log file layer are both reloadable so an `attach`
//! request can turn them up through [`TraceSink`].

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use eyre::WrapErr;
use session::{Trace, TraceSink};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};

pub const LOG_FILE_NAME: &str = "byebug-dap.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

type LevelLayer = reload::Layer<EnvFilter, Registry>;
type Leveled = Layered<LevelLayer, Registry>;
type FileLayer = Option<Box<dyn Layer<Leveled> + Send + Sync>>;

pub struct Logging {
    level: reload::Handle<EnvFilter, Registry>,
    /// `RUST_LOG` was set and takes precedence over the trace argument.
    level_pinned: bool,
    file: reload::Handle<FileLayer, Leveled>,
    log_path: PathBuf,
    file_guard: Mutex<Option<WorkerGuard>>,
}

impl Logging {
    /// Install the global subscriber.
    pub fn install(format: LogFormat) -> eyre::Result<Arc<Self>> {
        let env_filter = EnvFilter::try_from_default_env().ok();
        let log_path = std::env::temp_dir().join(LOG_FILE_NAME);
        let (subscriber, logging) = Self::build(format, log_path, env_filter);
        subscriber
            .try_init()
            .wrap_err("installing the tracing subscriber")?;
        Ok(Arc::new(logging))
    }

    fn build(
        format: LogFormat,
        log_path: PathBuf,
        env_filter: Option<EnvFilter>,
    ) -> (impl Subscriber + Send + Sync + 'static, Self) {
        let level_pinned = env_filter.is_some();
        let filter =
            env_filter.unwrap_or_else(|| EnvFilter::new(Trace::default().filter_directive()));
        let (level_layer, level) = reload::Layer::new(filter);
        let (file_layer, file) = reload::Layer::new(FileLayer::None);

        let stderr = match format {
            LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        };

        let subscriber = tracing_subscriber::registry()
            .with(level_layer)
            .with(file_layer)
            .with(stderr);

        let logging = Self {
            level,
            level_pinned,
            file,
            log_path,
            file_guard: Mutex::new(None),
        };
        (subscriber, logging)
    }

    fn open_log_file(&self) -> eyre::Result<()> {
        let mut guard = self
            .file_guard
            .lock()
            .map_err(|_| eyre::eyre!("log file lock poisoned"))?;
        if guard.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .wrap_err_with(|| format!("opening {}", self.log_path.display()))?;
        let (writer, worker) = tracing_appender::non_blocking(file);
        let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
        self.file
            .reload(Some(layer))
            .wrap_err("installing the log file layer")?;
        *guard = Some(worker);

        tracing::info!(path = %self.log_path.display(), "writing log file");
        Ok(())
    }
}

impl TraceSink for Logging {
    fn set_trace(&self, trace: Trace) {
        if !self.level_pinned {
            if let Err(e) = self.level.reload(EnvFilter::new(trace.filter_directive())) {
                tracing::warn!(error = %e, "could not change the log level");
            }
        }

        if trace.writes_log_file() {
            if let Err(e) = self.open_log_file() {
                tracing::warn!(error = ?e, "could not open the log file");
            }
        }
    }
}
