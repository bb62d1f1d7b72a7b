//! Structured logging for the Insights server
//!
//! Console output in pretty, json or compact form, optionally mirrored to a
//! daily-rotated file. Levels use `EnvFilter` directive syntax.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "insights-server.log";

// Noisy third-party crates
const QUIET_DIRECTIVES: &str = "hyper=warn,tokio=warn,runtime=warn,tower=warn,h2=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to pretty
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    /// Unknown values fall back to stdout
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{},{}", level, QUIET_DIRECTIVES))
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);
    let filter = env_filter(&config.level);

    let file_layer = match output {
        LogOutput::Stdout => None,
        LogOutput::File | LogOutput::Both => {
            std::fs::create_dir_all(&config.directory).ok();
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, LOG_FILE_PREFIX);
            Some(fmt::layer().with_writer(file_appender).with_ansi(false).boxed())
        }
    };
    let console_layer = match output {
        LogOutput::File => None,
        LogOutput::Stdout | LogOutput::Both => Some(stdout_layer(format)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(format = ?format, output = ?output, level = %config.level, "Logging initialized");
    if file_layer_enabled(output) {
        tracing::debug!(directory = %config.directory.display(), "Writing log files");
    }
}

fn file_layer_enabled(output: LogOutput) -> bool {
    matches!(output, LogOutput::File | LogOutput::Both)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn test_log_output_parse() {
        assert_eq!(LogOutput::parse("file"), LogOutput::File);
        assert_eq!(LogOutput::parse("both"), LogOutput::Both);
        assert_eq!(LogOutput::parse("stdout"), LogOutput::Stdout);
        assert_eq!(LogOutput::parse(""), LogOutput::Stdout);
        assert!(file_layer_enabled(LogOutput::Both));
        assert!(!file_layer_enabled(LogOutput::Stdout));
    }
}
