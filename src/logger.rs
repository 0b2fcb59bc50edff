use chrono::Local;
use log::{Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Logs to stderr through `env_logger` and, optionally, appends the same
/// records to a run log file.
pub struct DualLogger {
    env_logger: env_logger::Logger,
    file: Option<Mutex<File>>,
}

impl DualLogger {
    pub fn new(env_logger: env_logger::Logger, file: Option<File>) -> Self {
        Self {
            env_logger,
            file: file.map(Mutex::new),
        }
    }

    pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
        let mut builder = env_logger::Builder::new();
        builder.filter_module("blockface_align", log::LevelFilter::Info);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        let env_logger = builder
            .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Seconds))
            .build();

        let file = match log_file {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| anyhow::anyhow!("opening log file {}: {}", path.display(), e))?,
            ),
            None => None,
        };

        let max_level = env_logger.filter();
        log::set_boxed_logger(Box::new(DualLogger::new(env_logger, file)))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn format_line(record: &Record) -> String {
        format!(
            "[{}] {:5} {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.env_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.env_logger.log(record);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                // write errors are ignored, stderr still has the record
                let _ = writeln!(file, "{}", Self::format_line(record));
            }
        }
    }

    fn flush(&self) {
        self.env_logger.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn records_are_appended_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let env_logger = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .build();
        let logger = DualLogger::new(env_logger, Some(File::create(&path).unwrap()));

        logger.log(
            &Record::builder()
                .args(format_args!("frame 3 resampled"))
                .level(log::Level::Info)
                .target("blockface_align::apply")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("noise"))
                .level(log::Level::Debug)
                .target("blockface_align::apply")
                .build(),
        );
        logger.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("INFO  blockface_align::apply - frame 3 resampled"));
        assert!(!text.contains("noise"));
    }
}
