use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(Logger { level }))
            .map(|()| log::set_max_level(level))
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("[{}] [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}


#[cfg(test)]
mod tests {
    use log::{Level, Log};

    use super::*;

    #[test]
    fn filters_by_level() {
        let logger = Logger { level: LevelFilter::Warn };
        let warn = Metadata::builder().level(Level::Warn).build();
        let info = Metadata::builder().level(Level::Info).build();

        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&info));
    }
}
