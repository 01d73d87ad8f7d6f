use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{Error, Result};

/// Initialise logging from a deployed `log4rs.yaml`.
pub fn init_file(path: impl AsRef<Path>) -> Result<()> {
    log4rs::init_file(path, Default::default()).map_err(|err| Error::Config(err.to_string()))
}

/// Console-only fallback used when no logging config file is deployed.
pub fn init_default() -> Result<()> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}",
        )))
        .build();
    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|err| Error::Config(err.to_string()))?;
    log4rs::init_config(config).map_err(|err| Error::Config(err.to_string()))?;
    Ok(())
}
