use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{filter, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse environment filter: {0}")]
    EnvFilterParse(#[from] filter::ParseError),

    #[error("failed to set global dispatcher: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Initialize tracing for the pooler process.
///
/// `RUST_LOG` takes precedence when set; otherwise a service default that
/// keeps the core components chatty and the HTTP internals quiet.
pub fn init() -> Result<(), Error> {
    const DEFAULT_LOG_FILTER: &str = "info,monitor=debug,scheduler=debug,coordinator=debug,\
                                      relay=debug,miner=debug,backend=debug,chain=info,\
                                      hyper=off,reqwest=off";

    let filter = EnvFilter::try_from_default_env().or(EnvFilter::try_new(DEFAULT_LOG_FILTER))?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
