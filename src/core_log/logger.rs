use chrono::Local;
use env_logger::{Builder, Env};
use std::io::Write;

/// Initializes the process logger.
///
/// `RUST_LOG` wins over the default filter, which is `info`, or `debug`
/// when `verbose` is set.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                record.level(),
                record.args()
            )
        })
        .init();
}
