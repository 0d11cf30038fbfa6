use tracing_subscriber::EnvFilter;

/// HTTP client internals are only interesting when asked for through `RUST_LOG`.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn";

fn default_directives(level: &str) -> String {
    format!("{level},{QUIET_DEPENDENCIES}")
}

/// Send job diagnostics to stderr; stdout is left to the per-job result lines.
///
/// `RUST_LOG` replaces the whole filter. Otherwise `level` applies to
/// signal-etl itself and the HTTP stack stays at `warn`.
pub fn init(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_flag_produces_a_valid_filter() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            let directives = default_directives(level);
            assert!(directives.starts_with(level));
            assert!(EnvFilter::try_new(&directives).is_ok(), "{directives}");
        }
    }
}
