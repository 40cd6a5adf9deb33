use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "chart_compiler";

/// Directive used when `RUST_LOG` is unset. `--verbose` means `debug` and
/// overrides the configured level.
fn filter_directive(verbose: bool, level: Option<&str>) -> String {
    if verbose {
        return format!("{}=debug,info", CRATE_TARGET);
    }
    format!("{}={}", CRATE_TARGET, level.unwrap_or("info"))
}

/// Builds the filter used by both layers. `RUST_LOG` always wins.
fn build_filter(verbose: bool, level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, level)))
}

pub fn init_logger(verbose: bool, level: Option<&str>, json: bool) {
    let filter = build_filter(verbose, level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init();
    }
}

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_configured_level() {
        assert_eq!(filter_directive(true, Some("info")), "chart_compiler=debug,info");
        assert_eq!(filter_directive(true, None), "chart_compiler=debug,info");
        assert_eq!(filter_directive(false, Some("warn")), "chart_compiler=warn");
        assert_eq!(filter_directive(false, None), "chart_compiler=info");
    }
}
