//! Log subscriber setup for the `polysolve` binary.
//!
//! Log lines are written to stderr. Stdout carries only the rendered run
//! result, so `polysolve solve ... > answer.md` stays clean.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the process-wide subscriber.
///
/// `level` is only the fallback: directives in `RUST_LOG` take precedence,
/// and malformed ones are skipped. With `json` set, every event is one JSON
/// object per line. A subscriber that is already installed is left alone.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(output_layer(json))
        .with(filter)
        .try_init();
}

fn output_layer(json: bool) -> OutputLayer {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_a_no_op() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging after a repeated install");
    }
}
