use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{LogFormat, Logging};
use crate::timer::LATENCY_TARGET;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// Latency records go to stdout as bare `<label>,<milliseconds>` lines. All other events go to
/// stderr in the configured format, filtered to the configured level.
pub fn init_tracing(logging: &Logging) {
    let (rust_log_level, env_filter) = parse_rust_log();
    let level = match rust_log_level {
        Some(level) => LevelFilter::from(level),
        None => logging.level,
    };

    let format = match logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layers: Vec<BoxedLayer> = vec![
        diagnostics_layer(format, level, std::io::stderr),
        latency_layer(std::io::stdout),
    ];

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();
}

fn diagnostics_layer<W>(format: LogFormat, level: LevelFilter, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = Targets::new()
        .with_default(level)
        .with_target(LATENCY_TARGET, LevelFilter::OFF);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true);

    match format {
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
        LogFormat::Simplified => layer.compact().with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.with_filter(filter).boxed(),
    }
}

/// Prints latency records as bare `<label>,<milliseconds>` lines.
fn latency_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(LATENCY_TARGET, LevelFilter::INFO))
        .boxed()
}

/// Reads `RUST_LOG`.
///
/// A plain level overrides the configured level. Anything else is used literally as the filter
/// and must admit `docbench::latency` for latency records to be written.
pub fn parse_rust_log() -> (Option<Level>, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => Some(level),
            Err(_) => return (Some(Level::TRACE), EnvFilter::new(value)),
        },
        Err(_) => None,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        hyper_util=WARN,\
        reqwest=WARN,\
        docbench=TRACE,\
        docbench_store=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::timer::Timer;

    /// Collects everything a layer writes.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Captured {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(format: LogFormat) -> (Captured, Captured, tracing::subscriber::DefaultGuard) {
        let stdout = Captured::default();
        let stderr = Captured::default();
        let layers: Vec<BoxedLayer> = vec![
            diagnostics_layer(format, LevelFilter::INFO, stderr.clone()),
            latency_layer(stdout.clone()),
        ];
        let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layers));
        (stdout, stderr, guard)
    }

    #[tokio::test(start_paused = true)]
    async fn latency_line_is_bare() {
        let (stdout, stderr, _guard) = capture(LogFormat::Simplified);

        let timer = Timer::start("get:00000000000000000007@joyent.com");
        tokio::time::advance(Duration::from_millis(25)).await;
        timer.stop();

        assert_eq!(stdout.contents(), "get:00000000000000000007@joyent.com,25\n");
        assert_eq!(stderr.contents(), "");
    }

    #[test]
    fn diagnostics_skip_latency_target() {
        let (stdout, stderr, _guard) = capture(LogFormat::Simplified);

        tracing::info!("discovered cluster");
        tracing::debug!("below the configured level");
        tracing::info!(target: LATENCY_TARGET, "preload,12");

        assert_eq!(stdout.contents(), "preload,12\n");
        let stderr = stderr.contents();
        assert!(stderr.contains("discovered cluster"));
        assert!(!stderr.contains("below the configured level"));
        assert!(!stderr.contains("preload"));
    }

    #[test]
    fn json_diagnostics_skip_latency_target() {
        let (_stdout, stderr, _guard) = capture(LogFormat::Json);

        tracing::warn!("slow index build");
        tracing::info!(target: LATENCY_TARGET, "prepare_view,3");

        let stderr = stderr.contents();
        let line: serde_json::Value = serde_json::from_str(stderr.trim()).unwrap();
        assert_eq!(line["fields"]["message"], "slow index build");
        assert!(!stderr.contains("prepare_view"));
    }
}
