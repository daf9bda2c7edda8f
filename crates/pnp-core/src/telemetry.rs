//! Tracing and OpenTelemetry setup.
//!
//! Call [`init_tracing`] once at startup and keep the returned guard alive.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Enables span export over HTTP. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `PNP_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = pnp_core::telemetry::init_tracing("pnp");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "info";

/// Console log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Anything but `json` (any case) keeps the compact format.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Logging and export settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySettings {
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            filter: non_blank("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: LogFormat::parse(lookup("PNP_LOG_FORMAT").as_deref()),
            otlp_endpoint: non_blank("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }

    /// The configured filter, or `info` when it does not parse.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!("[pnp] invalid RUST_LOG '{}': {e}", self.filter);
            EnvFilter::new(DEFAULT_FILTER)
        })
    }
}

type Filtered = Layered<EnvFilter, Registry>;

fn console_layer(format: LogFormat) -> Box<dyn Layer<Filtered> + Send + Sync> {
    match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    }
}

/// Install the global subscriber from [`TelemetrySettings::from_env`].
///
/// With an OTLP endpoint, every `#[instrument]` span of the orchestrator and
/// lifecycle operations is exported.  Dropping the returned
/// [`TracerProviderGuard`] flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_with(service_name, &TelemetrySettings::from_env())
}

fn init_with(service_name: &str, settings: &TelemetrySettings) -> TracerProviderGuard {
    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(service_name, endpoint));
    let export = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string()))
    });

    let installed = tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(console_layer(settings.format))
        .with(export)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[pnp] tracing already initialised: {e}");
    }

    TracerProviderGuard { provider }
}

/// Shuts the [`SdkTracerProvider`] down on drop.  Hold it in `main`.
pub struct TracerProviderGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[pnp] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// `None` when the exporter fails to build.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[pnp] OTLP exporter init failed: {e}");
            return None;
        }
    };
    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();
    // Simple exporter: the CLI builds its Tokio runtime after this call.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
