use prometheus::{Encoder, TextEncoder, HistogramVec, IntCounterVec, IntGaugeVec, GaugeVec, Opts, Registry};
use warp::{Filter, Reply};
use std::net::SocketAddr;
use once_cell::sync::{Lazy, OnceCell};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static UP_GAUGE: Lazy<IntGaugeVec> = Lazy::new(|| {
    let opts = Opts::new("check_up", "1 if the last check found the target reachable, else 0");
    let gauge = IntGaugeVec::new(opts, &["target", "check_type"]).expect("creating check_up");
    REGISTRY.register(Box::new(gauge.clone())).expect("registering check_up");
    gauge
});

static DURATION_GAUGE: Lazy<GaugeVec> = Lazy::new(|| {
    let opts = Opts::new("check_duration_milliseconds_current", "Duration of the last check in milliseconds");
    let gauge = GaugeVec::new(opts, &["target", "check_type"]).expect("creating duration gauge");
    REGISTRY.register(Box::new(gauge.clone())).expect("registering duration gauge");
    gauge
});

static FAILURE_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("check_failure_total", "Checks that raised an error instead of a verdict");
    let ctr = IntCounterVec::new(opts, &["target", "check_type", "kind"]).expect("creating failure counter");
    REGISTRY.register(Box::new(ctr.clone())).expect("registering failure counter");
    ctr
});

// Only set when latency history is enabled in config
static DURATION_HIST: OnceCell<HistogramVec> = OnceCell::new();

/// Why a check produced no verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    System,
}

impl FailureKind {
    fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::System => "system",
        }
    }
}

pub fn initialize_metrics(enable_latency_history: bool) {
    if !enable_latency_history {
        return;
    }
    DURATION_HIST.get_or_init(|| {
        let opts = Opts::new("check_duration_milliseconds", "Check duration in milliseconds");
        let hist = HistogramVec::new(
            prometheus::HistogramOpts {
                common_opts: opts,
                buckets: vec![
                    0.05, 0.1, 0.2, 0.5, 1.0,
                    2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 3000.0
                ],
            },
            &["target", "check_type"],
        ).expect("creating histogram");
        REGISTRY.register(Box::new(hist.clone())).expect("registering histogram");
        hist
    });
}

pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub async fn serve_metrics(addr: SocketAddr) {
    let metrics_route = warp::path!("metrics").map(|| match gather_text() {
        Ok(body) => warp::reply::with_header(body, "Content-Type", prometheus::TEXT_FORMAT).into_response(),
        Err(e) => {
            tracing::error!("encoding metrics failed: {:?}", e);
            warp::reply::with_status(e.to_string(), warp::http::StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    });

    warp::serve(metrics_route).run(addr).await;
}

pub fn observe_result(target: &str, check_type: &str, reachable: bool, duration_ms: f64) {
    UP_GAUGE
        .with_label_values(&[target, check_type])
        .set(reachable as i64);
    DURATION_GAUGE
        .with_label_values(&[target, check_type])
        .set(duration_ms);

    if let Some(hist) = DURATION_HIST.get() {
        hist.with_label_values(&[target, check_type])
            .observe(duration_ms);
    }
}

/// An errored check also counts as down.
pub fn inc_failure(target: &str, check_type: &str, kind: FailureKind) {
    UP_GAUGE
        .with_label_values(&[target, check_type])
        .set(0);
    FAILURE_COUNTER
        .with_label_values(&[target, check_type, kind.as_str()])
        .inc();
}
