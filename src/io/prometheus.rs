//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine metrics in Prometheus text format at /metrics, plus the
//! sink state as JSON at /alarms/recent for the presentation layer.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{
    Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS,
};
use crate::services::alarm_sink::AlarmSink;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let snap = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_tick_metrics(&mut output, site_id, &snap);
    write_alarm_metrics(&mut output, site_id, &snap);
    write_state_gauges(&mut output, site_id, &snap);
    write_feed_metrics(&mut output, site_id, &snap);

    output
}

fn write_tick_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_ticks_total",
        "Evaluation passes completed",
        MetricType::Counter,
        site,
        snap.ticks_total,
    );
    write_metric(
        output,
        "geofence_ticks_aborted_total",
        "Evaluation passes cut short by shutdown",
        MetricType::Counter,
        site,
        snap.ticks_aborted,
    );
    write_metric(
        output,
        "geofence_pairs_evaluated_total",
        "Device x fence pairs evaluated",
        MetricType::Counter,
        site,
        snap.pairs_evaluated,
    );
    write_metric(
        output,
        "geofence_pairs_skipped_inactive_total",
        "Pairs skipped because the fence was disabled or outside its window",
        MetricType::Counter,
        site,
        snap.pairs_skipped_inactive,
    );

    write_histogram(
        output,
        "geofence_tick_latency_us",
        "Evaluation pass latency in microseconds",
        site,
        &snap.tick_latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        snap.tick_latency_sum_us,
    );
    write_metric(
        output,
        "geofence_tick_latency_p50_us",
        "50th percentile pass latency",
        MetricType::Gauge,
        site,
        snap.tick_latency_p50_us,
    );
    write_metric(
        output,
        "geofence_tick_latency_p95_us",
        "95th percentile pass latency",
        MetricType::Gauge,
        site,
        snap.tick_latency_p95_us,
    );
    write_metric(
        output,
        "geofence_tick_latency_p99_us",
        "99th percentile pass latency",
        MetricType::Gauge,
        site,
        snap.tick_latency_p99_us,
    );
}

fn write_alarm_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    let name = "geofence_alarms_total";
    let _ = writeln!(output, "# HELP {name} Alarms raised by kind");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name}{{site=\"{site}\",kind=\"illegal_entry\"}} {}", snap.entry_alarms);
    let _ = writeln!(output, "{name}{{site=\"{site}\",kind=\"illegal_exit\"}} {}", snap.exit_alarms);

    write_metric(
        output,
        "geofence_notifications_dropped_total",
        "Alarm notifications dropped due to full channel",
        MetricType::Counter,
        site,
        snap.notifications_dropped,
    );
}

fn write_state_gauges(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_tracked_pairs",
        "Device x fence pairs with recorded state",
        MetricType::Gauge,
        site,
        snap.tracked_pairs,
    );
    write_metric(
        output,
        "geofence_violating_devices",
        "Devices currently violating at least one fence",
        MetricType::Gauge,
        site,
        snap.violating_devices,
    );
    write_metric(
        output,
        "geofence_online_devices",
        "Online devices in the last pass",
        MetricType::Gauge,
        site,
        snap.online_devices,
    );
}

fn write_feed_metrics(output: &mut String, site: &str, snap: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_catalog_load_failures_total",
        "Catalog loads that failed",
        MetricType::Counter,
        site,
        snap.catalog_load_failures,
    );
    write_metric(
        output,
        "geofence_device_feed_failures_total",
        "Device snapshot loads that failed",
        MetricType::Counter,
        site,
        snap.device_feed_failures,
    );
}

fn json_response(body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    sink: Arc<AlarmSink>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::GET, "/alarms/recent") => {
            let body = serde_json::to_string(&sink.snapshot()).unwrap_or_else(|e| {
                error!(error = %e, "sink_snapshot_serialize_failed");
                "{}".to_string()
            });
            Ok(json_response(body))
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    sink: Arc<AlarmSink>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let sink = sink.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let sink = sink.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, sink, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AlarmKind;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_tick(150, 4, 1);
        metrics.record_tick(250, 4, 1);
        metrics.record_alarm(AlarmKind::IllegalExit);
        metrics.set_violating_devices(3);

        let output = format_prometheus_metrics(&metrics, "yard");

        assert!(output.contains("geofence_ticks_total{site=\"yard\"} 2"));
        assert!(output.contains("geofence_pairs_evaluated_total{site=\"yard\"} 8"));
        assert!(output.contains("geofence_alarms_total{site=\"yard\",kind=\"illegal_exit\"} 1"));
        assert!(output.contains("geofence_violating_devices{site=\"yard\"} 3"));
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let metrics = Metrics::new();
        metrics.record_tick(50, 0, 0);
        metrics.record_tick(150, 0, 0);
        metrics.record_tick(90_000, 0, 0);

        let output = format_prometheus_metrics(&metrics, "s");
        assert!(output.contains("geofence_tick_latency_us_bucket{site=\"s\",le=\"100\"} 1"));
        assert!(output.contains("geofence_tick_latency_us_bucket{site=\"s\",le=\"200\"} 2"));
        assert!(output.contains("geofence_tick_latency_us_bucket{site=\"s\",le=\"+Inf\"} 3"));
        assert!(output.contains("geofence_tick_latency_us_sum{site=\"s\"} 90200"));
        assert!(output.contains("geofence_tick_latency_us_count{site=\"s\"} 3"));
    }
}
