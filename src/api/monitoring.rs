//! Monitoring & Metrics
//!
//! Hand-rolled counters with Prometheus text export and a structured
//! health endpoint. Counters track the API surface; live gauges are read
//! from the stores at scrape time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Live numbers read from the stores and the hub at scrape time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStats {
    pub live_sessions: usize,
    pub sessions_settled: u64,
    pub pending_bets: usize,
    pub events_published: u64,
}

/// Prometheus-compatible metrics registry
pub struct MetricsRegistry {
    start_time: Instant,

    /// HTTP request metrics
    pub http_requests_total: AtomicU64,
    pub errors_total: AtomicU64,

    /// Coinflip metrics
    pub sessions_created_total: AtomicU64,
    pub joins_total: AtomicU64,
    pub sessions_refunded_total: AtomicU64,

    /// Dice metrics
    pub bets_placed_total: AtomicU64,
    pub claims_paid_total: AtomicU64,

    /// Payment callback metrics
    pub callbacks_received_total: AtomicU64,

    /// WebSocket metrics
    pub ws_connections_active: AtomicU64,
    pub ws_messages_sent_total: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            http_requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            sessions_created_total: AtomicU64::new(0),
            joins_total: AtomicU64::new(0),
            sessions_refunded_total: AtomicU64::new(0),
            bets_placed_total: AtomicU64::new(0),
            claims_paid_total: AtomicU64::new(0),
            callbacks_received_total: AtomicU64::new(0),
            ws_connections_active: AtomicU64::new(0),
            ws_messages_sent_total: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ws_connected(&self) -> u64 {
        self.ws_connections_active.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ws_disconnected(&self) -> u64 {
        self.ws_connections_active.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn record_ws_message(&self) {
        self.ws_messages_sent_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate Prometheus metrics format
    pub fn to_prometheus_format(&self, runtime: &RuntimeStats) -> String {
        let mut output = String::new();

        let counters = [
            (
                "satsdice_http_requests_total",
                "Total number of HTTP requests",
                self.http_requests_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_errors_total",
                "Total number of request errors",
                self.errors_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_sessions_created_total",
                "Coinflip sessions opened",
                self.sessions_created_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_joins_total",
                "Coinflip join admissions",
                self.joins_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_sessions_settled_total",
                "Coinflip sessions settled with a winner",
                runtime.sessions_settled,
            ),
            (
                "satsdice_sessions_refunded_total",
                "Coinflip sessions abandoned by the operator",
                self.sessions_refunded_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_bets_placed_total",
                "Dice bets placed",
                self.bets_placed_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_claims_paid_total",
                "Dice claim tickets paid out",
                self.claims_paid_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_callbacks_received_total",
                "Payment confirmation callbacks received",
                self.callbacks_received_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_ws_messages_sent_total",
                "WebSocket event frames sent",
                self.ws_messages_sent_total.load(Ordering::SeqCst),
            ),
            (
                "satsdice_events_published_total",
                "Game events published to the notification hub",
                runtime.events_published,
            ),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }

        let gauges = [
            (
                "satsdice_ws_connections_active",
                "Active WebSocket connections",
                self.ws_connections_active.load(Ordering::SeqCst),
            ),
            (
                "satsdice_live_sessions",
                "Coinflip sessions currently held live",
                runtime.live_sessions as u64,
            ),
            (
                "satsdice_pending_bets",
                "Dice bets awaiting payment confirmation",
                runtime.pending_bets as u64,
            ),
            (
                "satsdice_uptime_seconds",
                "Server uptime in seconds",
                self.uptime().as_secs(),
            ),
            (
                "satsdice_memory_usage_bytes",
                "Resident memory in bytes",
                get_memory_usage_bytes(),
            ),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n\n"
            ));
        }

        output
    }

    /// Snapshot every counter and gauge for the JSON endpoint.
    pub fn snapshot(&self, runtime: &RuntimeStats) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: self.http_requests_total.load(Ordering::SeqCst),
            errors_total: self.errors_total.load(Ordering::SeqCst),
            sessions_created_total: self.sessions_created_total.load(Ordering::SeqCst),
            sessions_settled_total: runtime.sessions_settled,
            sessions_refunded_total: self.sessions_refunded_total.load(Ordering::SeqCst),
            joins_total: self.joins_total.load(Ordering::SeqCst),
            bets_placed_total: self.bets_placed_total.load(Ordering::SeqCst),
            claims_paid_total: self.claims_paid_total.load(Ordering::SeqCst),
            callbacks_received_total: self.callbacks_received_total.load(Ordering::SeqCst),
            events_published_total: runtime.events_published,
            ws_messages_sent_total: self.ws_messages_sent_total.load(Ordering::SeqCst),
            ws_connections_active: self.ws_connections_active.load(Ordering::SeqCst),
            live_sessions: runtime.live_sessions,
            pending_bets: runtime.pending_bets,
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Counter and gauge values in one JSON-friendly struct.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub http_requests_total: u64,
    pub errors_total: u64,
    pub sessions_created_total: u64,
    pub sessions_settled_total: u64,
    pub sessions_refunded_total: u64,
    pub joins_total: u64,
    pub bets_placed_total: u64,
    pub claims_paid_total: u64,
    pub callbacks_received_total: u64,
    pub events_published_total: u64,
    pub ws_messages_sent_total: u64,
    pub ws_connections_active: u64,
    pub live_sessions: usize,
    pub pending_bets: usize,
    pub uptime_secs: u64,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check status
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub uptime_secs: u64,
    pub checks: HashMap<String, HealthCheck>,
}

/// Individual health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

fn runtime_stats(state: &super::handlers::AppState) -> RuntimeStats {
    RuntimeStats {
        live_sessions: state.sessions.live_sessions(),
        sessions_settled: state.sessions.settled_count(),
        pending_bets: state.dice.pending_bets(),
        events_published: state.hub.published_count(),
    }
}

/// Axum handler for Prometheus metrics endpoint
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<super::handlers::AppState>>,
) -> axum::response::Response<String> {
    let body = state.metrics.to_prometheus_format(&runtime_stats(&state));

    axum::response::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
        .body(body)
        .unwrap_or_default()
}

/// Axum handler for the JSON metrics snapshot
pub async fn metrics_json_handler(
    axum::extract::State(state): axum::extract::State<Arc<super::handlers::AppState>>,
) -> axum::Json<MetricsSnapshot> {
    axum::Json(state.metrics.snapshot(&runtime_stats(&state)))
}

/// Axum handler for detailed health check endpoint
pub async fn health_detail_handler(
    axum::extract::State(state): axum::extract::State<Arc<super::handlers::AppState>>,
) -> axum::Json<HealthStatus> {
    let mut checks = HashMap::new();

    checks.insert(
        "sessions".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("{} live sessions", state.sessions.live_sessions()),
        },
    );
    checks.insert(
        "dice".to_string(),
        HealthCheck {
            status: "ok".to_string(),
            message: format!("{} pending bets", state.dice.pending_bets()),
        },
    );

    let ws_connections = state
        .metrics
        .ws_connections_active
        .load(Ordering::SeqCst);
    checks.insert(
        "websockets".to_string(),
        HealthCheck {
            status: if ws_connections < 10_000 { "ok" } else { "warning" }.to_string(),
            message: format!("{ws_connections} active connections"),
        },
    );

    let overall_status = if checks.values().all(|c| c.status == "ok") {
        "healthy"
    } else {
        "degraded"
    };

    axum::Json(HealthStatus {
        status: overall_status.to_string(),
        timestamp: current_timestamp(),
        uptime_secs: state.metrics.uptime().as_secs(),
        checks,
    })
}

/// Get memory usage in bytes
fn get_memory_usage_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/self/status") {
            for line in contents.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return kb * 1024;
                        }
                    }
                }
            }
        }
    }
    0
}

/// Get current timestamp
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_format() {
        let registry = MetricsRegistry::new();
        registry.record_request();
        registry.record_request();
        registry.sessions_created_total.fetch_add(1, Ordering::SeqCst);

        let runtime = RuntimeStats {
            live_sessions: 3,
            sessions_settled: 2,
            pending_bets: 7,
            events_published: 11,
        };
        let output = registry.to_prometheus_format(&runtime);
        assert!(output.contains("satsdice_http_requests_total 2"));
        assert!(output.contains("satsdice_sessions_created_total 1"));
        assert!(output.contains("satsdice_sessions_settled_total 2"));
        assert!(output.contains("satsdice_events_published_total 11"));
        assert!(output.contains("satsdice_live_sessions 3"));
        assert!(output.contains("satsdice_pending_bets 7"));
        assert!(output.contains("# TYPE satsdice_http_requests_total counter"));
    }

    #[test]
    fn test_snapshot_mirrors_counters() {
        let registry = MetricsRegistry::new();
        registry.record_request();
        registry.bets_placed_total.fetch_add(4, Ordering::SeqCst);

        let runtime = RuntimeStats {
            live_sessions: 1,
            sessions_settled: 5,
            pending_bets: 2,
            events_published: 9,
        };
        let snapshot = registry.snapshot(&runtime);
        assert_eq!(snapshot.http_requests_total, 1);
        assert_eq!(snapshot.bets_placed_total, 4);
        assert_eq!(snapshot.sessions_settled_total, 5);
        assert_eq!(snapshot.events_published_total, 9);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["live_sessions"], 1);
        assert_eq!(json["pending_bets"], 2);
    }

    #[test]
    fn test_ws_connection_gauge() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.ws_connected(), 1);
        assert_eq!(registry.ws_connected(), 2);
        assert_eq!(registry.ws_disconnected(), 1);
    }
}
