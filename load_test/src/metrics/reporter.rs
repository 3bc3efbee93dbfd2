//! Console reporter for metrics with real-time updates

use super::collector::{LatencyStats, MetricsCollector};
use super::types::SessionMetrics;
use chrono::Utc;
use std::io::{self, Write};
use tokio::time::{interval, Duration};

/// Start periodic metrics reporting (every N seconds)
pub async fn start_periodic_reporter(collector: MetricsCollector, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        ticker.tick().await;
        collector.update_system_metrics();
        print_live_metrics(&collector);
    }
}

fn print_sessions_row(label: &str, sessions: &SessionMetrics) {
    println!(
        "│  {:<14} {:>7} started {:>7} done {:>6} failed {:>6} live │",
        label, sessions.started, sessions.completed, sessions.failed, sessions.in_flight
    );
}

fn print_latency_box(title: &str, latency: &LatencyStats) {
    println!("\n┌─ {} ", title);
    println!(
        "│  Min: {:>6}  P50: {:>6}  P95: {:>6}  P99: {:>6}  Max: {:>6}│",
        latency.min, latency.p50, latency.p95, latency.p99, latency.max
    );
    println!("│  Mean: {:>8.2} ms    Count: {:>10}                    │", latency.mean, latency.count);
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Print live metrics (clears screen and updates in place)
pub fn print_live_metrics(collector: &MetricsCollector) {
    print!("\x1B[2J\x1B[1;1H");

    let metrics = collector.get_snapshot();
    let elapsed = collector.elapsed_seconds();
    let request_latency = collector.get_request_latency_percentiles();

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║            RADAR-base Load Test - Live Metrics                 ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!(
        "\n⏱️  Elapsed Time: {:02}:{:02}:{:02}    Phase: {}",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60,
        metrics.current_phase.as_deref().unwrap_or("-")
    );

    println!("\n┌─ SESSIONS ──────────────────────────────────────────────────┐");
    for phase in &metrics.phases {
        print_sessions_row(&phase.name, &phase.sessions);
    }
    print_sessions_row("total", &metrics.sessions);
    println!("└─────────────────────────────────────────────────────────────┘");

    println!("\n┌─ REQUESTS ──────────────────────────────────────────────────┐");
    println!(
        "│  Sent: {:>8}  OK: {:>8}  4xx: {:>6}  5xx: {:>6}  I/O: {:>5} │",
        metrics.requests.sent,
        metrics.requests.ok,
        metrics.requests.client_errors,
        metrics.requests.server_errors,
        metrics.requests.transport_errors
    );
    if elapsed > 0 {
        println!(
            "│  Throughput: {:>8.2} req/sec    Records: {:>10}          │",
            metrics.requests.sent as f64 / elapsed as f64,
            metrics.records_sent
        );
    }
    println!("└─────────────────────────────────────────────────────────────┘");

    if request_latency.count > 0 {
        print_latency_box("REQUEST LATENCY (ms) ──────────────────────────────────────┐", &request_latency);
    }

    println!("\n┌─ SYSTEM ────────────────────────────────────────────────────┐");
    println!(
        "│  CPU Usage:    {:>6.1}%    Memory: {:>6} / {:>6} MB       │",
        metrics.system.cpu_usage, metrics.system.memory_used_mb, metrics.system.memory_total_mb
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    println!("\n  [Press Ctrl+C to stop test]");
    let _ = io::stdout().flush();
}

/// Print final summary report
pub fn print_final_report(collector: &MetricsCollector) {
    let metrics = collector.get_snapshot();
    let elapsed = collector.elapsed_seconds();
    let session_latency = collector.get_session_latency_percentiles();
    let request_latency = collector.get_request_latency_percentiles();

    println!("\n╔════════════════════════════════════════════════════════════════╗");
    println!("║                    FINAL TEST REPORT                           ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!("\n📊 SESSIONS");
    for phase in &metrics.phases {
        let rate = phase
            .sessions
            .success_rate()
            .map(|r| format!("{:.2}%", r))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:<16} {:>8} completed {:>6} failed   success {:>8}",
            phase.name, phase.sessions.completed, phase.sessions.failed, rate
        );
    }
    println!("   Total Started:        {:>10}", metrics.sessions.started);
    println!("   Total Failed:         {:>10}", metrics.sessions.failed);

    if session_latency.count > 0 {
        println!("\n📈 SESSION LATENCY");
        println!("   P50 (Median):         {:>10} ms", session_latency.p50);
        println!("   P95:                  {:>10} ms", session_latency.p95);
        println!("   Max:                  {:>10} ms", session_latency.max);
    }

    println!("\n🌐 REQUESTS");
    for (name, requests) in &metrics.requests_by_name {
        println!(
            "   {:<28} {:>8} sent {:>8} ok {:>6} ko",
            name,
            requests.sent,
            requests.ok,
            requests.sent - requests.ok
        );
    }
    if elapsed > 0 {
        let throughput = metrics.requests.sent as f64 / elapsed as f64;
        println!("   Throughput:           {:>10.2} requests/sec", throughput);
    }
    println!("   Records Sent:         {:>10}", metrics.records_sent);

    if request_latency.count > 0 {
        println!("\n📈 REQUEST LATENCY");
        println!("   Min:                  {:>10} ms", request_latency.min);
        println!("   P50 (Median):         {:>10} ms", request_latency.p50);
        println!("   P95:                  {:>10} ms", request_latency.p95);
        println!("   P99:                  {:>10} ms", request_latency.p99);
        println!("   Max:                  {:>10} ms", request_latency.max);
        println!("   Mean:                 {:>10.2} ms", request_latency.mean);
    }

    println!("\n⏱️  Test Duration: {} seconds", elapsed);
    println!("   Finished at {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("════════════════════════════════════════════════════════════════\n");
}
