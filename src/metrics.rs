use tracing::trace;

// Trace-level counters; the Prometheus endpoint only exposes the recorder.

pub fn inc_requests(route: &'static str) {
    trace!(target = "crosslist.metrics", route = route, "requests_total_inc");
}

pub fn pair_elapsed(platform: &'static str, elapsed_ms: u128) {
    trace!(
        target = "crosslist.metrics",
        platform = platform,
        elapsed_ms = elapsed_ms as u64,
        "pair_elapsed"
    );
}

pub fn request_finalized(status: &'static str) {
    trace!(target = "crosslist.metrics", status = status, "requests_finalized_inc");
}
