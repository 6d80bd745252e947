use metrics::{counter, gauge};

pub fn record_event_dispatched(kind: &'static str) {
    counter!("roster_events_dispatched_total", "kind" => kind).increment(1);
}

pub fn record_handler_error(kind: &'static str) {
    counter!("roster_handler_errors_total", "kind" => kind).increment(1);
}

pub fn record_local_departure() {
    counter!("roster_local_departures_total").increment(1);
}

pub fn set_alive_members(node: &str, count: f64) {
    gauge!("roster_members", "node" => node.to_string()).set(count);
}
