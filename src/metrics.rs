use lazy_static::lazy_static;
use prometheus_exporter::{
    self,
    prometheus::IntCounter,
    prometheus::IntCounterVec,
    prometheus::register_int_counter,
    prometheus::register_int_counter_vec
};

lazy_static! {
    pub static ref ROUTE_SERVERS_COUNTER: IntCounterVec =
        register_int_counter_vec!("ixpscan_route_servers", "Number of route servers discovered", &["ixp"]).unwrap();
    pub static ref ORIGIN_ASNS_COUNTER: IntCounterVec =
        register_int_counter_vec!("ixpscan_origin_asns", "Number of unique (group, ASN) pairs collected", &["ixp"]).unwrap();
    pub static ref ENRICHED_ASNS_COUNTER: IntCounter =
        register_int_counter!("ixpscan_enriched_asns", "Number of ASNs enriched from the registries").unwrap();
    pub static ref RETRIES_COUNTER: IntCounterVec =
        register_int_counter_vec!("ixpscan_retries", "Number of outbound calls retried", &["reason"]).unwrap();
    pub static ref DEGRADED_COUNTER: IntCounterVec =
        register_int_counter_vec!("ixpscan_degraded_branches", "Number of branches degraded to no data", &["stage"]).unwrap();
}

/// Serve the default registry over HTTP.
pub fn start_exporter(bind: &str) -> anyhow::Result<()> {
    let addr = bind.parse()?;
    prometheus_exporter::start(addr)?;
    Ok(())
}
