//! Drives one IXP from its route server listing to a persisted report.
//!
//! ```text
//! Discovering -> PerServerFanout -> Enriching -> Assembling -> Done
//! ```
//!
//! Route servers are walked concurrently, each branch merging its origin ASNs
//! into a shared per-group set. Once every branch is done each unique
//! (group, ASN) pair is enriched once, then the rows are printed, shared and
//! written out. Only route server discovery and enrichment can fail a run;
//! everything else degrades to "no data" for the affected branch.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    enrich::Enricher,
    error::{Error, Result},
    lookingglass::{ixp_host, LookingGlass, OriginAsns, RouteServer},
    metrics::ORIGIN_ASNS_COUNTER,
    net::{HttpTransport, RetryingTransport, Transport},
    report::{report_name, FileSink, GlotSnippets, Report, ReportLink, ReportRow, ReportSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovering,
    PerServerFanout,
    Enriching,
    Assembling,
    Done,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Idle time at the end of every route server branch.
    pub branch_cooldown: Duration,
    /// Gap between dispatching two enrichment lookups.
    pub enrichment_pacing: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            branch_cooldown: Duration::from_secs(60),
            enrichment_pacing: Duration::from_millis(500),
        }
    }
}

/// Origin ASNs of one IXP, bucketed by route server group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAsnSet {
    groups: BTreeMap<String, BTreeSet<u32>>,
}

impl OriginAsnSet {
    pub fn merge(&mut self, group: &str, asns: impl IntoIterator<Item = u32>) {
        self.groups.entry(group.to_string()).or_default().extend(asns);
    }

    pub fn group(&self, group: &str) -> Option<&BTreeSet<u32>> {
        self.groups.get(group)
    }

    /// Every unique (group, ASN) pair, sorted.
    pub fn pairs(&self) -> Vec<(String, u32)> {
        self.groups
            .iter()
            .flat_map(|(group, asns)| asns.iter().map(move |asn| (group.clone(), *asn)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a finished IXP run hands back.
#[derive(Debug, Clone)]
pub struct IxpReport {
    pub ixp: String,
    pub report: Report,
    pub link: Option<String>,
}

pub struct Pipeline {
    lookingglass: LookingGlass,
    enricher: Arc<Enricher>,
    link: Option<Arc<dyn ReportLink>>,
    sink: Arc<dyn ReportSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        lookingglass: LookingGlass,
        enricher: Enricher,
        sink: Arc<dyn ReportSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            lookingglass,
            enricher: Arc::new(enricher),
            link: None,
            sink,
            settings,
        }
    }

    pub fn with_link(mut self, link: Arc<dyn ReportLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// Wire everything to real HTTP, with retries on every outbound call.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(RetryingTransport::new(
            Arc::new(HttpTransport::new()?),
            config.retry_policy(),
        ));

        let pipeline = Self::new(
            LookingGlass::new(transport.clone(), config.lookingglass_settings()),
            Enricher::new(transport.clone(), config.enrichment_settings()),
            Arc::new(FileSink::new(&config.report.directory)),
            config.pipeline_settings(),
        );

        Ok(if config.report.share {
            pipeline.with_link(Arc::new(GlotSnippets::new(
                transport,
                &config.report.share_url,
                Duration::from_secs(config.report.timeout_secs),
            )))
        } else {
            pipeline
        })
    }

    /// Run every IXP concurrently. One IXP failing doesn't stop the others.
    pub async fn run_all(&self, bases: &[String]) -> Vec<(String, Result<IxpReport>)> {
        join_all(
            bases
                .iter()
                .map(|base| async move { (base.clone(), self.run_ixp(base).await) }),
        )
        .await
    }

    pub async fn run_ixp(&self, base: &str) -> Result<IxpReport> {
        let result = self.run_stages(base).await;
        if let Err(err) = &result {
            error!(ixp = base, "run failed: {err}");
        }
        result
    }

    async fn run_stages(&self, base: &str) -> Result<IxpReport> {
        info!(ixp = base, stage = ?Stage::Discovering, "starting");
        let route_servers = self.lookingglass.route_servers(base).await?;

        info!(ixp = base, stage = ?Stage::PerServerFanout, route_servers = route_servers.len());
        let origins = self.collect(base, &route_servers).await;

        info!(ixp = base, stage = ?Stage::Enriching, pairs = origins.len());
        ORIGIN_ASNS_COUNTER
            .with_label_values(&[ixp_host(base)])
            .inc_by(origins.len() as u64);
        let rows = self.enrich(&origins).await?;

        info!(ixp = base, stage = ?Stage::Assembling, rows = rows.len());
        let report = Report::new(rows);
        let link = self.assemble(base, &report).await?;

        info!(ixp = base, stage = ?Stage::Done, "finished");
        Ok(IxpReport {
            ixp: base.to_string(),
            report,
            link,
        })
    }

    /// Walk every route server concurrently and merge what they saw.
    pub async fn collect(&self, base: &str, route_servers: &[RouteServer]) -> OriginAsnSet {
        let origins = Mutex::new(OriginAsnSet::default());
        join_all(
            route_servers
                .iter()
                .map(|rs| self.route_server_branch(base, rs, &origins)),
        )
        .await;
        origins.into_inner()
    }

    async fn route_server_branch(
        &self,
        base: &str,
        route_server: &RouteServer,
        origins: &Mutex<OriginAsnSet>,
    ) {
        let rs = route_server.id.as_str();
        info!(ixp = base, route_server = rs, group = %route_server.group, "working on route server");

        let neighbours = self.lookingglass.neighbours(base, rs).await;
        match self.lookingglass.origin_asns(base, rs, &neighbours).await {
            OriginAsns::Collected(asns) => {
                info!(ixp = base, route_server = rs, count = asns.len(), "collected origin ASNs");
                origins.lock().merge(&route_server.group, asns);
            }
            OriginAsns::Empty => info!(ixp = base, route_server = rs, "no origin ASNs"),
            OriginAsns::Degraded => {
                warn!(ixp = base, route_server = rs, "route server contributed nothing")
            }
        }

        tokio::time::sleep(self.settings.branch_cooldown).await;
    }

    /// One lookup per (group, ASN) pair, dispatched with a gap between each so
    /// the registries don't see a burst. The first failure cancels the rest.
    pub async fn enrich(&self, origins: &OriginAsnSet) -> Result<Vec<ReportRow>> {
        let mut tasks = JoinSet::new();
        let mut rows = Vec::with_capacity(origins.len());

        for (i, (group, asn)) in origins.pairs().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.enrichment_pacing).await;
            }
            while let Some(done) = tasks.try_join_next() {
                rows.extend(joined(done)?);
            }

            let enricher = self.enricher.clone();
            tasks.spawn(async move {
                enricher
                    .details(asn)
                    .await
                    .map(|details| ReportRow::new(&group, details))
            });
        }

        while let Some(done) = tasks.join_next().await {
            rows.extend(joined(done)?);
        }
        Ok(rows)
    }

    /// Print, share and persist. A failed share is only logged; the report on
    /// disk is what matters.
    async fn assemble(&self, base: &str, report: &Report) -> Result<Option<String>> {
        let text = report.to_text();
        println!("{text}");

        let link = match &self.link {
            Some(link) => match link.publish(&text).await {
                Ok(url) => {
                    println!("{}", "=".repeat(80));
                    println!("We created a sharable report link, enjoy => {url}");
                    Some(url)
                }
                Err(err) => {
                    error!(ixp = base, "couldn't create report link: {err}");
                    None
                }
            },
            None => None,
        };

        let name = report_name(base);
        let persisted = self
            .sink
            .write_text(&name, &text)
            .and_then(|_| self.sink.write_records(&name, &report.rows));
        if let Err(err) = persisted {
            return Err(Error::Persistence {
                name,
                reason: format!("{err:#}"),
            });
        }

        Ok(link)
    }
}

fn joined(
    done: std::result::Result<Result<ReportRow>, JoinError>,
) -> Result<Option<ReportRow>> {
    match done {
        Ok(row) => row.map(Some),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        // only cancelled tasks end up here, and we never cancel
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        enrich::EnrichmentSettings,
        lookingglass::LookingGlassSettings,
        net::stub::StubTransport,
    };

    const BASE: &str = "https://lg.example.net";
    const ASRANK: &str = "https://api.asrank.caida.org/v2/restful/asns";
    const RIPE: &str = "https://stat.ripe.net/data/as-overview/data.json";

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<String>>,
    }

    impl ReportSink for MemorySink {
        fn write_text(&self, name: &str, _text: &str) -> anyhow::Result<()> {
            self.written.lock().push(format!("{name}.txt"));
            Ok(())
        }

        fn write_records(&self, name: &str, _rows: &[ReportRow]) -> anyhow::Result<()> {
            self.written.lock().push(format!("{name}.json"));
            Ok(())
        }
    }

    fn paced(
        stub: Arc<StubTransport>,
        sink: Arc<MemorySink>,
        neighbour_pacing: Duration,
        settings: PipelineSettings,
    ) -> Pipeline {
        let transport: Arc<dyn Transport> = stub;
        Pipeline::new(
            LookingGlass::new(
                transport.clone(),
                LookingGlassSettings {
                    neighbour_pacing,
                    ..Default::default()
                },
            ),
            Enricher::new(transport, EnrichmentSettings::default()),
            sink,
            settings,
        )
    }

    fn pipeline(stub: Arc<StubTransport>, sink: Arc<MemorySink>) -> Pipeline {
        paced(
            stub,
            sink,
            Duration::ZERO,
            PipelineSettings {
                branch_cooldown: Duration::ZERO,
                enrichment_pacing: Duration::ZERO,
            },
        )
    }

    /// When each matching call was made, relative to `start`.
    fn offsets(
        stub: &StubTransport,
        start: Instant,
        wanted: impl Fn(&str) -> bool,
    ) -> Vec<Duration> {
        stub.calls()
            .into_iter()
            .zip(stub.call_times())
            .filter(|(url, _)| wanted(url))
            .map(|(_, at)| at - start)
            .collect()
    }

    fn with_registries(mut stub: StubTransport, asns: &[u32]) -> StubTransport {
        for asn in asns {
            stub = stub
                .json(
                    &format!("{ASRANK}/{asn}"),
                    json!({"data": {"asn": {
                        "rank": 1,
                        "source": "RIPE",
                        "country": {"iso": "NL"},
                    }}}),
                )
                .json(
                    &format!("{RIPE}?resource={asn}"),
                    json!({"data": {"holder": format!("AS{asn}-HOLDER")}}),
                );
        }
        stub
    }

    fn lg(path: &str) -> String {
        format!("{BASE}/api/v1/routeservers{path}")
    }

    fn routes(origins: &[u32]) -> serde_json::Value {
        let imported: Vec<_> = origins
            .iter()
            .map(|asn| json!({"bgp": {"as_path": [6939, asn]}}))
            .collect();
        json!({"imported": imported, "filtered": []})
    }

    #[test]
    fn origin_set_merges_per_group() {
        let mut set = OriginAsnSet::default();
        set.merge("a", [1, 2]);
        set.merge("a", [2, 3]);
        set.merge("b", [2]);

        assert_eq!(set.len(), 4);
        assert_eq!(
            set.pairs(),
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 2),
                ("a".to_string(), 3),
                ("b".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn degraded_route_server_leaves_siblings_alone() {
        let stub = StubTransport::new()
            .json(
                &lg(""),
                json!({"routeservers": [
                    {"id": "rs1", "group": "IPv4"},
                    {"id": "rs2", "group": "IPv4"},
                    {"id": "rs3", "group": "IPv6"},
                ]}),
            )
            .status(&lg("/rs1/neighbors"), 500)
            .json(&lg("/rs2/neighbors"), json!({"neighbors": [{"id": "n1"}]}))
            .json(&lg("/rs2/neighbors/n1/routes"), routes(&[64500, 64501]))
            .json(&lg("/rs3/neighbors"), json!({"neighbours": [{"id": "n9"}]}))
            .json(&lg("/rs3/neighbors/n9/routes"), routes(&[64502]));
        let pipeline = pipeline(Arc::new(stub), Arc::default());

        let route_servers = pipeline.lookingglass.route_servers(BASE).await.unwrap();
        let origins = pipeline.collect(BASE, &route_servers).await;

        assert_eq!(
            origins.group("lg.example.net => IPv4"),
            Some(&BTreeSet::from([64500, 64501]))
        );
        assert_eq!(
            origins.group("lg.example.net => IPv6"),
            Some(&BTreeSet::from([64502]))
        );
    }

    #[tokio::test]
    async fn shared_asns_are_enriched_once_per_group() {
        let stub = StubTransport::new()
            .json(
                &lg(""),
                json!({"routeservers": [
                    {"id": "rs1", "group": "IPv4"},
                    {"id": "rs2", "group": "IPv4"},
                ]}),
            )
            .json(&lg("/rs1/neighbors"), json!({"neighbors": [{"id": "a"}]}))
            .json(&lg("/rs2/neighbors"), json!({"neighbors": [{"id": "b"}]}))
            .json(&lg("/rs1/neighbors/a/routes"), routes(&[64500, 64501]))
            .json(&lg("/rs2/neighbors/b/routes"), routes(&[64500]));
        let stub = Arc::new(with_registries(stub, &[64500, 64501]));

        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(stub.clone(), sink.clone());

        let result = pipeline.run_ixp(BASE).await.unwrap();
        let keys: Vec<_> = result
            .report
            .rows
            .iter()
            .map(|r| (r.group.as_str(), r.asn))
            .collect();
        assert_eq!(
            keys,
            vec![("lg.example.net => IPv4", 64500), ("lg.example.net => IPv4", 64501)]
        );

        let asrank_calls = stub
            .calls()
            .into_iter()
            .filter(|url| *url == format!("{ASRANK}/64500"))
            .count();
        assert_eq!(asrank_calls, 1);

        assert_eq!(
            *sink.written.lock(),
            vec!["lg.example.net.txt".to_string(), "lg.example.net.json".to_string()]
        );
        assert!(result.link.is_none());
    }

    #[tokio::test]
    async fn failed_discovery_fails_only_that_ixp() {
        let stub = StubTransport::new()
            .status(&lg(""), 503)
            .json(
                "https://lg.other.net/api/v1/routeservers",
                json!({"routeservers": []}),
            );
        let pipeline = pipeline(Arc::new(stub), Arc::default());

        let results = pipeline
            .run_all(&[BASE.to_string(), "https://lg.other.net".to_string()])
            .await;

        assert!(matches!(results[0].1, Err(Error::FatalDiscovery { .. })));
        let other = results[1].1.as_ref().unwrap();
        assert!(other.report.is_empty());
    }

    #[tokio::test]
    async fn enrichment_failure_fails_the_run() {
        let stub = StubTransport::new()
            .json(&lg(""), json!({"routeservers": [{"id": "rs1", "group": "IPv4"}]}))
            .json(&lg("/rs1/neighbors"), json!({"neighbors": [{"id": "a"}]}))
            .json(&lg("/rs1/neighbors/a/routes"), routes(&[64500]))
            .status(&format!("{ASRANK}/64500"), 404)
            .json(
                &format!("{RIPE}?resource=64500"),
                json!({"data": {"holder": "X"}}),
            );
        let sink = Arc::new(MemorySink::default());
        let pipeline = pipeline(Arc::new(stub), sink.clone());

        let err = pipeline.run_ixp(BASE).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert!(sink.written.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn branch_cooldowns_overlap() {
        let stub = StubTransport::new().json(
            &lg(""),
            json!({"routeservers": [
                {"id": "rs1", "group": "IPv4"},
                {"id": "rs2", "group": "IPv4"},
                {"id": "rs3", "group": "IPv6"},
            ]}),
        );
        let stub = [("rs1", 64500), ("rs2", 64501), ("rs3", 64502)]
            .into_iter()
            .fold(stub, |stub, (rs, asn)| {
                let neighbours = json!({"neighbors": [{"id": "n1"}]});
                stub.json(&lg(&format!("/{rs}/neighbors")), neighbours)
                    .json(&lg(&format!("/{rs}/neighbors/n1/routes")), routes(&[asn]))
            });
        let stub = Arc::new(stub);
        let pipeline = paced(
            stub.clone(),
            Arc::default(),
            Duration::from_secs(1),
            PipelineSettings {
                branch_cooldown: Duration::from_secs(60),
                enrichment_pacing: Duration::ZERO,
            },
        );
        let route_servers = pipeline.lookingglass.route_servers(BASE).await.unwrap();

        let start = Instant::now();
        let origins = pipeline.collect(BASE, &route_servers).await;
        let elapsed = start.elapsed();

        assert_eq!(origins.len(), 3);
        // every branch pays its own pacing and cooldown, but side by side
        assert!(elapsed >= Duration::from_secs(61), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(120), "branches ran in series: {elapsed:?}");
        assert_eq!(
            offsets(&stub, start, |url| url.ends_with("/routes")),
            vec![Duration::from_secs(1); 3]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn enrichment_dispatches_are_spaced() {
        let stub = Arc::new(with_registries(StubTransport::new(), &[64500, 64501, 64502]));
        let pipeline = paced(
            stub.clone(),
            Arc::default(),
            Duration::ZERO,
            PipelineSettings {
                branch_cooldown: Duration::ZERO,
                enrichment_pacing: Duration::from_millis(500),
            },
        );
        let mut origins = OriginAsnSet::default();
        origins.merge("g", [64500, 64501, 64502]);

        let start = Instant::now();
        let rows = pipeline.enrich(&origins).await.unwrap();
        assert_eq!(rows.len(), 3);

        let at = offsets(&stub, start, |url| url.starts_with(ASRANK));
        assert_eq!(at.len(), 3);
        for pair in at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500), "{at:?}");
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
