//! The finished per-IXP table: `;`-delimited text for humans and the same rows
//! as JSON records for machines.

pub mod link;
pub mod sink;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::{
    enrich::{AsnDetails, NA},
    lookingglass::ixp_host,
};

pub use link::{GlotSnippets, ReportLink};
pub use sink::{FileSink, ReportSink};

pub const HEADER: &str = "IXP ; ASN ; AS-NAME ; AS Rank ; Source ; Country ; PeeringDB link";
const DELIMITER: char = ';';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "IXP")]
    pub group: String,
    #[serde(rename = "ASN")]
    pub asn: u32,
    #[serde(rename = "AS-NAME")]
    pub asn_name: String,
    #[serde(rename = "AS Rank")]
    pub rank: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Country")]
    pub country_iso: String,
    #[serde(rename = "PeeringDB link")]
    pub peeringdb_link: String,
}

impl ReportRow {
    pub fn new(group: &str, details: AsnDetails) -> Self {
        Self {
            group: clean(group),
            asn: details.asn,
            asn_name: clean(&details.asn_name),
            rank: clean(&details.rank),
            source: clean(&details.source),
            country_iso: clean(&details.country_iso),
            peeringdb_link: peeringdb_link(details.asn),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} ; {} ; {} ; {} ; {} ; {} ; {}",
            self.group,
            self.asn,
            self.asn_name,
            self.rank,
            self.source,
            self.country_iso,
            self.peeringdb_link
        )
    }

    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        let &[group, asn, asn_name, rank, source, country_iso, link] = fields.as_slice() else {
            bail!("expected 7 fields, got {}: {line:?}", fields.len());
        };

        Ok(Self {
            group: group.to_string(),
            asn: asn.parse().with_context(|| format!("bad ASN {asn:?}"))?,
            asn_name: asn_name.to_string(),
            rank: rank.to_string(),
            source: source.to_string(),
            country_iso: country_iso.to_string(),
            peeringdb_link: link.to_string(),
        })
    }
}

pub fn peeringdb_link(asn: u32) -> String {
    format!("https://www.peeringdb.com/asn/{asn}")
}

/// Registry text goes straight into a `;`-delimited line, so it can't carry
/// the delimiter or line breaks.
fn clean(field: &str) -> String {
    let cleaned = field
        .replace(DELIMITER, ",")
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        NA.to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Rows come back from enrichment in completion order; sort them so
    /// reports are stable between runs.
    pub fn new(mut rows: Vec<ReportRow>) -> Self {
        rows.sort();
        rows.dedup_by(|a, b| a.group == b.group && a.asn == b.asn);
        Self { rows }
    }

    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(HEADER.to_string());
        lines.extend(self.rows.iter().map(ReportRow::to_line));
        lines.join("\n")
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        match lines.next() {
            Some(header) if header.trim() == HEADER => {}
            Some(header) => bail!("unexpected report header {header:?}"),
            None => bail!("empty report"),
        }

        let rows = lines
            .map(ReportRow::parse_line)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// File name (without extension) a report for this IXP is stored under.
pub fn report_name(base: &str) -> String {
    ixp_host(base).replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(asn: u32, name: &str) -> AsnDetails {
        AsnDetails {
            asn,
            asn_name: name.to_string(),
            rank: "42".to_string(),
            source: "RIPE".to_string(),
            country_iso: "NL".to_string(),
        }
    }

    #[test]
    fn formats_rows_like_the_header() {
        let row = ReportRow::new("lg.ams-ix.net => CW", details(64500, "EXAMPLE-AS"));
        assert_eq!(
            row.to_line(),
            "lg.ams-ix.net => CW ; 64500 ; EXAMPLE-AS ; 42 ; RIPE ; NL ; https://www.peeringdb.com/asn/64500"
        );
    }

    #[test]
    fn text_parses_back_to_the_same_rows() {
        let report = Report::new(vec![
            ReportRow::new("lg.example.net => IPv6", details(64501, "B; with semicolon")),
            ReportRow::new("lg.example.net => IPv4", details(64500, "A\nmultiline")),
            ReportRow::new("lg.example.net => IPv4", details(64502, "")),
        ]);

        let text = report.to_text();
        assert!(text.starts_with(HEADER));
        assert_eq!(Report::parse(&text).unwrap(), report);
    }

    #[test]
    fn rows_are_sorted_and_unique_per_group() {
        let report = Report::new(vec![
            ReportRow::new("b", details(2, "x")),
            ReportRow::new("a", details(9, "x")),
            ReportRow::new("a", details(1, "x")),
            ReportRow::new("a", details(1, "x")),
        ]);

        let keys: Vec<_> = report
            .rows
            .iter()
            .map(|r| (r.group.as_str(), r.asn))
            .collect();
        assert_eq!(keys, vec![("a", 1), ("a", 9), ("b", 2)]);
    }

    #[test]
    fn rejects_foreign_text() {
        assert!(Report::parse("").is_err());
        assert!(Report::parse("ASN | NAME\n1 | x").is_err());
        assert!(Report::parse(&format!("{HEADER}\nonly ; three ; fields")).is_err());
    }

    #[test]
    fn json_records_use_the_header_names() {
        let row = ReportRow::new("g", details(64500, "EXAMPLE-AS"));
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["IXP"], "g");
        assert_eq!(json["ASN"], 64500);
        assert_eq!(json["AS-NAME"], "EXAMPLE-AS");
        assert_eq!(json["PeeringDB link"], "https://www.peeringdb.com/asn/64500");
    }

    #[test]
    fn report_names_drop_the_scheme() {
        assert_eq!(report_name("https://lg.ams-ix.net"), "lg.ams-ix.net");
        assert_eq!(report_name("https://example.net/alice/"), "example.net_alice");
    }
}
