use crate::geo::GeoInfo;
use crate::hop::{line_index, HopRecord};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::net::IpAddr;

/// Placed between the padded line and its annotation.
pub const SEPARATOR: &str = "    # ";

/// Annotation for hops whose address has no geolocation entry.
pub const FALLBACK: &str = "Private IP - Local";

const RULE_WIDTH: usize = 63;
const MISSING: &str = "-";

/// Length of the longest line, in characters.
pub fn longest_line<S: AsRef<str>>(lines: &[S]) -> usize {
    lines
        .iter()
        .map(|line| line.as_ref().chars().count())
        .max()
        .unwrap_or(0)
}

/// Reproduces `lines` with `<city> - <country>` appended to every line that
/// produced a hop record, aligned one column past the longest line.
///
/// Lines without a record come back unchanged.
pub fn annotate<S: AsRef<str>>(
    lines: &[S],
    records: &[HopRecord],
    geo: &HashMap<IpAddr, GeoInfo>,
) -> Vec<String> {
    let longest = longest_line(lines);
    lines
        .iter()
        .enumerate()
        .map(|(position, line)| {
            let line = line.as_ref();
            let Some(record) = line_record(line, position, records) else {
                return line.to_string();
            };
            let label = geo
                .get(&record.address)
                .map(GeoInfo::label)
                .unwrap_or_else(|| FALLBACK.to_string());
            let padding = " ".repeat(longest - line.chars().count());
            format!("{line}{padding}{SEPARATOR}{label}")
        })
        .collect()
}

/// The record that speaks for a line: first one carrying the line's hop index,
/// else the first one from that line at all.
fn line_record<'a>(
    line: &str,
    position: usize,
    records: &'a [HopRecord],
) -> Option<&'a HopRecord> {
    let index = line_index(line, position);
    let mut on_line = records.iter().filter(|r| r.source_line == position);
    let first = on_line.clone().next()?;
    Some(on_line.find(|r| r.index == index).unwrap_or(first))
}

fn rule<W: Write>(writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "{}", "-".repeat(RULE_WIDTH))
}

fn country_with_flag(country: &str) -> String {
    match country_emoji::flag(country) {
        Some(flag) => format!("{country} {flag}"),
        None => country.to_string(),
    }
}

/// One record per hop index, ascending.
///
/// A later line reusing a hop index replaces the earlier one, so the address
/// in a `traceroute to host (ip)` banner gives way to the real first hop.
/// Within a line the first address counts.
pub fn report_hops(records: &[HopRecord]) -> Vec<&HopRecord> {
    records
        .iter()
        .sorted_by_key(|r| r.index)
        .chunk_by(|r| r.index)
        .into_iter()
        .filter_map(|(_, hop)| {
            let hop: Vec<&HopRecord> = hop.collect();
            let last_line = hop.last()?.source_line;
            hop.into_iter().find(|r| r.source_line == last_line)
        })
        .collect()
}

/// Dump every field of every hop, ordered by hop index.
pub fn write_report<W: Write>(
    records: &[HopRecord],
    geo: &HashMap<IpAddr, GeoInfo>,
    mut writer: W,
) -> std::io::Result<()> {
    for record in report_hops(records) {
        rule(&mut writer)?;
        writeln!(writer, "Hop {} IP: {}", record.index, record.address)?;
        rule(&mut writer)?;

        let fields = match geo.get(&record.address) {
            Some(info) => [
                ("Hostname", info.hostname.clone()),
                ("Anycast", info.anycast.to_string()),
                ("City", info.city.clone()),
                ("Region", info.region.clone()),
                ("Country", country_with_flag(&info.country)),
                ("Location", info.loc.clone()),
                ("Organization", info.org.clone()),
                ("Postal", info.postal.clone()),
                ("Timezone", info.timezone.clone()),
            ],
            None => [
                ("Hostname", MISSING.to_string()),
                ("Anycast", false.to_string()),
                ("City", MISSING.to_string()),
                ("Region", MISSING.to_string()),
                ("Country", MISSING.to_string()),
                ("Location", MISSING.to_string()),
                ("Organization", MISSING.to_string()),
                ("Postal", MISSING.to_string()),
                ("Timezone", MISSING.to_string()),
            ],
        };
        for (name, value) in fields {
            writeln!(writer, "{name}: {value}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Generate the full report to a string
pub fn report_string(records: &[HopRecord], geo: &HashMap<IpAddr, GeoInfo>) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_report(records, geo, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[derive(Serialize)]
struct HopEntry<'a> {
    hop: u32,
    ip: IpAddr,
    geo: Option<&'a GeoInfo>,
}

/// Same content as the full report, as a JSON array.
pub fn write_json<W: Write>(
    records: &[HopRecord],
    geo: &HashMap<IpAddr, GeoInfo>,
    writer: W,
) -> serde_json::Result<()> {
    let entries: Vec<HopEntry> = report_hops(records)
        .into_iter()
        .map(|record| HopEntry {
            hop: record.index,
            ip: record.address,
            geo: geo.get(&record.address),
        })
        .collect();
    serde_json::to_writer_pretty(writer, &entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hop::parse;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn geo_of(entries: &[(&str, &str, &str)]) -> HashMap<IpAddr, GeoInfo> {
        entries
            .iter()
            .map(|(addr, city, country)| {
                (
                    ip(addr),
                    GeoInfo {
                        ip: addr.to_string(),
                        city: city.to_string(),
                        country: country.to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_longest_line() {
        assert_eq!(longest_line::<&str>(&[]), 0);
        assert_eq!(longest_line(&["abc", "", "abcdef"]), 6);
    }

    #[test]
    fn test_padding_aligns_markers() {
        let lines = ["1.1.1.1", "10 8.8.8.8 x"];
        let geo = geo_of(&[("1.1.1.1", "Sydney", "AU"), ("8.8.8.8", "Mountain View", "US")]);
        let out = annotate(&lines, &parse(&lines), &geo);
        assert_eq!(out[0], "1.1.1.1         # Sydney - AU");
        assert_eq!(out[1], "10 8.8.8.8 x    # Mountain View - US");
        assert_eq!(out[0].find('#'), out[1].find('#'));
    }

    #[test]
    fn test_unresolved_hop_uses_fallback() {
        let lines = ["1 8.8.8.8"];
        let out = annotate(&lines, &parse(&lines), &HashMap::new());
        assert_eq!(out, vec!["1 8.8.8.8    # Private IP - Local"]);
    }

    #[test]
    fn test_line_without_record_is_verbatim() {
        let lines = ["traceroute to example.com, 30 hops max  ", " 2  * * *", "1 8.8.8.8"];
        let out = annotate(&lines, &parse(&lines), &HashMap::new());
        assert_eq!(out[0], lines[0]);
        assert_eq!(out[1], lines[1]);
        assert_eq!(out.len(), lines.len());
    }

    #[test]
    fn test_first_address_on_line_wins() {
        let lines = ["3 8.8.8.8 1.1.1.1"];
        let geo = geo_of(&[("8.8.8.8", "Mountain View", "US"), ("1.1.1.1", "Sydney", "AU")]);
        let out = annotate(&lines, &parse(&lines), &geo);
        assert_eq!(out[0], "3 8.8.8.8 1.1.1.1    # Mountain View - US");
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let lines = ["1 10.0.0.1", "2 8.8.8.8", "garbage"];
        let records = parse(&lines);
        let geo = geo_of(&[("8.8.8.8", "Mountain View", "US")]);
        assert_eq!(
            annotate(&lines, &records, &geo),
            annotate(&lines, &records, &geo)
        );
    }

    #[test]
    fn test_report_orders_by_hop_and_fills_placeholders() {
        let lines = ["5 1.1.1.1", "2 8.8.8.8"];
        let mut geo = geo_of(&[("8.8.8.8", "Mountain View", "US")]);
        geo.get_mut(&ip("8.8.8.8")).unwrap().anycast = true;
        let report = report_string(&parse(&lines), &geo);

        let hop2 = report.find("Hop 2 IP: 8.8.8.8").unwrap();
        let hop5 = report.find("Hop 5 IP: 1.1.1.1").unwrap();
        assert!(hop2 < hop5);

        let expected_tail = "\
---------------------------------------------------------------
Hop 5 IP: 1.1.1.1
---------------------------------------------------------------
Hostname: -
Anycast: false
City: -
Region: -
Country: -
Location: -
Organization: -
Postal: -
Timezone: -

";
        assert!(report.ends_with(expected_tail));
        assert!(report.contains("Anycast: true\nCity: Mountain View\n"));
        assert!(report.contains("Country: US"));
    }

    #[test]
    fn test_report_has_one_block_per_hop() {
        let lines = [
            "traceroute to dns.google (8.8.8.8), 30 hops max, 60 byte packets",
            " 1  _gateway (192.168.0.1)  0.512 ms",
            " 2  dns.google (8.8.8.8)  11.2 ms",
        ];
        let report = report_string(&parse(&lines), &HashMap::new());
        let headers: Vec<&str> = report.lines().filter(|l| l.starts_with("Hop ")).collect();
        assert_eq!(headers, ["Hop 1 IP: 192.168.0.1", "Hop 2 IP: 8.8.8.8"]);
    }

    #[test]
    fn test_report_hops_first_address_of_last_line() {
        let records = parse(&["4 1.1.1.1 9.9.9.9", "4 8.8.8.8 8.8.4.4", "3 10.0.0.1"]);
        let hops: Vec<(u32, IpAddr)> = report_hops(&records)
            .into_iter()
            .map(|r| (r.index, r.address))
            .collect();
        assert_eq!(hops, [(3, ip("10.0.0.1")), (4, ip("8.8.8.8"))]);
    }

    #[test]
    fn test_json_skips_banner_address() {
        let lines = ["traceroute to 8.8.8.8 (8.8.8.8)", "1 10.0.0.1"];
        let mut buf = Vec::new();
        write_json(&parse(&lines), &HashMap::new(), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
        assert_eq!(value[0]["ip"], "10.0.0.1");
    }

    #[test]
    fn test_report_field_order() {
        let lines = ["8.8.8.8"];
        let report = report_string(&parse(&lines), &geo_of(&[("8.8.8.8", "X", "")]));
        let names: Vec<&str> = report
            .lines()
            .filter_map(|l| l.split_once(": ").map(|(name, _)| name))
            .filter(|name| !name.starts_with("Hop"))
            .collect();
        assert_eq!(
            names,
            [
                "Hostname",
                "Anycast",
                "City",
                "Region",
                "Country",
                "Location",
                "Organization",
                "Postal",
                "Timezone"
            ]
        );
    }

    #[test]
    fn test_json_output() {
        let lines = ["2 8.8.8.8", "1 192.168.1.1"];
        let mut geo = geo_of(&[("8.8.8.8", "Mountain View", "US")]);
        geo.insert(ip("192.168.1.1"), GeoInfo::private(ip("192.168.1.1")));
        let records = parse(&[lines[0], lines[1], "3 9.9.9.9"]);

        let mut buf = Vec::new();
        write_json(&records, &geo, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(value[0]["hop"], 1);
        assert_eq!(value[0]["geo"]["city"], "Local");
        assert_eq!(value[1]["ip"], "8.8.8.8");
        assert_eq!(value[1]["geo"]["country"], "US");
        assert_eq!(value[2]["hop"], 3);
        assert!(value[2]["geo"].is_null());
    }
}
