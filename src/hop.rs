use crate::classify::{classify, AddressClass};
use itertools::Itertools;
use std::net::IpAddr;

/// Punctuation that traceroute output wraps around addresses, e.g. `host (10.0.0.1)`.
const ADDRESS_WRAPPERS: &[char] = &['(', ')', '[', ']', ','];

/// One address found in the input, tied back to the line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HopRecord {
    pub index: u32,
    pub address: IpAddr,
    pub source_line: usize,
}

/// Returns the explicit hop number a line starts with.
///
/// A line has one when it begins (after optional whitespace) with a run of
/// digits followed by at least one whitespace character.
pub fn hop_index(line: &str) -> Option<u32> {
    let rest = line.trim_start();
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || !rest[digits..].starts_with(char::is_whitespace) {
        return None;
    }
    rest[..digits].parse().ok()
}

/// Hop number for the line at `position`: explicit if present, 1-based position otherwise.
pub fn line_index(line: &str, position: usize) -> u32 {
    hop_index(line).unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX))
}

fn parse_address(token: &str) -> Option<IpAddr> {
    token.trim_matches(ADDRESS_WRAPPERS).parse().ok()
}

/// Splits raw input into lines. Invalid UTF-8 is replaced rather than rejected.
pub fn split_lines(input: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(input)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Extracts every address literal from `lines`, in line order then token order.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Vec<HopRecord> {
    lines
        .iter()
        .enumerate()
        .flat_map(|(source_line, line)| {
            let line = line.as_ref();
            let index = line_index(line, source_line);
            line.split_whitespace()
                .filter_map(parse_address)
                .map(move |address| HopRecord {
                    index,
                    address,
                    source_line,
                })
        })
        .collect()
}

/// Public addresses that need a lookup, deduplicated in first-seen order.
pub fn query_addresses(records: &[HopRecord]) -> Vec<IpAddr> {
    records
        .iter()
        .map(|record| record.address)
        .filter(|address| classify(*address) == AddressClass::Public)
        .unique()
        .collect()
}
