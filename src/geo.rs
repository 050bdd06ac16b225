use crate::classify::{classify, AddressClass};
use crate::hop::{query_addresses, HopRecord};
use crate::validation::Token;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

pub const API_URL: &str = "https://ipinfo.io";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Geolocation and ownership data for one address, as returned by ipinfo.io.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoInfo {
    pub ip: String,
    pub hostname: String,
    pub anycast: bool,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    pub org: String,
    pub postal: String,
    pub timezone: String,
}

impl GeoInfo {
    /// Placeholder used for private addresses instead of querying.
    pub fn private(ip: IpAddr) -> Self {
        Self {
            ip: ip.to_string(),
            city: "Local".to_string(),
            ..Default::default()
        }
    }

    /// `<city> - <country>`, as appended to annotated lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.city, self.country)
    }

    fn sanitized(self) -> Self {
        Self {
            ip: sanitize_display(&self.ip),
            hostname: sanitize_display(&self.hostname),
            anycast: self.anycast,
            city: sanitize_display(&self.city),
            region: sanitize_display(&self.region),
            country: sanitize_display(&self.country),
            loc: sanitize_display(&self.loc),
            org: sanitize_display(&self.org),
            postal: sanitize_display(&self.postal),
            timezone: sanitize_display(&self.timezone),
        }
    }
}

/// Strip control characters so API data cannot inject terminal escape sequences.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}

/// Anything that can geolocate a batch of public addresses.
///
/// Addresses that fail to resolve are left out of the returned map.
pub trait LookupBatch {
    fn lookup_batch(&self, addresses: &[IpAddr]) -> HashMap<IpAddr, GeoInfo>;
}

/// Resolves nothing. Used when the input has no public addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl LookupBatch for Offline {
    fn lookup_batch(&self, _addresses: &[IpAddr]) -> HashMap<IpAddr, GeoInfo> {
        HashMap::new()
    }
}

/// Builds the address to `GeoInfo` map for a set of hop records.
///
/// Private addresses get the `Local` placeholder, public ones are looked up
/// once each through `lookup`.
pub fn resolve<L: LookupBatch + ?Sized>(
    records: &[HopRecord],
    lookup: &L,
) -> HashMap<IpAddr, GeoInfo> {
    let mut geo: HashMap<IpAddr, GeoInfo> = records
        .iter()
        .map(|record| record.address)
        .filter(|address| classify(*address) == AddressClass::Private)
        .map(|address| (address, GeoInfo::private(address)))
        .collect();

    let public = query_addresses(records);
    if public.is_empty() {
        return geo;
    }

    debug!(count = public.len(), "looking up public addresses");
    let found = lookup.lookup_batch(&public);
    debug!(resolved = found.len(), "lookup finished");
    for address in public {
        if let Some(info) = found.get(&address) {
            geo.insert(address, info.clone());
        }
    }
    geo
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IP query failed, http status: {0}")]
    Status(StatusCode),
    #[error("can not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Turns one ipinfo.io response into a `GeoInfo`. Anything but 200 is a miss.
pub fn decode_response(status: StatusCode, body: &str) -> Result<GeoInfo, LookupError> {
    if status != StatusCode::OK {
        return Err(LookupError::Status(status));
    }
    let info: GeoInfo = serde_json::from_str(body)?;
    Ok(info.sanitized())
}

/// Blocking ipinfo.io client.
pub struct IpInfoClient {
    client: Client,
    base_url: String,
    token: Token,
}

impl IpInfoClient {
    pub fn new(token: Token) -> Result<Self, LookupError> {
        Self::with_base_url(token, API_URL)
    }

    pub fn with_base_url(token: Token, base_url: impl Into<String>) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("trace-to-geo/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    pub fn endpoint(&self, ip: IpAddr) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), ip)
    }

    pub fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, LookupError> {
        let response = self
            .client
            .get(self.endpoint(ip))
            .query(&[("token", self.token.token())])
            .send()?;
        let status = response.status();
        let body = response.text()?;
        decode_response(status, &body)
    }
}

impl LookupBatch for IpInfoClient {
    fn lookup_batch(&self, addresses: &[IpAddr]) -> HashMap<IpAddr, GeoInfo> {
        let mut results = HashMap::with_capacity(addresses.len());
        for &ip in addresses {
            match self.lookup(ip) {
                Ok(info) => {
                    debug!(%ip, city = %info.city, country = %info.country, "resolved");
                    results.insert(ip, info);
                }
                Err(err) => warn!(%ip, "{err}"),
            }
        }
        results
    }
}
