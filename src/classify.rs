use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressClass {
    Private,
    Public,
}

/// RFC 1918, IPv6 unique local and IPv6 link local.
const PRIVATE_PREFIXES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "fc00::/7",
    "fe80::/10",
];

static PRIVATE_NETWORKS: LazyLock<Vec<IpNetwork>> = LazyLock::new(|| {
    PRIVATE_PREFIXES
        .iter()
        .filter_map(|prefix| prefix.parse().ok())
        .collect()
});

/// Private addresses are never sent to the geolocation service.
pub fn classify(address: IpAddr) -> AddressClass {
    if let IpAddr::V6(v6) = address {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return classify(IpAddr::V4(v4));
        }
    }
    if PRIVATE_NETWORKS.iter().any(|network| network.contains(address)) {
        AddressClass::Private
    } else {
        AddressClass::Public
    }
}
