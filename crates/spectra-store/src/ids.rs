//! Deterministic record-id construction for every entity kind (§4.4).
//!
//! Record ids are opaque strings from the caller's point of view, but
//! deterministic from identity so that `RelateOnce` and repeated upserts can
//! be expressed without a round-trip lookup first.

use spectra_core::Protocol;

/// `host:<ip>`.
#[must_use]
pub fn host_id(ip: &str) -> String {
    format!("host:{ip}")
}

/// `port:<host>:<number>:<protocol>`.
#[must_use]
pub fn port_id(host: &str, number: u16, protocol: Protocol) -> String {
    format!("port:{host}:{number}:{}", protocol_str(protocol))
}

/// `service:<fingerprint>`.
#[must_use]
pub fn service_id(fingerprint: &str) -> String {
    format!("service:{fingerprint}")
}

/// `banner:<hash>`.
#[must_use]
pub fn banner_id(hash: &str) -> String {
    format!("banner:{hash}")
}

/// `tls_cert:<sha256>`.
#[must_use]
pub fn tls_cert_id(sha256: &str) -> String {
    format!("tls_cert:{sha256}")
}

/// `vuln:<cve_id>`.
#[must_use]
pub fn vuln_id(cve_id: &str) -> String {
    format!("vuln:{cve_id}")
}

/// `vuln_doc:<cve_id>`.
#[must_use]
pub fn vuln_doc_id(cve_id: &str) -> String {
    format!("vuln_doc:{cve_id}")
}

/// `city:<name>:<country_cc>`.
#[must_use]
pub fn city_id(name: &str, country_cc: &str) -> String {
    format!("city:{name}:{country_cc}")
}

/// `region:<name>:<country_cc>`.
#[must_use]
pub fn region_id(name: &str, country_cc: &str) -> String {
    format!("region:{name}:{country_cc}")
}

/// `country:<cc>`.
#[must_use]
pub fn country_id(cc: &str) -> String {
    format!("country:{cc}")
}

/// `asn:<number>`.
#[must_use]
pub fn asn_id(number: u32) -> String {
    format!("asn:{number}")
}

/// `cloud_region:<tag>`.
#[must_use]
pub fn cloud_region_id(tag: &str) -> String {
    format!("cloud_region:{tag}")
}

/// `common_port:<number>:<protocol>`.
#[must_use]
pub fn common_port_id(number: u16, protocol: Protocol) -> String {
    format!("common_port:{number}:{}", protocol_str(protocol))
}

fn protocol_str(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
    }
}
