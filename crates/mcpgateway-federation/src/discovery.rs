//! mDNS announcement of this gateway.
//!
//! Announces `_mcp._tcp.local.` with version and tenant-hint TXT
//! attributes so peers on the local segment can offer this gateway to
//! their admins. Discovered peers are never auto-registered.

use crate::{FederationError, FederationResult};
use tracing::info;

/// Service type announced and browsed
pub const SERVICE_TYPE: &str = "_mcp._tcp";

/// Keeps the mDNS responder alive for the lifetime of the process.
pub struct MdnsAnnouncer {
    _responder: libmdns::Responder,
    _service: libmdns::Service,
}

impl MdnsAnnouncer {
    /// Announce this gateway on the local segment.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Discovery` when the responder cannot
    /// bind.
    pub fn announce(
        instance_name: &str,
        port: u16,
        version: &str,
        tenant_hint: Option<&str>,
    ) -> FederationResult<Self> {
        let responder = libmdns::Responder::new()
            .map_err(|e| FederationError::Discovery(e.to_string()))?;
        let version_txt = format!("version={version}");
        let tenant_txt = tenant_hint.map(|hint| format!("tenant_hint={hint}"));
        let mut txt: Vec<&str> = vec![&version_txt];
        if let Some(tenant) = &tenant_txt {
            txt.push(tenant);
        }
        let service = responder.register(SERVICE_TYPE.to_string(), instance_name.to_string(), port, &txt);
        info!(
            instance = instance_name,
            port,
            addresses = %advertised_addresses(),
            "announced gateway via mDNS"
        );
        Ok(Self {
            _responder: responder,
            _service: service,
        })
    }
}

/// The non-loopback addresses peers can reach this announcement on.
fn advertised_addresses() -> String {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            let addresses: Vec<String> = interfaces
                .iter()
                .filter(|interface| !interface.is_loopback())
                .map(|interface| interface.addr.ip().to_string())
                .collect();
            if addresses.is_empty() {
                "none".to_string()
            } else {
                addresses.join(",")
            }
        }
        Err(_) => "unknown".to_string(),
    }
}
