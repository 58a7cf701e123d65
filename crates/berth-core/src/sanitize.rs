use berth_schema::{ApiVersion, ContainerDetails};

/// Engines at or above this API version assign MAC addresses themselves and
/// reject them in a create request.
pub const MAC_ADDRESS_READ_ONLY_SINCE: ApiVersion = ApiVersion::new(1, 44);

/// Make a captured configuration acceptable to `create_container` on an engine
/// speaking `api_version`.
///
/// Below API 1.44 per-network MAC addresses are stripped. Containers on the
/// host network, or sharing another container's namespace, lose their
/// hostname, port bindings, exposed ports, and publish-all flag.
pub fn sanitize_for_recreate(details: &mut ContainerDetails, api_version: &str) {
    match api_version.parse::<ApiVersion>() {
        Ok(version) if version < MAC_ADDRESS_READ_ONLY_SINCE => {
            for endpoint in details.network_settings.networks.values_mut() {
                endpoint.mac_address.clear();
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("not stripping MAC addresses: {e}"),
    }

    let host = &details.host_config;
    if host.uses_host_network() || host.shares_network_namespace() {
        details.config.hostname.clear();
        details.config.exposed_ports = None;
        details.host_config.port_bindings = None;
        details.host_config.publish_all_ports = false;
    }
}
