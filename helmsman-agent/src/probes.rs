use std::net::IpAddr;
use sysinfo::{Networks, System};
use tracing::debug;

/// Configured hostname, else the host's own.
pub fn probe_hostname(configured: Option<&str>) -> String {
    configured
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(System::host_name)
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn probe_os_info() -> String {
    let info = os_info::get();
    format!(
        "{} {} {}",
        info.os_type(),
        info.version(),
        std::env::consts::ARCH
    )
}

pub fn probe_cpu_model() -> String {
    let mut system = System::new();
    system.refresh_cpu_all();
    system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// GPUs visible as /dev/nvidia<N> device nodes.
pub fn probe_gpu_count() -> i64 {
    let Ok(entries) = std::fs::read_dir("/dev") else { return 0 };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix("nvidia")
                .is_some_and(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        })
        .count() as i64
}

/// The address agents advertise for inbound deploy/stop calls. A
/// configured interface wins; otherwise the first IPv4 address on a
/// non-loopback, non-container interface; otherwise the address the
/// default route toward the manager uses.
pub fn probe_ip_address(interface: Option<&str>, manager_url: &str) -> String {
    let networks = Networks::new_with_refreshed_list();

    if let Some(wanted) = interface.filter(|s| !s.is_empty()) {
        for (name, data) in &networks {
            if name == wanted {
                if let Some(ip) = first_ipv4(data) {
                    return ip.to_string();
                }
            }
        }
        debug!("Configured interface {} has no IPv4 address", wanted);
    }

    for (name, data) in &networks {
        if is_host_interface(name) {
            if let Some(ip) = first_ipv4(data) {
                return ip.to_string();
            }
        }
    }

    route_probe(manager_url).unwrap_or_else(|| "127.0.0.1".to_string())
}

fn first_ipv4(data: &sysinfo::NetworkData) -> Option<IpAddr> {
    data.ip_networks()
        .iter()
        .map(|network| network.addr)
        .find(|addr| addr.is_ipv4() && !addr.is_loopback())
}

/// Loopback and container bridges never carry the advertised address.
fn is_host_interface(name: &str) -> bool {
    name != "lo"
        && !name.starts_with("docker")
        && !name.starts_with("br-")
        && !name.starts_with("veth")
}

/// Learn the outbound address by "connecting" a UDP socket toward the
/// manager; no packet is sent.
fn route_probe(manager_url: &str) -> Option<String> {
    let target = manager_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split('/')
        .next()?;
    let target = if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:80", target)
    };

    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(&target).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}
