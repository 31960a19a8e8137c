//! haproxy config rendering
//!
//! Pure function of the host list and listener ports. Output is byte-stable:
//! no timestamps, no map iteration, so two renders of the same input compare
//! equal and the reconciler can diff them byte for byte.

use crate::domain::HostSet;

/// Global settings and defaults, independent of membership
const PREAMBLE: &str = "
global
  log 127.0.0.1 local0
  log 127.0.0.1 local1 notice
  maxconn 4096
  chroot /var/lib/haproxy
  user haproxy
  group haproxy

defaults
  log global
  option dontlognull
  timeout connect 5000
  timeout client 50000
  timeout server 50000
";

/// Render the haproxy config
///
/// One TCP `listen` stanza per port, balancing `leastconn` across every host.
/// Server labels are the host's position in `hosts`, so the caller's order is
/// significant.
pub fn render(hosts: &HostSet, ports: &[u16]) -> Vec<u8> {
    let mut out = String::from(PREAMBLE);

    for port in ports {
        out.push_str(&format!("\nlisten port{} :{}\n", port, port));
        out.push_str("  mode tcp\n");
        out.push_str("  option tcplog\n");
        out.push_str("  balance leastconn\n");

        for (index, host) in hosts.iter().enumerate() {
            out.push_str(&format!("  server server-{} {}:{}\n", index, host, port));
        }
    }

    out.into_bytes()
}
