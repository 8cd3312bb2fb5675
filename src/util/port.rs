//! Local endpoint allocation.

use std::net::{Ipv4Addr, TcpListener};

use url::{Host, Url};

/// Find an available TCP port on the loopback interface.
///
/// The listener is dropped before returning, so the port is only a good
/// guess: another process may grab it before the sidecar binds.
pub fn find_available_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    if port == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "unable to obtain a valid tcp port",
        ));
    }
    Ok(port)
}

/// Check that a URL points at this machine.
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
