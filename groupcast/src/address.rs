//! Address/Options Facade (spec §4.C): resolves the cast address, derives
//! the local bind address, and configures the socket options required for
//! multicast group membership or broadcast.
//!
//! Out of scope per spec §1 are the primitives themselves (DNS resolution,
//! option-setting helpers) — this module is the thin facade spec.md asks
//! for, built directly on `socket2`, the crate the teacher's
//! `socket-factory` uses for the same non-blocking-socket-setup role.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::{CastMode, Config, ReuseAddressPolicy};
use crate::error::CastError;

const IPV4_BROADCAST: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// Result of step 4 (spec §4.D): a bound, non-blocking socket, not yet
/// joined to its group — that happens in a later step, after the
/// `prepare-connect` listener has had a chance to veto.
pub struct BoundSocket {
    pub socket: Socket,
    pub cast_addr: SocketAddr,
    pub local_addr: SocketAddr,
    cast_ip: IpAddr,
    bind_ip: IpAddr,
}

/// Resolves `remote:port` (substituting the broadcast literal if empty and
/// `cast_mode == Broadcast`), validates address-family agreement with
/// `bind`, creates and binds the socket. Does not join the group or enable
/// broadcast yet — spec §4.D step 4.
pub fn create_and_bind(
    cfg: &Config,
    remote: &str,
    port: u16,
    bind: Option<SocketAddr>,
) -> Result<BoundSocket, CastError> {
    // A broadcast bind to an IPv6 address is rejected outright: there is no
    // IPv6 broadcast literal to substitute, and the bind family alone
    // already settles the question before resolving `remote`.
    if cfg.cast_mode() == CastMode::Broadcast && bind.is_some_and(|b| b.is_ipv6()) {
        return Err(CastError::ProtocolNotSupported);
    }

    let cast_ip = resolve_cast_ip(cfg, remote)?;
    let cast_addr = SocketAddr::new(cast_ip, port);

    if cfg.cast_mode() == CastMode::Broadcast && cast_ip.is_ipv6() {
        return Err(CastError::ProtocolNotSupported);
    }

    if let Some(bind_addr) = bind {
        if bind_addr.is_ipv4() != cast_addr.is_ipv4() {
            return Err(CastError::AddressFamilyNotSupported);
        }
    }

    let bind_addr = bind.unwrap_or_else(|| wildcard_for(cast_addr, port));

    let domain = if cast_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(CastError::SocketCreate)?;
    socket.set_nonblocking(true).map_err(CastError::SocketCreate)?;

    apply_reuse_policy(&socket, cfg.reuse_address_policy)?;
    disable_connection_reset(&socket);

    socket
        .bind(&SockAddr::from(bind_addr))
        .map_err(CastError::SocketBind)?;

    let local_addr = socket
        .local_addr()
        .ok()
        .and_then(|a| a.as_socket())
        .unwrap_or(bind_addr);

    Ok(BoundSocket {
        socket,
        cast_addr,
        local_addr,
        cast_ip,
        bind_ip: bind_addr.ip(),
    })
}

/// Group join / broadcast enable — spec §4.D step 6, run only after the
/// `prepare-connect` listener has approved the socket.
pub fn configure_cast(
    bound: &BoundSocket,
    cfg: &Config,
    source: Option<IpAddr>,
) -> Result<(), CastError> {
    match cfg.cast_mode() {
        CastMode::Multicast => {
            join_multicast(&bound.socket, cfg, bound.cast_ip, bound.bind_ip, source)
        }
        CastMode::Broadcast => bound
            .socket
            .set_broadcast(true)
            .map_err(CastError::SocketPrepare),
    }
}

fn resolve_cast_ip(cfg: &Config, remote: &str) -> Result<IpAddr, CastError> {
    if remote.is_empty() {
        return if cfg.cast_mode() == CastMode::Broadcast {
            Ok(IpAddr::V4(IPV4_BROADCAST))
        } else {
            Err(CastError::InvalidParam("remote host is empty"))
        };
    }

    if let Ok(ip) = remote.parse::<IpAddr>() {
        return Ok(ip);
    }

    // Hostname: resolve via the platform resolver, port is irrelevant here.
    (remote, 0u16)
        .to_socket_addrs()
        .map_err(|_| CastError::InvalidParam("failed to resolve remote host"))?
        .next()
        .map(|a| a.ip())
        .ok_or(CastError::InvalidParam("remote host resolved to no addresses"))
}

fn wildcard_for(cast_addr: SocketAddr, port: u16) -> SocketAddr {
    if cast_addr.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), port)
    }
}

fn apply_reuse_policy(socket: &Socket, policy: ReuseAddressPolicy) -> Result<(), CastError> {
    match policy {
        ReuseAddressPolicy::None => {}
        ReuseAddressPolicy::AddrOnly => {
            socket.set_reuse_address(true).map_err(CastError::SocketPrepare)?;
        }
        ReuseAddressPolicy::AddrAndPort => {
            socket.set_reuse_address(true).map_err(CastError::SocketPrepare)?;
            #[cfg(unix)]
            socket.set_reuse_port(true).map_err(CastError::SocketPrepare)?;
        }
    }
    Ok(())
}

/// Disables UDP connection-reset semantics. The original targets
/// `SIO_UDP_CONNRESET` (Windows only surfaces spurious `ECONNRESET` on
/// unconnected UDP sockets in response to unreachable-port ICMP); POSIX
/// sockets have no equivalent option, so this is a no-op there. The
/// platform-specific ioctl plumbing itself is out of scope per spec §1
/// ("option-setting helpers" are an external collaborator).
fn disable_connection_reset(_socket: &Socket) {}

fn join_multicast(
    socket: &Socket,
    cfg: &Config,
    group: IpAddr,
    bind_ip: IpAddr,
    source: Option<IpAddr>,
) -> Result<(), CastError> {
    match (group, bind_ip, source) {
        (IpAddr::V4(group), IpAddr::V4(iface), Some(IpAddr::V4(src))) => {
            socket
                .join_ssm_v4(&src, &group, &iface)
                .map_err(CastError::SocketPrepare)?;
        }
        (IpAddr::V4(group), IpAddr::V4(iface), _) => {
            socket
                .join_multicast_v4(&group, &iface)
                .map_err(CastError::SocketPrepare)?;
        }
        (IpAddr::V6(group), _, _) => {
            socket
                .join_multicast_v6(&group, 0)
                .map_err(CastError::SocketPrepare)?;
        }
        _ => return Err(CastError::AddressFamilyNotSupported),
    }

    socket
        .set_multicast_ttl_v4(u32::from(cfg_ttl(cfg)))
        .or_else(|_| socket.set_multicast_hops_v6(u32::from(cfg_ttl(cfg))))
        .map_err(CastError::SocketPrepare)?;

    socket
        .set_multicast_loop_v4(cfg.multicast_loop)
        .or_else(|_| socket.set_multicast_loop_v6(cfg.multicast_loop))
        .map_err(CastError::SocketPrepare)?;

    Ok(())
}

fn cfg_ttl(cfg: &Config) -> u8 {
    cfg.multicast_ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_remote_substitutes_broadcast_literal() {
        let mut cfg = Config::new();
        cfg.set_cast_mode(true, CastMode::Broadcast).unwrap();
        let ip = resolve_cast_ip(&cfg, "").unwrap();
        assert_eq!(ip, IpAddr::V4(IPV4_BROADCAST));
    }

    #[test]
    fn empty_remote_multicast_is_invalid() {
        let cfg = Config::new();
        assert!(resolve_cast_ip(&cfg, "").is_err());
    }

    #[test]
    fn dotted_quad_parses_without_resolution() {
        let cfg = Config::new();
        let ip = resolve_cast_ip(&cfg, "239.0.0.1").unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(239, 0, 0, 1)));
    }

    #[test]
    fn broadcast_on_ipv6_bind_is_rejected_before_resolving_remote() {
        let mut cfg = Config::new();
        cfg.set_cast_mode(true, CastMode::Broadcast).unwrap();
        let bind: SocketAddr = (std::net::Ipv6Addr::UNSPECIFIED, 0).into();
        let err = create_and_bind(&cfg, "", 9000, Some(bind)).unwrap_err();
        assert!(matches!(err, CastError::ProtocolNotSupported));
    }

    #[test]
    fn wildcard_matches_cast_family() {
        let v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 0, 0, 1)), 9000);
        assert!(wildcard_for(v4, 9000).is_ipv4());
    }
}
