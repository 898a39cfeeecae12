use std::net::{IpAddr, Ipv4Addr};

use crate::config::TrapReceiverConfig;

const TRAP_RECEIVER_PORT: &str = "TRAP_RECEIVER_PORT";

const DEFAULT_PORT: u16 = 162;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Port from the environment, falling back to `fallback`
pub fn get_port(fallback: u16) -> u16 {
    let port_from_env = std::env::var(TRAP_RECEIVER_PORT);
    port_from_env.map_or(fallback, |res| res.parse().unwrap_or(fallback))
}

const TRAP_RECEIVER_ADDR: &str = "TRAP_RECEIVER_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_default_addr() -> IpAddr {
    DEFAULT_ADDR
}

/// Address from the environment, falling back to `fallback`
pub fn get_addr(fallback: IpAddr) -> IpAddr {
    let addr_from_env = std::env::var(TRAP_RECEIVER_ADDR);
    addr_from_env.map_or(fallback, |res| res.parse().unwrap_or(fallback))
}

/// Applies the environment overrides to the listener configuration
pub fn apply_env_overrides(config: &mut TrapReceiverConfig) {
    config.address = get_addr(config.address);
    config.port = get_port(config.port);
}
