// SPDX-License-Identifier: MIT OR Apache-2.0
//! Target expansion: single addresses and IPv4 CIDR blocks.

use dm_error::MeshError;
use std::net::Ipv4Addr;

/// Expand a target expression into host addresses.
///
/// Accepts a bare IPv4 address (`10.0.0.5`), a hostname, or an IPv4 CIDR
/// block (`172.28.0.0/28`). CIDR expansion skips the network and
/// broadcast addresses and is capped by `max_hosts`.
pub fn expand_target(target: &str, max_hosts: usize) -> Result<Vec<String>, MeshError> {
    let Some((base, prefix)) = target.split_once('/') else {
        return Ok(vec![target.to_string()]);
    };

    let base: Ipv4Addr = base
        .parse()
        .map_err(|_| MeshError::validation(format!("invalid CIDR base: {target}")))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| MeshError::validation(format!("invalid CIDR prefix: {target}")))?;
    if prefix > 32 {
        return Err(MeshError::validation(format!("invalid CIDR prefix: {target}")));
    }

    let base = u32::from(base);
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = base & mask;
    let size = 1u64 << (32 - prefix);

    let mut hosts = Vec::new();
    for offset in 0..size {
        let addr = network.wrapping_add(offset as u32);
        // Skip network and broadcast for blocks that have them.
        if size > 2 && (offset == 0 || offset == size - 1) {
            continue;
        }
        hosts.push(Ipv4Addr::from(addr).to_string());
        if hosts.len() >= max_hosts {
            break;
        }
    }
    Ok(hosts)
}

/// Expand a list of target expressions, preserving order and the cap.
pub fn expand_targets(targets: &[String], max_hosts: usize) -> Result<Vec<String>, MeshError> {
    let mut all = Vec::new();
    for target in targets {
        let remaining = max_hosts.saturating_sub(all.len());
        if remaining == 0 {
            break;
        }
        all.extend(expand_target(target, remaining)?);
    }
    Ok(all)
}
