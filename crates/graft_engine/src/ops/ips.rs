//! `(( ips base index [count] ))` — host address enumeration.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Enumerates addresses from an IP or CIDR base. A negative index
/// counts down from the top of a CIDR range; an optional count returns
/// a list of consecutive addresses instead of a single one.
pub struct Ips;

impl Operator for Ips {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (2, 3)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let base = ctx.resolve_string(&args[0])?;
        let index = resolve_int(ctx, &args[1])?;
        let count = match args.get(2) {
            Some(arg) => {
                let n = resolve_int(ctx, arg)?;
                if n <= 0 {
                    return Err(Error::validation("ips count must be positive"));
                }
                Some(n as usize)
            }
            None => None,
        };

        let start = if base.contains('/') {
            let network: IpNetwork = base
                .parse()
                .map_err(|e| Error::validation(format!("invalid CIDR '{base}': {e}")))?;
            let size = network_size(&network);
            let offset = if index < 0 { size + index } else { index };
            if offset < 0 || offset >= size {
                return Err(Error::validation(format!(
                    "index {index} is outside {base} ({size} addresses)"
                )));
            }
            if let Some(n) = count {
                if offset + n as i64 > size {
                    return Err(Error::validation(format!(
                        "{n} addresses from index {index} exceed {base}"
                    )));
                }
            }
            ip_add(network.network(), offset)?
        } else {
            let ip: IpAddr = base
                .parse()
                .map_err(|e| Error::validation(format!("invalid IP '{base}': {e}")))?;
            ip_add(ip, index)?
        };

        match count {
            None => Ok(Response::replace(Value::String(start.to_string()))),
            Some(n) => {
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    out.push(Value::String(ip_add(start, i as i64)?.to_string()));
                }
                Ok(Response::replace(Value::list(out)))
            }
        }
    }
}

fn resolve_int(ctx: &OpContext<'_>, arg: &Expr) -> Result<i64> {
    let value = ctx.resolve(arg)?;
    value.as_int().ok_or_else(|| {
        Error::validation(format!("expected an integer, got {}", value.type_name()))
    })
}

fn network_size(network: &IpNetwork) -> i64 {
    match network {
        IpNetwork::V4(net) => 1i64 << (32 - net.prefix()),
        // Clamp v6 sizes; offsets beyond i64 are nonsense for this use.
        IpNetwork::V6(net) => {
            let bits = 128 - net.prefix();
            if bits >= 63 {
                i64::MAX
            } else {
                1i64 << bits
            }
        }
    }
}

/// Adds a (possibly negative) offset to an address.
pub fn ip_add(ip: IpAddr, offset: i64) -> Result<IpAddr> {
    match ip {
        IpAddr::V4(v4) => {
            let base = u32::from(v4) as i64;
            let shifted = base + offset;
            if !(0..=u32::MAX as i64).contains(&shifted) {
                return Err(Error::validation(format!(
                    "address offset {offset} from {ip} leaves the IPv4 space"
                )));
            }
            Ok(IpAddr::V4((shifted as u32).into()))
        }
        IpAddr::V6(v6) => {
            let base = u128::from(v6);
            let shifted = if offset >= 0 {
                base.checked_add(offset as u128)
            } else {
                base.checked_sub(offset.unsigned_abs() as u128)
            };
            let shifted = shifted.ok_or_else(|| {
                Error::validation(format!(
                    "address offset {offset} from {ip} leaves the IPv6 space"
                ))
            })?;
            Ok(IpAddr::V6(shifted.into()))
        }
    }
}
