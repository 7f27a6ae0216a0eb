//! `(( static_ips i j k … ))` — static address allocation from a pool.
//!
//! The call sits under a job's network entry, e.g.
//! `jobs.<job>.networks.<n>.static_ips`. The enclosing entry's `name`
//! field names a top-level network, whose `subnets[*].static` ranges
//! (single addresses or `a - b` spans) form the allocation pool. The
//! arguments are pool offsets; every allocated address is claimed in an
//! evaluation-wide set, so two jobs can never hold the same IP.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response, TrackedDependency};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::{Path, Value};
use std::net::IpAddr;

pub struct StaticIps;

impl Operator for StaticIps {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    /// Reads the pool from the top-level `networks` definitions.
    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        mut auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        let networks = Path::parse("networks").expect("static path parses");
        if !auto.iter().any(|d| d.path == networks) {
            auto.push(TrackedDependency::unconditional(networks));
        }
        auto
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let mut offsets = Vec::with_capacity(args.len());
        for arg in args {
            let value = ctx.resolve(arg)?;
            let offset = value.as_int().ok_or_else(|| {
                Error::validation(format!(
                    "static_ips offsets must be integers, got {}",
                    value.type_name()
                ))
            })?;
            if offset < 0 {
                return Err(Error::validation("static_ips offsets must be non-negative"));
            }
            offsets.push(offset as usize);
        }

        let network_name = enclosing_network_name(ctx)?;
        let needed = offsets.iter().max().map(|m| m + 1).unwrap_or(0);
        let pool = pool_for(ctx, &network_name, needed)?;

        let mut allocated = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let ip = pool.get(offset).ok_or_else(|| {
                Error::validation(format!(
                    "static_ips offset {offset} exceeds the pool of network '{network_name}' ({} address{} available)",
                    pool.len(),
                    if pool.len() == 1 { "" } else { "es" }
                ))
            })?;
            let rendered = ip.to_string();
            ctx.state.claim_static_ip(&rendered, ctx.here)?;
            allocated.push(Value::String(rendered));
        }
        Ok(Response::replace(Value::list(allocated)))
    }
}

/// The `name` of the list entry enclosing the call site.
fn enclosing_network_name(ctx: &OpContext<'_>) -> Result<String> {
    let entry = ctx.here.parent().ok_or_else(|| {
        Error::validation("static_ips must appear inside a network entry")
    })?;
    let value = entry.resolve(ctx.root)?;
    value
        .as_map()
        .and_then(|m| m.get("name"))
        .and_then(|v| v.stringify())
        .ok_or_else(|| {
            Error::validation("static_ips requires a 'name' field on the enclosing network entry")
        })
}

/// Expands the network's `subnets[*].static` ranges into at most
/// `needed` addresses, in declaration order.
fn pool_for(ctx: &OpContext<'_>, network_name: &str, needed: usize) -> Result<Vec<IpAddr>> {
    let networks_path = format!("networks.{network_name}");
    let network = Path::parse(&networks_path)?
        .resolve(ctx.root)
        .map_err(|_| {
            Error::reference(format!(
                "no top-level network named '{network_name}' defines a static pool"
            ))
        })?;
    let subnets = network
        .as_map()
        .and_then(|m| m.get("subnets"))
        .and_then(|s| s.as_list())
        .ok_or_else(|| {
            Error::validation(format!("network '{network_name}' has no subnets"))
        })?;

    let mut pool = Vec::new();
    for subnet in subnets.iter() {
        let Some(statics) = subnet.as_map().and_then(|m| m.get("static")).and_then(|s| s.as_list())
        else {
            continue;
        };
        for entry in statics.iter() {
            let text = entry.stringify().ok_or_else(|| {
                Error::validation(format!(
                    "static pool entries must be strings, got {}",
                    entry.type_name()
                ))
            })?;
            expand_range(&text, needed, &mut pool)?;
            if pool.len() >= needed {
                return Ok(pool);
            }
        }
    }
    Ok(pool)
}

/// Parses `a.b.c.d` or `a.b.c.d - a.b.c.e` and appends addresses until
/// the pool holds `needed` entries or the range is exhausted.
fn expand_range(text: &str, needed: usize, pool: &mut Vec<IpAddr>) -> Result<()> {
    let bad = |t: &str| Error::validation(format!("invalid static pool address '{t}'"));
    match text.split_once('-') {
        None => {
            let ip: IpAddr = text.trim().parse().map_err(|_| bad(text))?;
            pool.push(ip);
        }
        Some((from, to)) => {
            let from: IpAddr = from.trim().parse().map_err(|_| bad(text))?;
            let to: IpAddr = to.trim().parse().map_err(|_| bad(text))?;
            let mut current = from;
            loop {
                pool.push(current);
                if current == to || pool.len() >= needed {
                    break;
                }
                current = super::ips::ip_add(current, 1)?;
            }
        }
    }
    Ok(())
}
