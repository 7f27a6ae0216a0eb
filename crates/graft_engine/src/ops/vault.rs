//! `(( vault segments… ))` / `(( vault-try paths… default ))` — secret
//! store lookups.
//!
//! A vault reference has the shape `mount/path:key`. `vault` joins its
//! stringified arguments into one reference; alternation groups arrive
//! as nested `vault` calls, so `(( vault "a:b" || "default" ))` tries
//! the lookup and falls back to the literal. `vault-try` spells the same
//! idea with an explicit argument list: one or more candidate paths
//! followed by a mandatory default.
//!
//! Lookups consult the evaluation-scoped cache first and register every
//! reference they touch. With `skip_vault` set, both operators emit the
//! literal `REDACTED` without talking to any store.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use crate::ops::REDACTED;
use graft_base::{Error, ExternalSource, Result};
use graft_lang::Expr;
use graft_system::secrets::split_reference;
use graft_tree::Value;
use log::debug;

/// Fetches `mount/path:key` from the configured secret store.
pub struct Vault;

impl Operator for Vault {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        // With an alternation argument, the first branch is the lookup
        // and later plain branches are defaults; nested vault calls in
        // any branch perform their own lookup.
        if args.len() == 1 {
            if let Expr::Alternation { .. } = &args[0] {
                let value =
                    crate::ops::lookup_or_default(ctx, &args[0], &|reference| {
                        lookup(ctx, reference)
                    })?;
                return Ok(Response::replace(value));
            }
        }

        let mut reference = String::new();
        for arg in args {
            reference.push_str(&ctx.resolve_string(arg)?);
        }
        let value = lookup(ctx, &reference)?;
        Ok(Response::replace(Value::String(value)))
    }
}

/// Tries each candidate path in order, falling back to the mandatory
/// final default.
pub struct VaultTry;

impl Operator for VaultTry {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (2, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        if ctx.options.skip_vault {
            return Ok(Response::replace(Value::String(REDACTED.to_string())));
        }
        let (default, candidates) = args.split_last().expect("arity enforces >= 2");
        for candidate in candidates {
            let reference = match ctx.resolve_string(candidate) {
                Ok(reference) => reference,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => continue,
            };
            match lookup(ctx, &reference) {
                Ok(value) => return Ok(Response::replace(Value::String(value))),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => debug!("vault-try: {reference}: {}", e.message),
            }
        }
        Ok(Response::replace(ctx.resolve(default)?))
    }
}

fn lookup(ctx: &OpContext<'_>, reference: &str) -> Result<String> {
    ctx.state.track_vault_ref(reference);
    if ctx.options.skip_vault {
        return Ok(REDACTED.to_string());
    }

    let Some((mount, path, key)) = split_reference(reference) else {
        return Err(Error::validation(format!(
            "invalid vault reference '{reference}' (expected mount/path:key)"
        )));
    };

    if let Some(cached) = ctx.vault_cached(reference) {
        return Ok(cached);
    }

    let store = ctx.state.secret_store.as_ref().ok_or_else(|| {
        Error::external(ExternalSource::Vault, "no vault client configured")
    })?;

    ctx.cancel.check()?;
    match store.lookup(mount, path, key, ctx.cancel)? {
        Some(value) => {
            ctx.vault_remember(reference, &value);
            Ok(value)
        }
        None => Err(Error::reference(format!("secret {reference} not found"))),
    }
}
