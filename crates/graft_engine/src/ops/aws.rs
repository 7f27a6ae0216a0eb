//! `(( awsparam name ))` / `(( awssecret name ))` — AWS-backed lookups.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use crate::ops::{lookup_or_default, REDACTED};
use graft_base::{Error, ExternalSource, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Fetches a value from SSM Parameter Store.
pub struct AwsParam;

impl Operator for AwsParam {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        if ctx.options.skip_aws {
            return Ok(Response::replace(Value::String(REDACTED.to_string())));
        }
        let value = lookup_or_default(ctx, &args[0], &|name| fetch_param(ctx, name))?;
        Ok(Response::replace(value))
    }
}

fn fetch_param(ctx: &OpContext<'_>, name: &str) -> Result<String> {
    if let Some(cached) = ctx.aws_param_cached(name) {
        return Ok(cached);
    }
    let store = ctx.state.parameter_store.as_ref().ok_or_else(|| {
        Error::external(ExternalSource::Aws, "no AWS parameter store configured")
    })?;
    ctx.cancel.check()?;
    match store.fetch(name, ctx.cancel)? {
        Some(value) => {
            ctx.aws_param_remember(name, &value);
            Ok(value)
        }
        None => Err(Error::reference(format!("parameter {name} not found"))),
    }
}

/// Fetches a value from Secrets Manager.
pub struct AwsSecret;

impl Operator for AwsSecret {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        if ctx.options.skip_aws {
            return Ok(Response::replace(Value::String(REDACTED.to_string())));
        }
        let value = lookup_or_default(ctx, &args[0], &|name| fetch_secret(ctx, name))?;
        Ok(Response::replace(value))
    }
}

fn fetch_secret(ctx: &OpContext<'_>, name: &str) -> Result<String> {
    if let Some(cached) = ctx.aws_secret_cached(name) {
        return Ok(cached);
    }
    let store = ctx.state.secrets_manager.as_ref().ok_or_else(|| {
        Error::external(ExternalSource::Aws, "no AWS secrets manager configured")
    })?;
    ctx.cancel.check()?;
    match store.fetch(name, ctx.cancel)? {
        Some(value) => {
            ctx.aws_secret_remember(name, &value);
            Ok(value)
        }
        None => Err(Error::reference(format!("secret {name} not found"))),
    }
}
