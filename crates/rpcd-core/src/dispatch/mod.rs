//! Per-request pipeline.
//!
//! [`Dispatcher::dispatch`] takes a parsed [`Request`] through
//! authentication, resolution, the firewall, admission checks and the
//! handlers, leaving the outcome in the request's reply slot. Every stage
//! short-circuits on failure; nothing is returned to the caller but the
//! request itself.
//!
//! Directory-wide common modules wrap the target: their firewall rules and
//! `check` run before the target's, and their `handle` runs after the
//! target's succeeded so it can augment the reply.

use std::iter;

use rpcd_types::{ErrorCode, RpcError};
use tracing::{debug, trace};

use crate::auth::AuthGate;
use crate::firewall;
use crate::module::Module;
use crate::registry::Registry;
use crate::request::Request;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes requests to modules.
///
/// Built once at startup and shared read-only between connection workers.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    auth: AuthGate,
}

impl Dispatcher {
    /// Creates a dispatcher over an initialised registry.
    #[must_use]
    pub const fn new(registry: Registry, auth: AuthGate) -> Self {
        Self { registry, auth }
    }

    /// Registry used for resolution.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Authentication stage.
    #[must_use]
    pub const fn auth(&self) -> &AuthGate {
        &self.auth
    }

    /// Runs the pipeline for one request.
    ///
    /// Requests that already carry an error, such as those a codec could not
    /// parse, are left untouched. On return the reply slot holds the result
    /// or an error; it is only empty when nothing produced output, which
    /// writers report through [`Request::final_reply`].
    pub fn dispatch(&self, request: &mut Request) {
        if request.has_error() {
            return;
        }

        if self.auth.is_enabled() {
            let Some(user) = self.auth.authenticate(request.credentials()) else {
                debug!(
                    target: DISPATCH_TARGET,
                    method = request.method(),
                    user = request.credentials().map(|c| c.user()),
                    "authentication failed"
                );
                request.set_error(RpcError::from_code(ErrorCode::AccessDenied));
                return;
            };
            request.set_user(user);
        }

        let Some(module) = self
            .registry
            .resolve(request.service(), request.method())
        else {
            debug!(
                target: DISPATCH_TARGET,
                service = request.service(),
                method = request.method(),
                "method not found"
            );
            request.set_error(RpcError::from_code(ErrorCode::MethodNotFound));
            return;
        };
        let common = self.registry.common_for(module);
        trace!(
            target: DISPATCH_TARGET,
            method = request.method(),
            module = %module.path(),
            common = common.is_some(),
            "resolved"
        );

        let stages = || common.into_iter().chain(iter::once(module));

        for stage in stages() {
            if let Err(error) = firewall::evaluate(request.params_mut(), stage.firewall()) {
                debug!(
                    target: DISPATCH_TARGET,
                    method = request.method(),
                    rule_owner = stage.name(),
                    parameter = error.data(),
                    "firewall rejected request"
                );
                request.set_error(error);
                return;
            }
        }

        for stage in stages() {
            if !stage.check(request) {
                request.fail(ErrorCode::InvalidInput);
                return;
            }
        }

        if !run_handler(module, request) {
            return;
        }
        if let Some(wrapper) = common {
            run_handler(wrapper, request);
        }
    }
}

/// Runs `module`'s handler, substituting the generic reply when it gave
/// none. Returns `false` when the handler failed.
fn run_handler(module: &Module, request: &mut Request) -> bool {
    if module.handle(request) {
        if request.reply().is_none() {
            request.set_reply(true);
        }
        true
    } else {
        debug!(
            target: DISPATCH_TARGET,
            method = request.method(),
            module = module.name(),
            "handler failed"
        );
        request.fail(ErrorCode::InternalError);
        false
    }
}
