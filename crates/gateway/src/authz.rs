// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization hook for the HTTP command ingress.
//!
//! The source's `checkAuthz` is a stub that always returns `false`, which
//! makes `/router/command` unreachable past validation. This crate keeps
//! that behavior available as [`DenyAll`] but defaults the running service
//! to [`AllowAll`] (selected via `--authz-policy`), so the gateway is
//! runnable out of the box while still leaving a single seam — this trait —
//! where a real uid/device check belongs.

/// Pluggable predicate deciding whether `uid` may command `dev_id`.
pub trait AuthzPolicy: Send + Sync {
    fn check(&self, uid: &str, dev_id: &str) -> bool;
}

/// Permits every request. Default policy for a runnable gateway.
pub struct AllowAll;

impl AuthzPolicy for AllowAll {
    fn check(&self, _uid: &str, _dev_id: &str) -> bool {
        true
    }
}

/// Denies every request, matching the source's `checkAuthz` stub.
pub struct DenyAll;

impl AuthzPolicy for DenyAll {
    fn check(&self, _uid: &str, _dev_id: &str) -> bool {
        false
    }
}

/// Build the configured policy from `--authz-policy`.
pub fn from_name(name: &str) -> Box<dyn AuthzPolicy> {
    match name {
        "deny-all" => Box::new(DenyAll),
        _ => Box::new(AllowAll),
    }
}
