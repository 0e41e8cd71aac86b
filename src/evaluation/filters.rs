//! Filter predicates and the registry that maps filter names to them.
//!
//! Every filter reads its own parameters and decides what a missing one means.
//! A parameter of the wrong shape is reported as a [`FilterError`] so the
//! manager can count that filter as not matching without giving up on the rest
//! of the chain.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

use super::{FeatureContext, ParamValue, Parameters};
use crate::error::FilterError;

pub const ALWAYS_ON: &str = "AlwaysOn";
pub const PERCENTAGE: &str = "Percentage";
pub const ROLE_BASED: &str = "RoleBased";
pub const TIME_BASED: &str = "TimeBased";
pub const TARGETING: &str = "Targeting";
pub const ROLE_AND_PERMISSION: &str = "RoleAndPermission";

pub trait FeatureFilter: Send + Sync {
    fn evaluate(&self, ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError>;
}

impl<F> FeatureFilter for F
where
    F: Fn(&FeatureContext, &Parameters) -> bool + Send + Sync,
{
    fn evaluate(&self, ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        Ok(self(ctx, params))
    }
}

#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn FeatureFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in filters.
    pub fn builtin() -> Self {
        Self::new()
            .register(ALWAYS_ON, AlwaysOnFilter)
            .register(PERCENTAGE, PercentageFilter)
            .register(ROLE_BASED, RoleBasedFilter)
            .register(TIME_BASED, TimeBasedFilter)
            .register(TARGETING, TargetingFilter)
    }

    /// Adds a filter, replacing any filter already registered under `name`.
    pub fn register(mut self, name: impl Into<String>, filter: impl FeatureFilter + 'static) -> Self {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn FeatureFilter> {
        self.filters.get(name).map(|f| &**f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

// Fallback used by the default manager for unregistered filter names
pub struct AlwaysOffFilter;

impl FeatureFilter for AlwaysOffFilter {
    fn evaluate(&self, _ctx: &FeatureContext, _params: &Parameters) -> Result<bool, FilterError> {
        Ok(false)
    }
}

pub struct AlwaysOnFilter;

impl FeatureFilter for AlwaysOnFilter {
    fn evaluate(&self, _ctx: &FeatureContext, _params: &Parameters) -> Result<bool, FilterError> {
        Ok(true)
    }
}

/// Enables the flag with probability `percentage` (0.0 to 1.0).
/// Every call draws a fresh sample, there is no per-user stickiness.
pub struct PercentageFilter;

impl FeatureFilter for PercentageFilter {
    fn evaluate(&self, _ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        let percentage = optional_number(params, "percentage")?.unwrap_or(0.0);
        Ok(rand::thread_rng().gen::<f64>() < percentage)
    }
}

pub struct RoleBasedFilter;

impl FeatureFilter for RoleBasedFilter {
    fn evaluate(&self, ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        match optional_str(params, "role")? {
            Some(role) => Ok(ctx.has_role(role)),
            None => Ok(false),
        }
    }
}

/// Enabled while the current time lies within `[start, end]`, both inclusive.
/// A missing bound leaves that side of the window open.
pub struct TimeBasedFilter;

impl FeatureFilter for TimeBasedFilter {
    fn evaluate(&self, _ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        let now = Utc::now();
        if let Some(start) = optional_timestamp(params, "start")? {
            if now < start {
                return Ok(false);
            }
        }
        if let Some(end) = optional_timestamp(params, "end")? {
            if now > end {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct TargetingFilter;

impl FeatureFilter for TargetingFilter {
    fn evaluate(&self, ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        let users = optional_list(params, "users")?;
        if users.iter().any(|u| *u == ctx.user_id) {
            return Ok(true);
        }
        let groups = optional_list(params, "groups")?;
        Ok(ctx.roles.iter().any(|role| groups.contains(role)))
    }
}

/// Requires one of `roles` AND one of `permissions`. An empty or missing
/// list does not restrict its side.
pub struct RoleAndPermissionFilter;

impl FeatureFilter for RoleAndPermissionFilter {
    fn evaluate(&self, ctx: &FeatureContext, params: &Parameters) -> Result<bool, FilterError> {
        let roles = optional_list(params, "roles")?;
        let permissions = optional_list(params, "permissions")?;

        let role_ok = roles.is_empty() || roles.iter().any(|r| ctx.has_role(r));
        let permission_ok =
            permissions.is_empty() || permissions.iter().any(|p| ctx.has_permission(p));

        Ok(role_ok && permission_ok)
    }
}

// PARAMETER HELPERS

// null reads the same as an absent parameter
fn lookup<'a>(params: &'a Parameters, name: &str) -> Option<&'a ParamValue> {
    params.get(name).filter(|value| !value.is_null())
}

fn optional_str<'a>(params: &'a Parameters, name: &'static str) -> Result<Option<&'a str>, FilterError> {
    match lookup(params, name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or(FilterError::MalformedParameter { name, expected: "a string" }),
    }
}

fn optional_number(params: &Parameters, name: &'static str) -> Result<Option<f64>, FilterError> {
    match lookup(params, name) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(FilterError::MalformedParameter { name, expected: "a number" }),
    }
}

fn optional_list<'a>(params: &'a Parameters, name: &'static str) -> Result<&'a [String], FilterError> {
    match lookup(params, name) {
        None => Ok(&[]),
        Some(value) => value
            .as_list()
            .ok_or(FilterError::MalformedParameter { name, expected: "a list of strings" }),
    }
}

fn optional_timestamp(
    params: &Parameters,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, FilterError> {
    let Some(raw) = optional_str(params, name)? else {
        return Ok(None);
    };
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| FilterError::InvalidTimestamp {
            name,
            value: raw.to_string(),
        })
}

/// Accepts RFC 3339, or an ISO date-time without offset read as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}
