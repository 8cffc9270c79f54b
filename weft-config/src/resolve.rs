// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Endpoint pattern resolution: turning a connection's `from`/`to` string
//! into the concrete set of `(instance, port)` pairs it names.
//!
//! Grounded in the original prototype's `parsePortSpec`, `Wildcard`,
//! `RegexMatcher` and `ModuleGroup` helpers: split an endpoint on its first
//! `.` to separate instance from port (no dot means "this module's default
//! port"); a `regex:` prefix means the remainder is an ECMA-style regex
//! matched against instance names, a `group:` prefix means the remainder
//! names a declared group, and anything else is matched as a shell-style
//! wildcard (`*`, `?`) with plain equality as the fallback when it contains
//! neither.

use std::collections::HashMap;

use itertools::Itertools;
use regex::Regex;

use crate::error::ConfigError;
use crate::schema::GroupDef;

/// A single resolved endpoint: which instance, and which of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub instance: String,
    pub port: Option<String>,
}

/// Split `"instance.port"` into its parts. No dot means "module's default
/// port" (`port: None`), matching the original `parsePortSpec`'s behavior
/// for a bare instance name.
#[must_use]
pub fn parse_port_spec(spec: &str) -> (String, Option<String>) {
    match spec.split_once('.') {
        Some((instance, port)) => (instance.to_string(), Some(port.to_string())),
        None => (spec.to_string(), None),
    }
}

/// Translate a shell-style wildcard (`*` any run of characters, `?` any
/// single character) into an anchored regex.
fn wildcard_to_regex(pattern: &str) -> Result<Regex, ConfigError> {
    let mut out = String::from("^");
    for part in pattern.split_inclusive(['*', '?']) {
        let (literal, wildcard) = match part.chars().last() {
            Some('*') => (&part[..part.len() - 1], Some(".*")),
            Some('?') => (&part[..part.len() - 1], Some(".")),
            _ => (part, None),
        };
        out.push_str(&regex::escape(literal));
        if let Some(w) = wildcard {
            out.push_str(w);
        }
    }
    out.push('$');
    Regex::new(&out).map_err(ConfigError::from)
}

/// Resolve one endpoint pattern (the instance part of a connection's
/// `from`/`to`/`exclude` string, before the `.port` suffix is peeled off)
/// against the set of instantiated module names.
pub fn resolve_instances<'a>(
    pattern: &str,
    instances: impl Iterator<Item = &'a str>,
    groups: &HashMap<String, GroupDef>,
) -> Result<Vec<String>, ConfigError> {
    if let Some(name) = pattern.strip_prefix("group:") {
        let group = groups
            .get(name)
            .ok_or_else(|| ConfigError::UnresolvedEndpoint(pattern.to_string()))?;
        return Ok(group.members.iter().cloned().sorted().dedup().collect());
    }

    if let Some(raw) = pattern.strip_prefix("regex:") {
        let re = Regex::new(raw).map_err(ConfigError::from)?;
        return Ok(instances.filter(|i| re.is_match(i)).map(str::to_string).sorted().dedup().collect());
    }

    if pattern.contains(['*', '?']) {
        let re = wildcard_to_regex(pattern)?;
        return Ok(instances.filter(|i| re.is_match(i)).map(str::to_string).sorted().dedup().collect());
    }

    let matches: Vec<String> = instances.filter(|&i| i == pattern).map(str::to_string).collect();
    if matches.is_empty() {
        return Err(ConfigError::UnresolvedEndpoint(pattern.to_string()));
    }
    Ok(matches)
}

/// Remove any instance named by one of `exclude`'s patterns from
/// `resolved`, following the same matching rules as `resolve_instances`.
pub fn filter_excluded(
    resolved: Vec<String>,
    exclude: &[String],
    groups: &HashMap<String, GroupDef>,
) -> Result<Vec<String>, ConfigError> {
    if exclude.is_empty() {
        return Ok(resolved);
    }
    let all: Vec<String> = resolved.clone();
    let mut excluded = std::collections::HashSet::new();
    for pattern in exclude {
        for name in resolve_instances(pattern, all.iter().map(String::as_str), groups)? {
            excluded.insert(name);
        }
    }
    Ok(resolved.into_iter().filter(|i| !excluded.contains(i)).collect())
}
