//! Routing table and resolver.
//!
//! A route maps the selector key `"<department>|<team>"` to the ordered approvers a
//! request must pass. Matching is exact and case-sensitive. An unmatched key is not an
//! error: the table's fallback approvers are returned instead and the caller annotates
//! the first generated step with [`RouteResolution::fallback_comment`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::selector_key;
use crate::domain::step::ApproverRole;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverTemplate {
    pub email: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub role: Option<ApproverRole>,
}

impl ApproverTemplate {
    pub fn resolved_role(&self) -> ApproverRole {
        self.role.unwrap_or_else(|| ApproverRole::classify(&self.title))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub department: String,
    pub team: String,
    pub approvers: Vec<ApproverTemplate>,
}

impl RouteEntry {
    pub fn selector_key(&self) -> String {
        selector_key(&self.department, &self.team)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteResolution<'a> {
    pub selector_key: String,
    pub approvers: &'a [ApproverTemplate],
    pub is_fallback: bool,
}

impl RouteResolution<'_> {
    pub fn fallback_comment(&self) -> Option<String> {
        self.is_fallback
            .then(|| format!("Routing fallback: no route configured for \"{}\"", self.selector_key))
    }
}

#[derive(Debug, Error)]
pub enum RoutingTableError {
    #[error("could not read routing table `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse routing table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("routing table has no fallback approvers")]
    MissingFallback,
    #[error("route `{key}` has no approvers")]
    EmptyRoute { key: String },
    #[error("route `{key}` is defined more than once")]
    DuplicateRoute { key: String },
    #[error("route `{key}` is invalid: {reason}")]
    InvalidRoute { key: String, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct RoutingTableFile {
    #[serde(default)]
    routes: Vec<RouteEntry>,
    fallback: Option<FallbackFile>,
}

#[derive(Debug, Default, Deserialize)]
struct FallbackFile {
    #[serde(default)]
    approvers: Vec<ApproverTemplate>,
}

#[derive(Clone, Debug)]
pub struct RoutingTable {
    routes: Vec<RouteEntry>,
    by_key: HashMap<String, usize>,
    fallback: Vec<ApproverTemplate>,
}

impl RoutingTable {
    pub fn new(
        routes: Vec<RouteEntry>,
        fallback: Vec<ApproverTemplate>,
    ) -> Result<Self, RoutingTableError> {
        if fallback.is_empty() {
            return Err(RoutingTableError::MissingFallback);
        }
        validate_approvers("fallback", &fallback)?;

        let mut by_key = HashMap::with_capacity(routes.len());
        for (position, route) in routes.iter().enumerate() {
            let key = route.selector_key();
            if route.department.contains('|') || route.team.contains('|') {
                return Err(RoutingTableError::InvalidRoute {
                    key,
                    reason: "department and team must not contain `|`".to_string(),
                });
            }
            if route.approvers.is_empty() {
                return Err(RoutingTableError::EmptyRoute { key });
            }
            validate_approvers(&key, &route.approvers)?;
            if by_key.insert(key.clone(), position).is_some() {
                return Err(RoutingTableError::DuplicateRoute { key });
            }
        }

        Ok(Self { routes, by_key, fallback })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RoutingTableError> {
        let file: RoutingTableFile = toml::from_str(raw)?;
        let fallback = file.fallback.map(|fallback| fallback.approvers).unwrap_or_default();
        Self::new(file.routes, fallback)
    }

    pub fn load(path: &Path) -> Result<Self, RoutingTableError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RoutingTableError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn resolve(&self, selector_key: &str) -> RouteResolution<'_> {
        match self.by_key.get(selector_key) {
            Some(position) => RouteResolution {
                selector_key: selector_key.to_string(),
                approvers: &self.routes[*position].approvers,
                is_fallback: false,
            },
            None => RouteResolution {
                selector_key: selector_key.to_string(),
                approvers: &self.fallback,
                is_fallback: true,
            },
        }
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn fallback(&self) -> &[ApproverTemplate] {
        &self.fallback
    }
}

fn validate_approvers(key: &str, approvers: &[ApproverTemplate]) -> Result<(), RoutingTableError> {
    for approver in approvers {
        let email = approver.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(RoutingTableError::InvalidRoute {
                key: key.to_string(),
                reason: format!("approver `{}` has no usable email", approver.name),
            });
        }
    }
    Ok(())
}
