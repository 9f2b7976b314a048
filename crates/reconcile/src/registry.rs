//! Role registry - static role → host mapping, injected at construction

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::Host;

/// Named groups of hosts targeted together by an operation
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Vec<Host>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a role; duplicate hosts keep their first position
    pub fn insert<I, H>(&mut self, role: &str, hosts: I)
    where
        I: IntoIterator<Item = H>,
        H: Into<Host>,
    {
        let mut ordered: Vec<Host> = Vec::new();
        for host in hosts {
            let host = host.into();
            if !ordered.contains(&host) {
                ordered.push(host);
            }
        }
        self.roles.insert(role.to_string(), ordered);
    }

    pub fn with_role<I, H>(mut self, role: &str, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<Host>,
    {
        self.insert(role, hosts);
        self
    }

    /// Ordered host set of a role
    pub fn resolve_hosts(&self, role: &str) -> Result<&[Host]> {
        self.roles
            .get(role)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownRole {
                role: role.to_string(),
            })
    }

    /// Resolve a role and narrow it by an optional host filter
    ///
    /// The filter can only shrink the set: naming a host outside the role is
    /// an error. Role order is kept regardless of filter order.
    pub fn select(&self, role: &str, filter: Option<&[Host]>) -> Result<Vec<Host>> {
        let hosts = self.resolve_hosts(role)?;

        let Some(filter) = filter else {
            return Ok(hosts.to_vec());
        };

        if let Some(stray) = filter.iter().find(|h| !hosts.contains(h)) {
            return Err(Error::HostNotInRole {
                host: stray.to_string(),
                role: role.to_string(),
            });
        }

        Ok(hosts
            .iter()
            .filter(|h| filter.contains(h))
            .cloned()
            .collect())
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, &[Host])> {
        self.roles.iter().map(|(r, h)| (r.as_str(), h.as_slice()))
    }

    /// Roles a host belongs to
    pub fn roles_of(&self, host: &Host) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|(_, hosts)| hosts.contains(host))
            .map(|(role, _)| role.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
