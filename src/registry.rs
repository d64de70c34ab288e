//! Target catalogue: named, addressable endpoints grouped by game/region.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How a target is probed.
///
/// The choice is per-target configuration: environments without raw
/// socket privilege should register TCP-connect targets explicitly
/// rather than relying on silent renegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// ICMP echo request/reply.
    Icmp,
    /// Timed TCP connect handshake to `host:port`.
    TcpConnect,
    /// Application-level UDP echo round trip to `host:port`.
    AppEcho,
}

/// A probeable endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Stable key, unique within a registry.
    pub id: String,
    /// Human label, e.g. "EU West".
    pub display_name: String,
    /// Grouping key, e.g. the game name.
    pub group: String,
    /// Host or IP; `host:port` for TCP-connect and echo probes.
    pub address: String,
    pub protocol: Protocol,
}

impl Target {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        group: impl Into<String>,
        address: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            group: group.into(),
            address: address.into(),
            protocol,
        }
    }
}

/// In-memory catalogue of targets in registration order. No I/O.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
    ids: HashSet<String>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one target. Fails without modifying the registry if the
    /// id is already present.
    pub fn register(&mut self, target: Target) -> Result<(), EngineError> {
        if target.id.is_empty() {
            return Err(EngineError::Config("target id must not be empty".into()));
        }
        if !self.ids.insert(target.id.clone()) {
            return Err(EngineError::DuplicateTargetId(target.id));
        }
        self.targets.push(target);
        Ok(())
    }

    /// Register a batch of targets, all-or-nothing: a duplicate anywhere
    /// in the batch (or against existing entries) leaves the registry
    /// unchanged.
    pub fn register_all(
        &mut self,
        targets: impl IntoIterator<Item = Target>,
    ) -> Result<usize, EngineError> {
        let batch: Vec<Target> = targets.into_iter().collect();
        let mut seen = HashSet::new();
        for target in &batch {
            if target.id.is_empty() {
                return Err(EngineError::Config("target id must not be empty".into()));
            }
            if self.ids.contains(&target.id) || !seen.insert(target.id.clone()) {
                return Err(EngineError::DuplicateTargetId(target.id.clone()));
            }
        }
        let added = batch.len();
        for target in batch {
            self.ids.insert(target.id.clone());
            self.targets.push(target);
        }
        Ok(added)
    }

    /// All targets in registration order.
    pub fn list(&self) -> &[Target] {
        &self.targets
    }

    /// Targets in the given group, in registration order.
    pub fn list_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Target> {
        self.targets.iter().filter(move |t| t.group == group)
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, group: &str) -> Target {
        Target::new(id, id.to_uppercase(), group, "192.0.2.1", Protocol::Icmp)
    }

    #[test]
    fn duplicate_id_rejected_registry_unchanged() {
        let mut reg = TargetRegistry::new();
        reg.register(target("euw", "lol")).unwrap();
        let err = reg.register(target("euw", "lol")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTargetId(id) if id == "euw"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut reg = TargetRegistry::new();
        for id in ["na", "euw", "kr", "br"] {
            reg.register(target(id, "lol")).unwrap();
        }
        let ids: Vec<&str> = reg.list().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["na", "euw", "kr", "br"]);
    }

    #[test]
    fn group_filter() {
        let mut reg = TargetRegistry::new();
        reg.register(target("na", "lol")).unwrap();
        reg.register(target("frankfurt", "cs2")).unwrap();
        reg.register(target("euw", "lol")).unwrap();
        let lol: Vec<&str> = reg.list_group("lol").map(|t| t.id.as_str()).collect();
        assert_eq!(lol, ["na", "euw"]);
        assert_eq!(reg.list_group("valorant").count(), 0);
    }

    #[test]
    fn register_all_is_atomic() {
        let mut reg = TargetRegistry::new();
        reg.register(target("na", "lol")).unwrap();
        let err = reg
            .register_all([target("euw", "lol"), target("na", "lol")])
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTargetId(_)));
        // Nothing from the failed batch was added.
        assert_eq!(reg.len(), 1);
        assert!(reg.get("euw").is_none());
    }

    #[test]
    fn empty_id_rejected() {
        let mut reg = TargetRegistry::new();
        let err = reg.register(target("", "lol")).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
