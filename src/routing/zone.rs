//! Zone record lookup.
//!
//! The zone store decides whether a domain is hosted on the platform. The
//! front door only asks whether routing-relevant records exist; what they
//! mean is up to the domain handler.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::ZoneConfig;
use crate::routing::domain::Domain;

/// Record type stored for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
    Txt,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::A => "A",
            RecordKind::Aaaa => "AAAA",
            RecordKind::Cname => "CNAME",
            RecordKind::Txt => "TXT",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordKind {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordKind::A),
            "AAAA" => Ok(RecordKind::Aaaa),
            "CNAME" => Ok(RecordKind::Cname),
            "TXT" => Ok(RecordKind::Txt),
            other => Err(ZoneError::UnknownKind(other.to_string())),
        }
    }
}

/// A single record in a domain's zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub kind: RecordKind,
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("zone store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown record kind: {0}")]
    UnknownKind(String),
    #[error("alias loop while resolving {0}")]
    AliasLoop(Domain),
}

/// Lookup interface of the zone-routing store.
#[async_trait]
pub trait ZoneResolver: Send + Sync {
    /// Return the records of `kind` for `domain`, in store order.
    ///
    /// With `follow_aliases`, a domain that only carries a CNAME is resolved
    /// through its target.
    async fn resolve(
        &self,
        domain: &Domain,
        kind: RecordKind,
        follow_aliases: bool,
    ) -> Result<Vec<ZoneRecord>, ZoneError>;
}

/// Maximum CNAME hops followed before giving up.
const MAX_ALIAS_DEPTH: usize = 8;

/// In-process zone store, seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryZoneStore {
    zones: DashMap<Domain, Vec<ZoneRecord>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `[[zones]]` config entries.
    pub fn from_config(zones: &[ZoneConfig]) -> Self {
        let store = Self::new();
        for zone in zones {
            let domain = Domain::normalize(&zone.domain);
            for record in &zone.records {
                store.insert(&domain, record.clone());
            }
        }
        tracing::info!(zones = store.zones.len(), "Zone store seeded");
        store
    }

    pub fn insert(&self, domain: &Domain, record: ZoneRecord) {
        self.zones.entry(domain.clone()).or_default().push(record);
    }

    pub fn remove(&self, domain: &Domain) {
        self.zones.remove(domain);
    }

    fn records(&self, domain: &Domain) -> Vec<ZoneRecord> {
        self.zones
            .get(domain)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ZoneResolver for MemoryZoneStore {
    async fn resolve(
        &self,
        domain: &Domain,
        kind: RecordKind,
        follow_aliases: bool,
    ) -> Result<Vec<ZoneRecord>, ZoneError> {
        let mut current = domain.clone();

        for _ in 0..MAX_ALIAS_DEPTH {
            let records = self.records(&current);
            let matching: Vec<ZoneRecord> =
                records.iter().filter(|r| r.kind == kind).cloned().collect();

            if !matching.is_empty() || !follow_aliases || kind == RecordKind::Cname {
                return Ok(matching);
            }

            match records.iter().find(|r| r.kind == RecordKind::Cname) {
                Some(alias) => current = Domain::normalize(&alias.value),
                None => return Ok(Vec::new()),
            }
        }

        Err(ZoneError::AliasLoop(domain.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(value: &str) -> ZoneRecord {
        ZoneRecord { kind: RecordKind::Txt, value: value.into() }
    }

    #[tokio::test]
    async fn returns_matching_kind_only() {
        let store = MemoryZoneStore::new();
        let domain = Domain::normalize("example.test");
        store.insert(&domain, txt("route=a"));
        store.insert(&domain, ZoneRecord { kind: RecordKind::A, value: "10.0.0.1".into() });

        let found = store.resolve(&domain, RecordKind::Txt, false).await.unwrap();
        assert_eq!(found, vec![txt("route=a")]);
    }

    #[tokio::test]
    async fn follows_aliases() {
        let store = MemoryZoneStore::new();
        let alias = Domain::normalize("www.example.test");
        let target = Domain::normalize("example.test");
        store.insert(&alias, ZoneRecord { kind: RecordKind::Cname, value: "Example.Test.".into() });
        store.insert(&target, txt("route=b"));

        assert_eq!(store.resolve(&alias, RecordKind::Txt, true).await.unwrap(), vec![txt("route=b")]);
        assert!(store.resolve(&alias, RecordKind::Txt, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alias_loop_is_an_error() {
        let store = MemoryZoneStore::new();
        let a = Domain::normalize("a.test");
        let b = Domain::normalize("b.test");
        store.insert(&a, ZoneRecord { kind: RecordKind::Cname, value: "b.test".into() });
        store.insert(&b, ZoneRecord { kind: RecordKind::Cname, value: "a.test".into() });

        assert!(matches!(
            store.resolve(&a, RecordKind::Txt, true).await,
            Err(ZoneError::AliasLoop(_))
        ));
    }

    #[test]
    fn record_kind_parsing() {
        assert_eq!("txt".parse::<RecordKind>().unwrap(), RecordKind::Txt);
        assert!("MX".parse::<RecordKind>().is_err());
    }
}
