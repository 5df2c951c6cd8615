//! Client identity and visit recording requests
//!
//! A browsing client keeps one identifier for its whole lifetime. Where that
//! identifier lives is a capability injected into the recording path through
//! [`ClientIdentityProvider`].

use crate::{Coordinate, DataError, Result, Visitor};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Source of the stable identifier of the current client
pub trait ClientIdentityProvider {
    fn client_id(&self) -> Result<String>;
}

/// Identity fixed at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedIdentity(String);

impl FixedIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl ClientIdentityProvider for FixedIdentity {
    fn client_id(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(DataError::Identity("empty client id".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Identity persisted in a file, created on first use and reused afterwards
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClientIdentityProvider for FileIdentity {
    fn client_id(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if !contents.trim().is_empty() => return Ok(contents.trim().to_string()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let id = uuid::Uuid::new_v4().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &id)?;
        tracing::info!("Created client id {} at {}", id, self.path.display());
        Ok(id)
    }
}

/// A request to record a visit, as accepted by the insert endpoint
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct VisitRequest {
    pub visitor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub country: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub city: Option<String>,
}

impl VisitRequest {
    /// Build a request for the client identified by `identity`
    pub fn new(
        identity: &dyn ClientIdentityProvider,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self> {
        Ok(Self {
            visitor_id: identity.client_id()?,
            latitude,
            longitude,
            country: None,
            city: None,
        })
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Turn the request into a stored row
    pub fn into_visitor(self, id: String, now: DateTime<Utc>) -> Visitor {
        Visitor {
            id,
            visitor_id: self.visitor_id,
            latitude: Coordinate::Number(self.latitude),
            longitude: Coordinate::Number(self.longitude),
            country: self.country,
            city: self.city,
            visit_count: Some(1),
            last_seen: Some(now),
        }
    }
}
