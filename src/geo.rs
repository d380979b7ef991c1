use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// External geocoding collaborator. Implementations live outside this
/// crate; tests supply stubs.
///
/// `Ok(None)` means the address produced no result; the workflow engine
/// surfaces that as its resolution error.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, address: &str) -> anyhow::Result<Option<GeoPoint>>;
}

/// Resolver for callers that always submit explicit coordinates.
pub struct NoResolver;

impl AddressResolver for NoResolver {
    fn resolve(&self, _address: &str) -> anyhow::Result<Option<GeoPoint>> {
        Ok(None)
    }
}
