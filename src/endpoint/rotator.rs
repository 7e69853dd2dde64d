use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::ConfigError;
use std::sync::{Mutex, PoisonError};

/// Round-robin over a fixed set of endpoints
///
/// The endpoint list never changes after construction; only a cursor moves.
/// Each call to [`next`](Self::next) advances the cursor by one position
/// (modulo the set size) under a lock and returns the endpoint now at the
/// head, so over `N` consecutive calls every endpoint of an `N`-sized set is
/// returned exactly once.
#[derive(Debug)]
pub struct EndpointRotator {
    endpoints: Vec<Endpoint>,
    cursor: Mutex<usize>,
}

impl EndpointRotator {
    /// Creates a rotator over the given endpoints
    ///
    /// # Returns
    ///
    /// * `Ok(EndpointRotator)` - Rotator with its cursor at position 0
    /// * `Err(ConfigError::EmptyEndpoints)` - No endpoints were supplied
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpoints);
        }

        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
        })
    }

    /// Creates a rotator over the endpoints named in the configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(Endpoint::all_from_config(config)?)
    }

    /// Advances the cursor and returns the endpoint at the new position
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> &Endpoint {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        *cursor = (*cursor + 1) % self.endpoints.len();
        &self.endpoints[*cursor]
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in rotation order
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}
