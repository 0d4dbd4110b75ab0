//! Pool limits and timeouts.

use std::{collections::HashMap, hash::Hash, time::Duration};

/// Default number of connections allowed per route.
pub const DEFAULT_MAX_PER_ROUTE: usize = 2;
/// Default number of connections allowed across all routes.
pub const DEFAULT_MAX_TOTAL: usize = 20;

/// Limits and timeouts for a [`ConnPool`](super::ConnPool).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wireline::pool::PoolConfig;
///
/// let config = PoolConfig::builder()
///     .max_total(8)
///     .max_per_route("backend", 4)
///     .default_lease_timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.max_total(), 8);
/// assert_eq!(config.max_for(&"backend"), 4);
/// assert_eq!(config.max_for(&"other"), 2);
/// ```
#[derive(Clone, Debug)]
pub struct PoolConfig<R> {
    default_max_per_route: usize,
    max_total: usize,
    route_limits: HashMap<R, usize>,
    default_connect_timeout: Option<Duration>,
    default_lease_timeout: Option<Duration>,
    time_to_live: Option<Duration>,
}

impl<R> Default for PoolConfig<R> {
    fn default() -> Self {
        Self {
            default_max_per_route: DEFAULT_MAX_PER_ROUTE,
            max_total: DEFAULT_MAX_TOTAL,
            route_limits: HashMap::new(),
            default_connect_timeout: None,
            default_lease_timeout: None,
            time_to_live: None,
        }
    }
}

impl<R: Eq + Hash> PoolConfig<R> {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> PoolConfigBuilder<R> { PoolConfigBuilder { config: Self::default() } }

    /// Limit applied to routes without an override.
    #[must_use]
    pub fn default_max_per_route(&self) -> usize { self.default_max_per_route }

    /// Limit across all routes.
    #[must_use]
    pub fn max_total(&self) -> usize { self.max_total }

    /// Effective limit for `route`.
    #[must_use]
    pub fn max_for(&self, route: &R) -> usize {
        self.route_limits
            .get(route)
            .copied()
            .unwrap_or(self.default_max_per_route)
    }

    /// Connect timeout used when a lease carries none.
    #[must_use]
    pub fn default_connect_timeout(&self) -> Option<Duration> { self.default_connect_timeout }

    /// Lease timeout used when a lease carries none.
    #[must_use]
    pub fn default_lease_timeout(&self) -> Option<Duration> { self.default_lease_timeout }

    /// Longest lifetime of a pooled connection, if bounded.
    #[must_use]
    pub fn time_to_live(&self) -> Option<Duration> { self.time_to_live }

    pub(crate) fn set_default_max_per_route(&mut self, max: usize) { self.default_max_per_route = max; }

    pub(crate) fn set_max_total(&mut self, max: usize) { self.max_total = max; }

    pub(crate) fn set_max_per_route(&mut self, route: R, max: usize) { self.route_limits.insert(route, max); }
}

/// Builder for [`PoolConfig`].
#[derive(Debug)]
pub struct PoolConfigBuilder<R> {
    config: PoolConfig<R>,
}

impl<R: Eq + Hash> PoolConfigBuilder<R> {
    /// Limit for routes without an override.
    #[must_use]
    pub fn default_max_per_route(mut self, max: usize) -> Self {
        self.config.default_max_per_route = max;
        self
    }

    /// Limit across all routes.
    #[must_use]
    pub fn max_total(mut self, max: usize) -> Self {
        self.config.max_total = max;
        self
    }

    /// Override the limit for a single route.
    #[must_use]
    pub fn max_per_route(mut self, route: R, max: usize) -> Self {
        self.config.route_limits.insert(route, max);
        self
    }

    /// Connect timeout applied when a lease has none.
    #[must_use]
    pub fn default_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_connect_timeout = Some(timeout);
        self
    }

    /// Lease timeout applied when a lease has none.
    #[must_use]
    pub fn default_lease_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_lease_timeout = Some(timeout);
        self
    }

    /// Bound the lifetime of every pooled connection.
    #[must_use]
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.config.time_to_live = Some(ttl);
        self
    }

    /// Finish the configuration.
    #[must_use]
    pub fn build(self) -> PoolConfig<R> { self.config }
}
