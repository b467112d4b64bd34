use std::time::Duration;

/// Runtime knobs for the query pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pick scans and expansion order from index cardinality estimates
    /// instead of source order.
    pub query_cost_planner: bool,
    /// Cache compiled plans keyed by the stripped-query hash.
    pub query_plan_cache: bool,
    /// Maximum age of a cached plan before a lookup treats it as a miss.
    pub query_plan_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_cost_planner: false,
            query_plan_cache: true,
            query_plan_cache_ttl: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Configuration with plan caching disabled, so every query observes a
    /// fresh compile.
    pub fn uncached() -> Self {
        Self {
            query_plan_cache: false,
            ..Self::default()
        }
    }

    /// Configuration with the cost planner enabled.
    pub fn cost_planned() -> Self {
        Self {
            query_cost_planner: true,
            ..Self::default()
        }
    }
}
