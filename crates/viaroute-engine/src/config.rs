//! Analysis configuration: search limits and route filter settings.

use serde::{Deserialize, Serialize};

use crate::geometry::DEFAULT_U_TURN_TOLERANCE;
use crate::types::EngineError;

/// Default cap on alternative route length, as a multiple of the
/// shortest route for the leg.
pub const DEFAULT_MAX_ROUTE_LENGTH_RATIO: f64 = 2.0;

/// Default outlier cut-off, as a multiple of the median route length.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 1.2;

/// Default base threshold for the elevation-weighted distance filter.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.7;

/// Default maximum fraction of a shorter route another route may share.
pub const DEFAULT_MAX_SAMENESS: f64 = 0.5;

/// A filter that is either on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    pub enabled: bool,
}

/// A filter with a numeric threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdFilter {
    pub enabled: bool,
    pub threshold: f64,
}

/// The sameness filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamenessFilter {
    pub enabled: bool,
    pub max_sameness: f64,
}

/// Settings for the route filter pipeline.
///
/// The filters always run in declaration order; disabling one skips it
/// without affecting the others.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Drop routes made of the same paths as an earlier route.
    pub exclude_duplicates: Toggle,
    /// Drop routes longer than `threshold` times the median length.
    /// Only applies to sets of three or more routes.
    pub exclude_outliers_by_distance: ThresholdFilter,
    /// Of two routes where one visits every waypoint of the other, drop
    /// the longer.
    pub exclude_basic_detours: Toggle,
    /// Elevation-weighted length filter.
    pub filter_by_distance: ThresholdFilter,
    /// Drop routes that mostly repeat a shorter route.
    pub filter_by_sameness: SamenessFilter,
    /// Drop routes stitched together from parts of two shorter routes.
    pub exclude_crossover_detours: Toggle,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_duplicates: Toggle { enabled: true },
            exclude_outliers_by_distance: ThresholdFilter {
                enabled: true,
                threshold: DEFAULT_OUTLIER_THRESHOLD,
            },
            exclude_basic_detours: Toggle { enabled: true },
            filter_by_distance: ThresholdFilter {
                enabled: true,
                threshold: DEFAULT_DISTANCE_THRESHOLD,
            },
            filter_by_sameness: SamenessFilter {
                enabled: true,
                max_sameness: DEFAULT_MAX_SAMENESS,
            },
            exclude_crossover_detours: Toggle { enabled: true },
        }
    }
}

impl FilterConfig {
    /// Check threshold ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first offending
    /// threshold.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.exclude_outliers_by_distance.threshold.is_finite()
            || self.exclude_outliers_by_distance.threshold <= 0.0
        {
            return Err(invalid(format!(
                "outlier threshold must be positive, got {}",
                self.exclude_outliers_by_distance.threshold
            )));
        }
        if !at_least(self.filter_by_distance.threshold, 1.0) {
            return Err(invalid(format!(
                "distance threshold must be at least 1, got {}",
                self.filter_by_distance.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.filter_by_sameness.max_sameness) {
            return Err(invalid(format!(
                "max_sameness must be within [0, 1], got {}",
                self.filter_by_sameness.max_sameness
            )));
        }
        Ok(())
    }

    /// Every filter switched off. Ranking still happens.
    #[must_use]
    pub fn disabled() -> Self {
        let mut config = Self::default();
        config.exclude_duplicates.enabled = false;
        config.exclude_outliers_by_distance.enabled = false;
        config.exclude_basic_detours.enabled = false;
        config.filter_by_distance.enabled = false;
        config.filter_by_sameness.enabled = false;
        config.exclude_crossover_detours.enabled = false;
        config
    }
}

/// Settings for a full analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Alternatives must be strictly shorter than this multiple of the
    /// shortest route for the leg.
    pub max_route_length_ratio: f64,
    /// Turns whose direction cosine falls below this are treated as
    /// doubling back and pruned from the route search.
    pub u_turn_tolerance: f64,
    pub filters: FilterConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_route_length_ratio: DEFAULT_MAX_ROUTE_LENGTH_RATIO,
            u_turn_tolerance: DEFAULT_U_TURN_TOLERANCE,
            filters: FilterConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first offending
    /// setting.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !at_least(self.max_route_length_ratio, 1.0) {
            return Err(invalid(format!(
                "max_route_length_ratio must be at least 1, got {}",
                self.max_route_length_ratio
            )));
        }
        if !(-1.0..=1.0).contains(&self.u_turn_tolerance) {
            return Err(invalid(format!(
                "u_turn_tolerance must be within [-1, 1], got {}",
                self.u_turn_tolerance
            )));
        }
        self.filters.validate()
    }
}

/// `false` for NaN.
fn at_least(value: f64, min: f64) -> bool {
    value.is_finite() && value >= min
}

const fn invalid(message: String) -> EngineError {
    EngineError::InvalidConfig(message)
}
