//! Tracker configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tracker::LkParams;

/// How a detection is associated with the tracks of previous frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Take the first track, in insertion order, whose IoU exceeds the
    /// threshold. Several detections may resolve to the same track.
    #[default]
    FirstMatch,
    /// Solve a one-to-one assignment maximizing total IoU.
    BestIou,
}

/// Which per-frame update strategy a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Forget everything each frame and number accepted detections from 1.
    PerFrame,
    /// Keep tracks across frames and match detections by IoU.
    #[default]
    Persistent,
    /// Like `Persistent`, but first move every track along its optical flow.
    FlowAssisted,
}

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum confidence for a detection to be tracked (inclusive).
    pub confidence_threshold: f32,
    /// IoU a detection must exceed to reuse an existing identifier.
    pub match_iou_threshold: f32,
    pub match_policy: MatchPolicy,
    pub strategy: StrategyKind,
    /// Drop tracks and seen identifiers after this many frames without a
    /// sighting. `None` keeps them for the whole session.
    pub max_frames_unseen: Option<u32>,
    /// Keep at most this many points of history per track.
    pub max_history: Option<usize>,
    pub flow: LkParams,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            match_iou_threshold: 0.5,
            match_policy: MatchPolicy::default(),
            strategy: StrategyKind::default(),
            max_frames_unseen: None,
            max_history: None,
            flow: LkParams::default(),
        }
    }
}

impl TrackerConfig {
    /// Default configuration with the given strategy.
    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.match_iou_threshold) {
            return Err(Error::InvalidConfig(format!(
                "match_iou_threshold must be in [0, 1], got {}",
                self.match_iou_threshold
            )));
        }
        if self.max_history == Some(0) {
            return Err(Error::InvalidConfig(
                "max_history must keep at least one point".to_string(),
            ));
        }
        self.flow.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.match_iou_threshold, 0.5);
        assert_eq!(config.strategy, StrategyKind::Persistent);
        assert_eq!(config.match_policy, MatchPolicy::FirstMatch);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = TrackerConfig {
            confidence_threshold: 1.5,
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = TrackerConfig {
            match_iou_threshold: f32::NAN,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_history() {
        let config = TrackerConfig {
            max_history: Some(0),
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"strategy": "per_frame", "max_frames_unseen": 30}"#).unwrap();
        assert_eq!(config.strategy, StrategyKind::PerFrame);
        assert_eq!(config.max_frames_unseen, Some(30));
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.flow, LkParams::default());
    }
}
