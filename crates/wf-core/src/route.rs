//! Route steps and route-provider payload parsing.
//!
//! # Provider payload
//!
//! The external route provider hands over one JSON document per route:
//!
//! ```json
//! {
//!   "destination": "CVS Pharmacy, 1 Main St",
//!   "total_distance": "0.4 mi",
//!   "total_duration_seconds": 420,
//!   "steps": [
//!     {
//!       "instruction": "Head <b>north</b> on Broad St",
//!       "distance_meters": 120,
//!       "duration_seconds": 90,
//!       "start_location": { "lat": 39.9812, "lng": -75.1556 },
//!       "end_location":   { "lat": 39.9823, "lng": -75.1556 }
//!     }
//!   ]
//! }
//! ```
//!
//! Instruction text may contain HTML markup; it is cleaned on load so every
//! downstream consumer (presenter, speech, wire) sees plain text.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::{Coordinate, NavError, NavResult};

// ── Step ──────────────────────────────────────────────────────────────────────

/// One maneuver segment of a precomputed route.
///
/// `distance_m` and `duration_s` are authoritative values from the route
/// provider.  Display and speech always use them, never a locally computed
/// distance.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub index:       usize,
    pub instruction: String,
    pub distance_m:  f64,
    pub duration_s:  f64,
    pub start:       Coordinate,
    pub end:         Coordinate,
}

// ── RoutePlan ─────────────────────────────────────────────────────────────────

/// An ordered, immutable list of steps plus the route-level labels.
///
/// Steps are never mutated after construction; a new route replaces the
/// whole plan.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePlan {
    steps:                  Vec<Step>,
    pub destination:        String,
    pub total_distance:     String,
    pub total_duration_s:   f64,
}

impl RoutePlan {
    /// Build a plan, renumbering `Step::index` to match position.
    pub fn new(
        mut steps:        Vec<Step>,
        destination:      impl Into<String>,
        total_distance:   impl Into<String>,
        total_duration_s: f64,
    ) -> Self {
        for (i, step) in steps.iter_mut().enumerate() {
            step.index = i;
        }
        Self {
            steps,
            destination: destination.into(),
            total_distance: total_distance.into(),
            total_duration_s,
        }
    }

    /// Parse a route-provider JSON payload.
    ///
    /// An empty `steps` array parses successfully; starting navigation on
    /// such a plan is what fails.
    pub fn from_provider_json(json: &str) -> NavResult<Self> {
        let raw: ProviderRoute =
            serde_json::from_str(json).map_err(|e| NavError::Parse(e.to_string()))?;

        let steps = raw
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, s)| {
                let step = Step {
                    index,
                    instruction: clean_instruction_html(&s.instruction),
                    distance_m:  s.distance_meters,
                    duration_s:  s.duration_seconds,
                    start:       s.start_location,
                    end:         s.end_location,
                };
                if !step.start.is_valid() || !step.end.is_valid() {
                    return Err(NavError::Parse(format!(
                        "step {index} has an out-of-range coordinate"
                    )));
                }
                Ok(step)
            })
            .collect::<NavResult<Vec<_>>>()?;

        Ok(Self::new(
            steps,
            raw.destination,
            raw.total_distance,
            raw.total_duration_seconds,
        ))
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the final step, or `None` for an empty plan.
    #[inline]
    pub fn last_index(&self) -> Option<usize> {
        self.steps.len().checked_sub(1)
    }
}

// ── Provider records ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProviderRoute {
    steps:                  Vec<ProviderStep>,
    destination:            String,
    #[serde(default)]
    total_distance:         String,
    #[serde(default)]
    total_duration_seconds: f64,
}

#[derive(Deserialize)]
struct ProviderStep {
    instruction:      String,
    distance_meters:  f64,
    #[serde(default)]
    duration_seconds: f64,
    start_location:   Coordinate,
    end_location:     Coordinate,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn html_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is a valid regex"))
}

/// Strip HTML tags and decode the two entities the provider emits.  A `<` with
/// no later `>` is text, not a tag.
pub fn clean_instruction_html(html: &str) -> String {
    html_tag()
        .replace_all(html, "")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_owned()
}
