//! Arrow category and street name from free-text maneuver instructions.
//!
//! Both derivations are ordered rule tables, matched case-insensitively,
//! first match wins.  Text inference is approximate by nature; a
//! provider-supplied maneuver code would replace the arrow table outright.
//!
//! | Order | Arrow         | Pattern                                   |
//! |-------|---------------|-------------------------------------------|
//! | 1     | `SharpRight`  | `sharp right`                             |
//! | 2     | `SharpLeft`   | `sharp left`                              |
//! | 3     | `Right`       | `turn right`, `right onto`                |
//! | 4     | `Left`        | `turn left`, `left onto`                  |
//! | 5     | `SlightRight` | `slight right`, `bear right`              |
//! | 6     | `SlightLeft`  | `slight left`, `bear left`                |
//! | 7     | `UTurn`       | `u-turn`, `u turn`                        |
//! | 8     | `Straight`    | anything else (`continue`, `head`, ...)   |
//!
//! Street names: `onto X`, `on X`, `to X`, `toward X`, else `"Continue"`.

use std::sync::OnceLock;

use regex::Regex;

use wf_core::Step;

/// Label shown when no street name can be extracted.
pub const CONTINUE_LABEL: &str = "Continue";

/// Directional overlay category.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Arrow {
    SharpRight,
    SharpLeft,
    Right,
    Left,
    SlightRight,
    SlightLeft,
    UTurn,
    Straight,
}

impl Arrow {
    pub fn as_str(self) -> &'static str {
        match self {
            Arrow::SharpRight  => "sharp-right",
            Arrow::SharpLeft   => "sharp-left",
            Arrow::Right       => "right",
            Arrow::Left        => "left",
            Arrow::SlightRight => "slight-right",
            Arrow::SlightLeft  => "slight-left",
            Arrow::UTurn       => "u-turn",
            Arrow::Straight    => "straight",
        }
    }

    /// A terminal glyph for the demo overlay.
    pub fn glyph(self) -> char {
        match self {
            Arrow::SharpRight  => '↘',
            Arrow::SharpLeft   => '↙',
            Arrow::Right       => '→',
            Arrow::Left        => '←',
            Arrow::SlightRight => '↗',
            Arrow::SlightLeft  => '↖',
            Arrow::UTurn       => '↶',
            Arrow::Straight    => '↑',
        }
    }
}

impl std::fmt::Display for Arrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Rule tables ───────────────────────────────────────────────────────────────

const ARROW_PATTERNS: &[(&str, Arrow)] = &[
    (r"(?i)\bsharp\s+right\b",                      Arrow::SharpRight),
    (r"(?i)\bsharp\s+left\b",                       Arrow::SharpLeft),
    (r"(?i)\bturn\s+right\b|\bright\s+onto\b",      Arrow::Right),
    (r"(?i)\bturn\s+left\b|\bleft\s+onto\b",        Arrow::Left),
    (r"(?i)\b(?:slight|bear)\s+right\b",            Arrow::SlightRight),
    (r"(?i)\b(?:slight|bear)\s+left\b",             Arrow::SlightLeft),
    (r"(?i)\bu-turn\b|\bu\s+turn\b",                Arrow::UTurn),
];

const STREET_PATTERNS: &[&str] = &[
    r"(?i)\bonto\s+(.+?)(?:\s+toward\b|[,;]|$)",
    r"(?i)\bon\s+(.+?)(?:\s+toward\b|[,;]|$)",
    r"(?i)\bto\s+(.+?)(?:[,;]|$)",
    r"(?i)\btoward\s+(.+?)(?:[,;]|$)",
];

struct Rules {
    arrows:  Vec<(Regex, Arrow)>,
    streets: Vec<Regex>,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        arrows: ARROW_PATTERNS
            .iter()
            .map(|&(p, arrow)| (Regex::new(p).expect("arrow pattern is a valid regex"), arrow))
            .collect(),
        streets: STREET_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("street pattern is a valid regex"))
            .collect(),
    })
}

// ── Presenter ─────────────────────────────────────────────────────────────────

/// Everything the visual overlay needs for the current step.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    /// 1-based.
    pub step_number:        usize,
    pub total_steps:        usize,
    pub instruction:        String,
    pub arrow:              Arrow,
    pub street:             String,
    /// Provider distance for the displayed step, metres.
    pub distance_to_next_m: f64,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct InstructionPresenter;

impl InstructionPresenter {
    pub fn new() -> Self {
        Self
    }

    pub fn arrow(&self, instruction: &str) -> Arrow {
        rules()
            .arrows
            .iter()
            .find(|(re, _)| re.is_match(instruction))
            .map_or(Arrow::Straight, |&(_, arrow)| arrow)
    }

    /// Short street name, or [`CONTINUE_LABEL`] when nothing matches.
    ///
    /// Trailing `, ; : ! ?` and whitespace are stripped; a trailing period
    /// is kept since it usually belongs to an abbreviation ("Main St.").
    pub fn street_name(&self, instruction: &str) -> String {
        rules()
            .streets
            .iter()
            .filter_map(|re| re.captures(instruction))
            .filter_map(|caps| caps.get(1))
            .map(|m| {
                m.as_str()
                    .trim_end_matches(|c: char| c.is_whitespace() || ",;:!?".contains(c))
                    .trim()
            })
            .find(|name| !name.is_empty())
            .map_or_else(|| CONTINUE_LABEL.to_string(), str::to_string)
    }

    /// Display state for `step`, numbered within a route of `total_steps`.
    pub fn display(&self, step: &Step, total_steps: usize) -> DisplayState {
        DisplayState {
            step_number:        step.index + 1,
            total_steps,
            instruction:        step.instruction.clone(),
            arrow:              self.arrow(&step.instruction),
            street:             self.street_name(&step.instruction),
            distance_to_next_m: step.distance_m,
        }
    }

    /// Display state built from an authoritative remote update.
    pub fn display_remote(
        &self,
        step_number:        usize,
        total_steps:        usize,
        instruction:        &str,
        distance_to_next_m: f64,
    ) -> DisplayState {
        DisplayState {
            step_number,
            total_steps,
            instruction: instruction.to_string(),
            arrow:       self.arrow(instruction),
            street:      self.street_name(instruction),
            distance_to_next_m,
        }
    }
}
