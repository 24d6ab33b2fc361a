//! Decides whether the user is looking at the screen.
//!
//! The decision is a prioritized rule table: the first rule whose score
//! exceeds its threshold names the verdict, later rules are never consulted.

use opencv::core::Scalar;

use crate::config::Thresholds;
use crate::face::{Blendshapes, Landmark, CHIN, LEFT_EAR, NOSE_TIP, RIGHT_EAR, TOP_HEAD};

pub const FOCUSED_LABEL: &str = "OK - you are focused";
pub const NO_FACE_LABEL: &str = "NO FACE!";

/// Face heights smaller than this are treated as degenerate.
const MIN_FACE_HEIGHT: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Red,
}

impl StatusColor {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            StatusColor::Green => (0, 255, 0),
            StatusColor::Red => (255, 0, 0),
        }
    }

    /// OpenCV draws in BGR order.
    pub fn to_scalar(self) -> Scalar {
        let (r, g, b) = self.rgb();
        Scalar::new(f64::from(b), f64::from(g), f64::from(r), 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub focused: bool,
    pub label: String,
    pub color: StatusColor,
}

impl Verdict {
    pub fn focused() -> Self {
        Self {
            focused: true,
            label: FOCUSED_LABEL.to_string(),
            color: StatusColor::Green,
        }
    }

    pub fn distracted(label: String) -> Self {
        Self {
            focused: false,
            label,
            color: StatusColor::Red,
        }
    }

    pub fn no_face() -> Self {
        Self::distracted(NO_FACE_LABEL.to_string())
    }
}

/// Scores derived from one face, before any threshold is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusSignals {
    pub down: f32,
    pub side: f32,
    pub up: f32,
    /// `None` when the face box is degenerate or landmarks are missing.
    pub head_pitch: Option<f32>,
}

impl FocusSignals {
    pub fn measure(landmarks: &[Landmark], blendshapes: &Blendshapes) -> Self {
        let down = (blendshapes.get("eyeLookDownLeft") + blendshapes.get("eyeLookDownRight")) / 2.0;
        let up = (blendshapes.get("eyeLookUpLeft") + blendshapes.get("eyeLookUpRight")) / 2.0;
        let side = [
            "eyeLookInLeft",
            "eyeLookOutLeft",
            "eyeLookInRight",
            "eyeLookOutRight",
        ]
        .into_iter()
        .map(|name| blendshapes.get(name))
        .fold(0.0_f32, f32::max);

        Self {
            down,
            side,
            up,
            head_pitch: head_pitch_ratio(landmarks),
        }
    }
}

/// Vertical offset of the nose below the ear line, relative to face height.
pub fn head_pitch_ratio(landmarks: &[Landmark]) -> Option<f32> {
    let y = |idx: usize| landmarks.get(idx).map(|p| p.y);

    let nose = y(NOSE_TIP)?;
    let ears = (y(LEFT_EAR)? + y(RIGHT_EAR)?) / 2.0;
    let face_height = y(CHIN)? - y(TOP_HEAD)?;

    if face_height.abs() < MIN_FACE_HEIGHT {
        return None;
    }

    let ratio = (nose - ears) / face_height;
    ratio.is_finite().then_some(ratio)
}

struct Rule {
    label: &'static str,
    score: fn(&FocusSignals) -> Option<f32>,
    threshold: fn(&Thresholds) -> f32,
}

const RULES: [Rule; 4] = [
    Rule {
        label: "LOOKING DOWN",
        score: |s| Some(s.down),
        threshold: |t| t.down,
    },
    Rule {
        label: "LOOKING SIDE",
        score: |s| Some(s.side),
        threshold: |t| t.side,
    },
    Rule {
        label: "LOOKING UP",
        score: |s| Some(s.up),
        threshold: |t| t.up,
    },
    Rule {
        label: "HEAD DOWN",
        score: |s| s.head_pitch,
        threshold: |t| t.head_pitch,
    },
];

pub fn classify(landmarks: &[Landmark], blendshapes: &Blendshapes, thresholds: &Thresholds) -> Verdict {
    classify_signals(&FocusSignals::measure(landmarks, blendshapes), thresholds)
}

pub fn classify_signals(signals: &FocusSignals, thresholds: &Thresholds) -> Verdict {
    RULES
        .iter()
        .find_map(|rule| {
            let score = (rule.score)(signals)?;
            (score > (rule.threshold)(thresholds))
                .then(|| Verdict::distracted(format!("{} ({score:.2})", rule.label)))
        })
        .unwrap_or_else(Verdict::focused)
}
