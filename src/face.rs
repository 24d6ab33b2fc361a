//! Per-frame face data produced by the landmark model.

use std::collections::HashMap;

use opencv::core::Rect;

pub const NOSE_TIP: usize = 1;
pub const TOP_HEAD: usize = 10;
pub const CHIN: usize = 152;
pub const LEFT_EAR: usize = 234;
pub const RIGHT_EAR: usize = 454;

pub const LEFT_EYE: [usize; 8] = [33, 133, 160, 159, 158, 144, 145, 153];
pub const RIGHT_EYE: [usize; 8] = [362, 263, 387, 386, 385, 373, 374, 380];

/// Blendshape categories in model output order.
pub const BLENDSHAPE_NAMES: [&str; 52] = [
    "_neutral",
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "eyeWideLeft",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawOpen",
    "jawRight",
    "mouthClose",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthFunnel",
    "mouthLeft",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthPucker",
    "mouthRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "noseSneerLeft",
    "noseSneerRight",
];

/// A landmark in coordinates normalized to the frame size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Named blendshape intensities. Unknown names read as 0.
#[derive(Debug, Clone, Default)]
pub struct Blendshapes {
    scores: HashMap<String, f32>,
}

impl Blendshapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs scores with [`BLENDSHAPE_NAMES`] by position.
    pub fn from_scores(scores: &[f32]) -> Self {
        BLENDSHAPE_NAMES
            .iter()
            .zip(scores)
            .map(|(name, score)| (*name, *score))
            .collect()
    }

    pub fn get(&self, name: &str) -> f32 {
        self.scores.get(name).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, f32)> for Blendshapes {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        Self {
            scores: iter
                .into_iter()
                .map(|(name, score)| (name.to_string(), score))
                .collect(),
        }
    }
}

/// The single face the landmark model reports for a frame.
#[derive(Debug, Clone, Default)]
pub struct FaceResult {
    pub landmarks: Vec<Landmark>,
    pub blendshapes: Blendshapes,
}

/// Axis-aligned pixel bounds of the given landmarks, or `None` if any index is missing.
pub fn eye_bbox(landmarks: &[Landmark], indices: &[usize], width: i32, height: i32) -> Option<Rect> {
    let mut points = indices.iter().map(|&i| {
        landmarks
            .get(i)
            .map(|p| ((p.x * width as f32) as i32, (p.y * height as f32) as i32))
    });

    let (x0, y0) = points.next()??;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (x0, x0, y0, y0);
    for point in points {
        let (x, y) = point?;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}
