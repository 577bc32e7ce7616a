//! Fixed catalog of viewing-direction presets.
//!
//! A preset is an ordered list of yaw/pitch/roll angles in degrees. Every
//! input file is rendered once per direction, in catalog order.

use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Transform {
    pub const fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Transform { yaw, pitch, roll }
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "yaw={} pitch={} roll={}", self.yaw, self.pitch, self.roll)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectionPreset {
    pub id: String,
    pub transforms: Vec<Transform>,
}

impl DirectionPreset {
    /// Looks `id` up in the catalog. Unknown ids produce a preset with no
    /// transforms; starting a job with one is a configuration error.
    pub fn resolve(id: &str) -> Self {
        DirectionPreset {
            id: String::from(id),
            transforms: resolve(id).to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

pub struct CatalogEntry {
    pub id: &'static str,
    pub description: &'static str,
    pub transforms: &'static [Transform],
}

const fn t(yaw: f64, pitch: f64) -> Transform {
    Transform::new(yaw, pitch, 0.0)
}

pub const DEFAULT_PRESET: &str = "6_h3_45";

pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "1",
        description: "front only",
        transforms: &[t(0.0, 0.0)],
    },
    CatalogEntry {
        id: "2",
        description: "2 directions (front, front -45)",
        transforms: &[t(0.0, 0.0), t(0.0, -45.0)],
    },
    CatalogEntry {
        id: "4_h1_45",
        description: "4 directions (front, 3 x -45)",
        transforms: &[t(0.0, 0.0), t(-60.0, -45.0), t(60.0, -45.0), t(180.0, -45.0)],
    },
    CatalogEntry {
        id: "6_h3_45",
        description: "6 directions (3 horizontal, 3 x -45)",
        transforms: &[
            t(0.0, 0.0),
            t(-120.0, 0.0),
            t(120.0, 0.0),
            t(-60.0, -45.0),
            t(60.0, -45.0),
            t(180.0, -45.0),
        ],
    },
    CatalogEntry {
        id: "9_h3_45x2",
        description: "9 directions (3 horizontal, 3 x -45, 3 x +45)",
        transforms: &[
            t(0.0, 0.0),
            t(-120.0, 0.0),
            t(120.0, 0.0),
            t(-60.0, -45.0),
            t(60.0, -45.0),
            t(180.0, -45.0),
            t(-60.0, 45.0),
            t(60.0, 45.0),
            t(180.0, 45.0),
        ],
    },
    CatalogEntry {
        id: "5_down",
        description: "5 directions (straight down, 4 horizontal)",
        transforms: &[t(0.0, -90.0), t(-90.0, 0.0), t(0.0, 0.0), t(90.0, 0.0), t(180.0, 0.0)],
    },
    CatalogEntry {
        id: "8_20",
        description: "8 directions (4 x -20, 4 x +20)",
        transforms: &[
            t(0.0, -20.0),
            t(-90.0, -20.0),
            t(90.0, -20.0),
            t(180.0, -20.0),
            t(0.0, 20.0),
            t(-90.0, 20.0),
            t(90.0, 20.0),
            t(180.0, 20.0),
        ],
    },
    CatalogEntry {
        id: "8",
        description: "8 directions (4 horizontal, 4 x -45 diagonals)",
        transforms: &[
            t(-90.0, 0.0),
            t(0.0, 0.0),
            t(90.0, 0.0),
            t(180.0, 0.0),
            t(-45.0, -45.0),
            t(45.0, -45.0),
            t(135.0, -45.0),
            t(-135.0, -45.0),
        ],
    },
    CatalogEntry {
        id: "12",
        description: "12 directions (4 horizontal, 4 x +45, 4 x -45)",
        transforms: &[
            t(-90.0, 0.0),
            t(0.0, 0.0),
            t(90.0, 0.0),
            t(180.0, 0.0),
            t(-135.0, 45.0),
            t(-45.0, 45.0),
            t(45.0, 45.0),
            t(135.0, 45.0),
            t(-135.0, -45.0),
            t(-45.0, -45.0),
            t(45.0, -45.0),
            t(135.0, -45.0),
        ],
    },
];

pub fn resolve(id: &str) -> &'static [Transform] {
    CATALOG
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| entry.transforms)
        .unwrap_or(&[])
}
