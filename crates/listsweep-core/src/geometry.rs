use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Parses the `"[l,t][r,b]"` form used by tree dumps. Returns `None` for anything
    /// malformed or inverted.
    pub fn parse(raw: &str) -> Option<Self> {
        static BOUNDS: OnceLock<Regex> = OnceLock::new();
        let re = BOUNDS.get_or_init(|| {
            Regex::new(r"^\s*\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]\s*$")
                .expect("bounds pattern is valid")
        });
        let caps = re.captures(raw)?;
        let coord = |idx: usize| caps.get(idx)?.as_str().parse::<i32>().ok();
        let rect = Self::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?);
        if rect.right < rect.left || rect.bottom < rect.top {
            return None;
        }
        Some(rect)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.left + self.width() / 2,
            y: self.top + self.height() / 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}
