use serde::{Deserialize, Serialize};

/// A point on the shared 2D map.
///
/// Missing coordinates decode as `0.0`, so `{"x": 3}` is the point `(3, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Where every new session starts.
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
