/// Translates numeric bearings to 16/8-point compass rose names. (N, WNW, etc.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

/// Clockwise from north, one entry per 22.5°.
const ROSE: [Direction; 16] = [
    Direction::N,
    Direction::NNE,
    Direction::NE,
    Direction::ENE,
    Direction::E,
    Direction::ESE,
    Direction::SE,
    Direction::SSE,
    Direction::S,
    Direction::SSW,
    Direction::SW,
    Direction::WSW,
    Direction::W,
    Direction::WNW,
    Direction::NW,
    Direction::NNW,
];

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::N => "north",
            Direction::NNE => "north-northeast",
            Direction::NE => "northeast",
            Direction::ENE => "east-northeast",
            Direction::E => "east",
            Direction::ESE => "east-southeast",
            Direction::SE => "southeast",
            Direction::SSE => "south-southeast",
            Direction::S => "south",
            Direction::SSW => "south-southwest",
            Direction::SW => "southwest",
            Direction::WSW => "west-southwest",
            Direction::W => "west",
            Direction::WNW => "west-northwest",
            Direction::NW => "northwest",
            Direction::NNW => "north-northwest",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NNE => "NNE",
            Direction::NE => "NE",
            Direction::ENE => "ENE",
            Direction::E => "E",
            Direction::ESE => "ESE",
            Direction::SE => "SE",
            Direction::SSE => "SSE",
            Direction::S => "S",
            Direction::SSW => "SSW",
            Direction::SW => "SW",
            Direction::WSW => "WSW",
            Direction::W => "W",
            Direction::WNW => "WNW",
            Direction::NW => "NW",
            Direction::NNW => "NNW",
        }
    }
}

/// Wrap any angle into [0, 360) for a human-readable readout.
pub fn normalize_degrees(angle: f64) -> f64 {
    let normalized = angle.rem_euclid(360.0);
    // rem_euclid of a tiny negative rounds up to exactly 360.0
    if normalized >= 360.0 { 0.0 } else { normalized }
}

fn sector(heading: f64, points: usize) -> usize {
    let width = 360.0 / points as f64;
    ((heading + width / 2.0) / width) as usize % points
}

/// Converts the heading to a 16-point compass direction.
pub fn heading_to_direction_16point(heading: f64) -> (Direction, f64) {
    let normalized = normalize_degrees(heading);
    (ROSE[sector(normalized, 16)], normalized)
}

/// Convert the heading to a 8-point compass direction.
pub fn heading_to_direction_8point(heading: f64) -> (Direction, f64) {
    let normalized = normalize_degrees(heading);
    (ROSE[sector(normalized, 8) * 2], normalized)
}
