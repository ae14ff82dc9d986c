//! Capture area descriptors
//!
//! A `Region` is an absolute rectangle on the virtual desktop. Coordinates may be
//! negative (monitors left of or above the primary one).

use std::fmt;
use std::str::FromStr;

/// Errors produced when building a region from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    ZeroDimension,
    Malformed(String),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::ZeroDimension => write!(f, "Region has zero width or height"),
            RegionError::Malformed(input) => write!(
                f,
                "Invalid region '{}', expected left,top,width,height",
                input
            ),
        }
    }
}

impl std::error::Error for RegionError {}

/// Absolute desktop rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Result<Self, RegionError> {
        if width == 0 || height == 0 {
            return Err(RegionError::ZeroDimension);
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// Overlapping part of two rectangles, or `None` when they don't touch.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let left = (self.left as i64).max(other.left as i64);
        let top = (self.top as i64).max(other.top as i64);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            return None;
        }

        Some(Region {
            left: left as i32,
            top: top as i32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    /// Clips this region to `outer` and expresses it in `outer`'s local coordinates.
    pub fn relative_to(&self, outer: &Region) -> Option<Region> {
        let clipped = self.intersect(outer)?;
        Some(Region {
            left: clipped.left - outer.left,
            top: clipped.top - outer.top,
            width: clipped.width,
            height: clipped.height,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.left, self.top
        )
    }
}

impl FromStr for Region {
    type Err = RegionError;

    /// Parses `left,top,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RegionError::Malformed(s.to_string());

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(malformed());
        }

        let left = parts[0].parse::<i32>().map_err(|_| malformed())?;
        let top = parts[1].parse::<i32>().map_err(|_| malformed())?;
        let width = parts[2].parse::<u32>().map_err(|_| malformed())?;
        let height = parts[3].parse::<u32>().map_err(|_| malformed())?;

        Region::new(left, top, width, height)
    }
}

/// What a capture sub-run grabs each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Region(Region),
    /// Whole monitor by enumeration index.
    Monitor(usize),
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Region(region) => write!(f, "region {}", region),
            CaptureTarget::Monitor(index) => write!(f, "monitor {}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_rejected() {
        assert_eq!(Region::new(0, 0, 0, 10), Err(RegionError::ZeroDimension));
        assert_eq!(Region::new(0, 0, 10, 0), Err(RegionError::ZeroDimension));
    }

    #[test]
    fn parse_accepts_negative_origin() {
        let region: Region = "-1920, 40, 800, 600".parse().unwrap();
        assert_eq!(region, Region::new(-1920, 40, 800, 600).unwrap());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "10,10,abc,5".parse::<Region>(),
            Err(RegionError::Malformed(_))
        ));
        assert!(matches!(
            "10,10,5".parse::<Region>(),
            Err(RegionError::Malformed(_))
        ));
        assert_eq!(
            "10,10,0,5".parse::<Region>(),
            Err(RegionError::ZeroDimension)
        );
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let monitor = Region::new(0, 0, 1920, 1080).unwrap();
        let region = Region::new(1800, 1000, 400, 400).unwrap();
        assert_eq!(
            region.intersect(&monitor),
            Some(Region::new(1800, 1000, 120, 80).unwrap())
        );
    }

    #[test]
    fn disjoint_regions_do_not_intersect() {
        let a = Region::new(0, 0, 100, 100).unwrap();
        let b = Region::new(100, 0, 100, 100).unwrap();
        assert_eq!(a.intersect(&b), None);
    }

    #[test]
    fn relative_to_translates_into_monitor_space() {
        let secondary = Region::new(-1280, 0, 1280, 1024).unwrap();
        let region = Region::new(-1000, 100, 200, 150).unwrap();
        assert_eq!(
            region.relative_to(&secondary),
            Some(Region::new(280, 100, 200, 150).unwrap())
        );
    }
}
