/// A candidate face rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Detection {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Center point, floor-divided.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Axis-aligned square crop, always fully inside its source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareRegion {
    pub left: u32,
    pub top: u32,
    pub side: u32,
}

impl SquareRegion {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.left + self.side
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.top + self.side
    }

    /// Whether the square lies within a `width` × `height` image.
    pub fn contains_in(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_area_and_center() {
        let d = Detection::new(10, 20, 31, 41);
        assert_eq!(d.area(), 31 * 41);
        assert_eq!(d.center(), (25, 40));
    }

    #[test]
    fn test_area_does_not_overflow() {
        let d = Detection::new(0, 0, u32::MAX, 2);
        assert_eq!(d.area(), u32::MAX as u64 * 2);
    }

    #[test]
    fn test_square_region_edges() {
        let r = SquareRegion { left: 5, top: 0, side: 10 };
        assert_eq!(r.right(), 15);
        assert_eq!(r.bottom(), 10);
        assert!(r.contains_in(15, 10));
        assert!(!r.contains_in(14, 10));
    }
}
