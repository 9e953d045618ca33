use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Region containing this position for regions `size` blocks wide.
    #[inline]
    pub fn region(self, size: i32) -> RegionCoord {
        RegionCoord::new(self.x.div_euclid(size), self.z.div_euclid(size))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Column-aligned spatial partition. Regions span the full world height.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RegionCoord {
    pub rx: i32,
    pub rz: i32,
}

impl RegionCoord {
    #[inline]
    pub const fn new(rx: i32, rz: i32) -> Self {
        Self { rx, rz }
    }

    #[inline]
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            rx: self.rx + dx,
            rz: self.rz + dz,
        }
    }

    #[inline]
    pub fn contains(self, pos: BlockPos, size: i32) -> bool {
        pos.region(size) == self
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.rx, self.rz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_positions_floor_into_regions() {
        assert_eq!(BlockPos::new(0, 64, 0).region(512), RegionCoord::new(0, 0));
        assert_eq!(BlockPos::new(511, 0, 511).region(512), RegionCoord::new(0, 0));
        assert_eq!(BlockPos::new(-1, 0, 512).region(512), RegionCoord::new(-1, 1));
        assert_eq!(BlockPos::new(-512, 0, -513).region(512), RegionCoord::new(-1, -2));
        assert!(RegionCoord::new(-1, 1).contains(BlockPos::new(-1, 5, 700), 512));
    }
}
