//! Common geometry shared by the decode crates.
//!
//! [`Rect`] describes a screen rectangle in framebuffer coordinates. It can
//! check containment in a surface of a given size without overflowing, and
//! walk itself in fixed-size tiles in row-major order (used by Hextile).

/// A rectangle defined by top-left position and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true when the rectangle lies entirely inside a `width` x `height`
    /// surface anchored at the origin.
    ///
    /// Edges are computed in 64-bit so hostile coordinates cannot wrap.
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    /// Iterate over the rectangle in `tile` x `tile` pieces, left to right then
    /// top to bottom. Edge tiles are clipped to the rectangle.
    pub fn tiles(&self, tile: u32) -> Tiles {
        Tiles {
            area: *self,
            tile: tile.max(1),
            col: 0,
            row: 0,
        }
    }
}

/// Row-major tile iterator returned by [`Rect::tiles`].
#[derive(Debug, Clone)]
pub struct Tiles {
    area: Rect,
    tile: u32,
    col: u32,
    row: u32,
}

impl Iterator for Tiles {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.area.is_empty() || self.row >= self.area.height {
            return None;
        }

        let w = self.tile.min(self.area.width - self.col);
        let h = self.tile.min(self.area.height - self.row);
        let tile = Rect::new(
            self.area.x + self.col as i32,
            self.area.y + self.row as i32,
            w,
            h,
        );

        self.col += w;
        if self.col >= self.area.width {
            self.col = 0;
            self.row += h;
        }
        Some(tile)
    }
}
