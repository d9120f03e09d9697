//! Partition of the play field into stimulus regions.
//!
//! Each of the six regions is tied 1:1 to a stimulus channel by index. The
//! partition is fixed for a session; activation is recomputed every tick
//! from ball overlap.

use rallyloop_core::types::{RegionFlags, STIM_CHANNELS};
use serde::{Deserialize, Serialize};

use crate::collision::Rect;
use crate::types::FieldSize;

/// How the field is cut into regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLayout {
    /// Two columns, three rows, numbered row by row
    ///
    /// ```text
    /// 0 1
    /// 2 3
    /// 4 5
    /// ```
    #[default]
    Grid2x3,
    /// Two columns, three rows, with row `i mod 3`
    ///
    /// ```text
    /// 0 3
    /// 4 1
    /// 2 5
    /// ```
    Grid2x3Interleaved,
    /// Six full-width horizontal bands, top to bottom
    Strip1x6,
}

/// Vertical band of the field a region sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// Upper third
    Top = 0,
    /// Middle third
    Middle = 1,
    /// Lower third
    Bottom = 2,
}

impl Band {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Middle => "mid",
            Self::Bottom => "bot",
        }
    }
}

impl RegionLayout {
    /// Column and row of region `index`.
    const fn cell(self, index: usize) -> (usize, usize) {
        match self {
            Self::Grid2x3 => (index % 2, index / 2),
            Self::Grid2x3Interleaved => (index % 2, index % 3),
            Self::Strip1x6 => (0, index),
        }
    }

    const fn grid(self) -> (usize, usize) {
        match self {
            Self::Grid2x3 | Self::Grid2x3Interleaved => (2, 3),
            Self::Strip1x6 => (1, 6),
        }
    }

    /// Rectangle covered by region `index`.
    #[must_use]
    pub fn rect(self, index: usize, field: FieldSize) -> Rect {
        let (cols, rows) = self.grid();
        let (col, row) = self.cell(index);
        let w = field.w() / cols as f32;
        let h = field.h() / rows as f32;
        Rect::new(col as f32 * w, row as f32 * h, w, h)
    }

    /// All region rectangles in channel order.
    #[must_use]
    pub fn rects(self, field: FieldSize) -> [Rect; STIM_CHANNELS] {
        let mut out = [Rect::default(); STIM_CHANNELS];
        for (i, r) in out.iter_mut().enumerate() {
            *r = self.rect(i, field);
        }
        out
    }

    /// Vertical third of the field region `index` falls in.
    #[must_use]
    pub const fn band(self, index: usize) -> Band {
        let (_, rows) = self.grid();
        let (_, row) = self.cell(index);
        let third = row * 3 / rows;
        match third {
            0 => Band::Top,
            1 => Band::Middle,
            _ => Band::Bottom,
        }
    }

    /// Whether region `index` touches the paddle side (left edge) of the field.
    #[must_use]
    pub const fn on_paddle_side(self, index: usize) -> bool {
        self.cell(index).0 == 0
    }
}

/// Precomputed region rectangles for a field.
#[derive(Clone, Debug)]
pub struct RegionMap {
    layout: RegionLayout,
    rects: [Rect; STIM_CHANNELS],
}

impl RegionMap {
    /// Build the region map for a layout and field.
    #[must_use]
    pub fn new(layout: RegionLayout, field: FieldSize) -> Self {
        Self {
            layout,
            rects: layout.rects(field),
        }
    }

    /// Layout the map was built from.
    #[must_use]
    pub const fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Region rectangles in channel order.
    #[must_use]
    pub const fn rects(&self) -> &[Rect; STIM_CHANNELS] {
        &self.rects
    }

    /// Activation flag per region for an object occupying `bounds`.
    #[must_use]
    pub fn flags(&self, bounds: &Rect) -> RegionFlags {
        let mut flags = [false; STIM_CHANNELS];
        for (flag, region) in flags.iter_mut().zip(self.rects.iter()) {
            *flag = region.intersects(bounds);
        }
        flags
    }

    /// Bands of the active paddle-side regions, top to bottom.
    pub fn paddle_side_bands(&self, flags: &RegionFlags) -> impl Iterator<Item = Band> {
        let mut bands: [Option<Band>; 3] = [None; 3];
        for (i, &active) in flags.iter().enumerate() {
            if active && self.layout.on_paddle_side(i) {
                let band = self.layout.band(i);
                bands[band as usize] = Some(band);
            }
        }
        bands.into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: FieldSize = FieldSize::new(600, 300);

    #[test]
    fn test_grid_rects() {
        let rects = RegionLayout::Grid2x3.rects(FIELD);

        assert_eq!(rects[0], Rect::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(rects[1], Rect::new(300.0, 0.0, 300.0, 100.0));
        assert_eq!(rects[4], Rect::new(0.0, 200.0, 300.0, 100.0));
        assert_eq!(rects[5], Rect::new(300.0, 200.0, 300.0, 100.0));
    }

    #[test]
    fn test_interleaved_rects() {
        let rects = RegionLayout::Grid2x3Interleaved.rects(FIELD);

        assert_eq!(rects[0], Rect::new(0.0, 0.0, 300.0, 100.0));
        assert_eq!(rects[4], Rect::new(0.0, 100.0, 300.0, 100.0));
        assert_eq!(rects[2], Rect::new(0.0, 200.0, 300.0, 100.0));
        assert_eq!(rects[3], Rect::new(300.0, 0.0, 300.0, 100.0));
    }

    #[test]
    fn test_strip_rects() {
        let rects = RegionLayout::Strip1x6.rects(FIELD);
        assert_eq!(rects[5], Rect::new(0.0, 250.0, 600.0, 50.0));
        assert_eq!(RegionLayout::Strip1x6.band(1), Band::Top);
        assert_eq!(RegionLayout::Strip1x6.band(3), Band::Middle);
        assert_eq!(RegionLayout::Strip1x6.band(5), Band::Bottom);
    }

    #[test]
    fn test_regions_cover_field_once() {
        for layout in [
            RegionLayout::Grid2x3,
            RegionLayout::Grid2x3Interleaved,
            RegionLayout::Strip1x6,
        ] {
            let map = RegionMap::new(layout, FIELD);
            let probe = Rect::new(150.0, 150.0, 1.0, 1.0);
            let flags = map.flags(&probe);
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{layout:?}");
        }
    }

    #[test]
    fn test_ball_straddling_regions() {
        let map = RegionMap::new(RegionLayout::Grid2x3, FIELD);
        let ball = Rect::new(290.0, 90.0, 20.0, 20.0);
        let flags = map.flags(&ball);

        assert_eq!(flags, [true, true, true, true, false, false]);
    }

    #[test]
    fn test_paddle_side_bands() {
        let map = RegionMap::new(RegionLayout::Grid2x3Interleaved, FIELD);
        let flags = [true, false, false, false, true, false];
        let bands: Vec<Band> = map.paddle_side_bands(&flags).collect();

        assert_eq!(bands, vec![Band::Top, Band::Middle]);
    }
}
