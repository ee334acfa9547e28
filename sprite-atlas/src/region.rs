use crate::layout::AtlasLayout;

/// Where a sprite lives in the atlas: the array layer plus the UV rectangle
/// to sample it with.
///
/// The UV bounds are inset by half a texel on every edge so that bilinear
/// neighbors of adjacent cells never bleed into the sample. `pixel_x` and
/// `pixel_y` keep the exact cell origin so the slot can later be returned to
/// the free list without a float round-trip.
///
/// The atlas keeps no record of issued regions: the caller owns the handle
/// until it passes it back to `SpriteAtlas::free_slot`. A region held across
/// a free-and-reallocate of the same cell aliases the new occupant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    /// Layer in the texture array.
    pub layer: u32,
    /// Cell origin X in the atlas layer, in texels.
    pub pixel_x: u32,
    /// Cell origin Y in the atlas layer, in texels.
    pub pixel_y: u32,
    /// UV left.
    pub u_min: f32,
    /// UV top.
    pub v_min: f32,
    /// UV right.
    pub u_max: f32,
    /// UV bottom.
    pub v_max: f32,
}

impl Region {
    pub(crate) fn new(layout: &AtlasLayout, layer: u32, pixel_x: u32, pixel_y: u32) -> Self {
        let atlas_size = layout.atlas_size() as f32;
        let sprite_size = layout.sprite_size();
        let half_texel = 0.5 / atlas_size;

        Self {
            layer,
            pixel_x,
            pixel_y,
            u_min: pixel_x as f32 / atlas_size + half_texel,
            v_min: pixel_y as f32 / atlas_size + half_texel,
            u_max: (pixel_x + sprite_size) as f32 / atlas_size - half_texel,
            v_max: (pixel_y + sprite_size) as f32 / atlas_size - half_texel,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::layout::SpriteAtlasDescriptor;

    #[test]
    fn uv_bounds_are_inset_by_half_a_texel() {
        let layout = AtlasLayout::new(SpriteAtlasDescriptor::default()).unwrap();
        let region = Region::new(&layout, 0, 0, 0);

        let half_texel = 0.5 / 4096.0;
        assert_eq!(region.layer, 0);
        assert_eq!(region.pixel_x, 0);
        assert_eq!(region.pixel_y, 0);
        assert!((region.u_min - half_texel).abs() < f32::EPSILON);
        assert!((region.v_min - half_texel).abs() < f32::EPSILON);
        assert!((region.u_max - (32.0 - 0.5) / 4096.0).abs() < f32::EPSILON);
        assert!((region.v_max - (32.0 - 0.5) / 4096.0).abs() < f32::EPSILON);
    }

    #[test]
    fn uv_bounds_track_the_cell_origin() {
        let layout = AtlasLayout::new(SpriteAtlasDescriptor::default()).unwrap();
        let region = Region::new(&layout, 3, 96, 2048);

        assert_eq!(region.layer, 3);
        assert!((region.u_min - (96.0 + 0.5) / 4096.0).abs() < f32::EPSILON);
        assert!((region.v_min - (2048.0 + 0.5) / 4096.0).abs() < f32::EPSILON);
        assert!((region.u_max - (128.0 - 0.5) / 4096.0).abs() < f32::EPSILON);
        assert!((region.v_max - (2080.0 - 0.5) / 4096.0).abs() < f32::EPSILON);
        assert!(region.u_min < region.u_max);
        assert!(region.v_min < region.v_max);
    }
}
