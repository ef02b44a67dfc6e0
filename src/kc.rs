/*!
Per-pixel crop coefficient and crop evapotranspiration arithmetic.

Every function here is nodata aware: a pixel holding the sentinel in any
input holds the sentinel in the output, and the sentinel is written after the
arithmetic so that clamping or scaling never disturbs it.
*/
use crate::error::{EtError, Result};
use crate::raster::Grid;

pub const KC_SLOPE: f32 = 1.4;
pub const KC_INTERCEPT: f32 = -0.1;
pub const KC_MIN: f32 = 0.15;
pub const KC_MAX: f32 = 1.15;

// Sentinel-2 digital numbers to reflectance
const REFLECTANCE_SCALE: f32 = 10_000.0;

fn check_shape(expected: &Grid, found: &Grid) -> Result<()> {
    if expected.shape() != found.shape() {
        return Err(EtError::ShapeMismatch {
            expected: expected.shape(),
            found: found.shape(),
        });
    }
    Ok(())
}

// Crop coefficient from one vegetation index value, without nodata handling
pub fn kc_from_index(index: f32) -> f32 {
    (KC_SLOPE * index + KC_INTERCEPT).clamp(KC_MIN, KC_MAX)
}

/**
Derive the crop coefficient grid from a vegetation index grid.

`kc = clamp(1.4 * index - 0.1, 0.15, 1.15)`; pixels equal to `nodata` stay
`nodata`.
*/
pub fn kc_from_ndvi(ndvi: &Grid, nodata: f32) -> Grid {
    ndvi.map(|index| {
        let kc = kc_from_index(index);
        if index == nodata { nodata } else { kc }
    })
}

/**
Daily crop evapotranspiration: `kc * et0` broadcast over the grid, with
`nodata` pixels of the coefficient grid carried through.
*/
pub fn etc_from_kc(kc: &Grid, et0: f32, nodata: f32) -> Grid {
    kc.map(|k| {
        let etc = k * et0;
        if k == nodata { nodata } else { etc }
    })
}

/**
Time-weighted blend of two coefficient grids, `weight` being the fraction of
the way from `earlier` (0.0) to `later` (1.0).
*/
pub fn blend(earlier: &Grid, later: &Grid, weight: f32, nodata: f32) -> Result<Grid> {
    check_shape(earlier, later)?;
    Ok(earlier.zip_map(later, |a, b| {
        if a == nodata || b == nodata {
            nodata
        } else {
            a + (b - a) * weight
        }
    }))
}

/**
Normalized difference vegetation index from red and near-infrared bands in
digital numbers.

Both bands are scaled to reflectance, the index is clipped to [-1, 1], and
pixels with a zero denominator or a `nodata` band value become `nodata`.
*/
pub fn ndvi(red: &Grid, nir: &Grid, nodata: f32) -> Result<Grid> {
    check_shape(red, nir)?;
    Ok(red.zip_map(nir, |r, n| {
        if r == nodata || n == nodata {
            return nodata;
        }
        let (r, n) = (r / REFLECTANCE_SCALE, n / REFLECTANCE_SCALE);
        let denominator = n + r;
        if denominator == 0.0 || !denominator.is_finite() {
            nodata
        } else {
            ((n - r) / denominator).clamp(-1.0, 1.0)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::DEFAULT_NODATA as ND;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn kc_linear_inside_range() {
        let kc = kc_from_ndvi(&Grid::from_row_slice(1, 2, &[0.5, 0.2]), ND);
        assert_relative_eq!(kc[(0, 0)], 0.6, epsilon = 1e-6);
        assert_relative_eq!(kc[(0, 1)], 0.18, epsilon = 1e-6);
    }

    #[test]
    fn kc_clamps_extremes_but_keeps_nodata() {
        let kc = kc_from_ndvi(&Grid::from_row_slice(1, 3, &[5.0, -5.0, ND]), ND);
        assert_eq!(kc[(0, 0)], KC_MAX);
        assert_eq!(kc[(0, 1)], KC_MIN);
        assert_eq!(kc[(0, 2)], ND);
    }

    #[test]
    fn etc_scales_and_keeps_nodata() {
        let kc = Grid::from_row_slice(1, 3, &[0.5, 1.0, ND]);
        let etc = etc_from_kc(&kc, 4.0, ND);
        assert_eq!(etc[(0, 0)], 2.0);
        assert_eq!(etc[(0, 1)], 4.0);
        assert_eq!(etc[(0, 2)], ND);
    }

    #[test]
    fn zero_et0_gives_zero_etc_on_valid_pixels() {
        let kc = Grid::from_row_slice(1, 2, &[0.7, ND]);
        let etc = etc_from_kc(&kc, 0.0, ND);
        assert_eq!(etc[(0, 0)], 0.0);
        assert_eq!(etc[(0, 1)], ND);
    }

    #[test]
    fn blend_weights_and_propagates_nodata() {
        let a = Grid::from_row_slice(1, 2, &[0.2, ND]);
        let b = Grid::from_row_slice(1, 2, &[1.0, 0.5]);
        let mixed = blend(&a, &b, 0.25, ND).unwrap();
        assert_relative_eq!(mixed[(0, 0)], 0.4, epsilon = 1e-6);
        assert_eq!(mixed[(0, 1)], ND);
        assert!(blend(&a, &Grid::zeros(2, 2), 0.5, ND).is_err());
    }

    #[test]
    fn ndvi_from_bands() {
        let red = Grid::from_row_slice(1, 3, &[1000.0, 0.0, ND]);
        let nir = Grid::from_row_slice(1, 3, &[3000.0, 0.0, 2000.0]);
        let index = ndvi(&red, &nir, ND).unwrap();
        assert_relative_eq!(index[(0, 0)], 0.5, epsilon = 1e-6);
        assert_eq!(index[(0, 1)], ND);
        assert_eq!(index[(0, 2)], ND);
    }

    proptest! {
        #[test]
        fn kc_always_in_range_for_valid_index(index in -1.0e6f32..1.0e6f32) {
            prop_assume!(index != ND);
            let kc = kc_from_ndvi(&Grid::from_element(1, 1, index), ND)[(0, 0)];
            prop_assert!((KC_MIN..=KC_MAX).contains(&kc));
        }

        #[test]
        fn nodata_survives_kc_and_etc(et0 in 0.0f32..15.0) {
            let kc = kc_from_ndvi(&Grid::from_element(2, 2, ND), ND);
            let etc = etc_from_kc(&kc, et0, ND);
            prop_assert!(etc.iter().all(|&v| v == ND));
        }
    }
}
