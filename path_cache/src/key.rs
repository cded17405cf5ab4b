// Copyright 2026 the GPU Cache Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path mask cache key.

use core::hash::{BuildHasher, Hasher};
use foldhash::fast::FixedState;

use crate::kurbo::{Affine, BezPath, PathEl, Point, Vec2};
use crate::peniko::Fill;

#[cfg(not(feature = "std"))]
use crate::kurbo::common::FloatFuncs as _;

/// Number of sub-pixel quantization buckets per axis.
///
/// Translations that land in the same bucket share a mask.
pub const SUBPIXEL_BUCKETS: u8 = 4;

const GEOMETRY_HASH_SEED: u64 = 0x7061_7468_5f67_656f;

/// Stable identity of a path's geometry.
///
/// Either hashed from the path's verbs and points with
/// [`GeometryId::from_path`], or supplied by a caller that already tracks path
/// identity (for example a generation counter bumped on every edit).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u64);

impl GeometryId {
    /// Hashes the verbs and points of `path`.
    ///
    /// Equal paths hash equally across runs. `-0.0` and `0.0` are treated as
    /// the same coordinate.
    pub fn from_path(path: &BezPath) -> Self {
        let mut hasher = FixedState::with_seed(GEOMETRY_HASH_SEED).build_hasher();
        for element in path.elements() {
            match *element {
                PathEl::MoveTo(p) => {
                    hasher.write_u8(0);
                    hash_point(&mut hasher, p);
                }
                PathEl::LineTo(p) => {
                    hasher.write_u8(1);
                    hash_point(&mut hasher, p);
                }
                PathEl::QuadTo(p1, p2) => {
                    hasher.write_u8(2);
                    hash_point(&mut hasher, p1);
                    hash_point(&mut hasher, p2);
                }
                PathEl::CurveTo(p1, p2, p3) => {
                    hasher.write_u8(3);
                    hash_point(&mut hasher, p1);
                    hash_point(&mut hasher, p2);
                    hash_point(&mut hasher, p3);
                }
                PathEl::ClosePath => hasher.write_u8(4),
            }
        }
        Self(hasher.finish())
    }
}

/// How a transform affects the pixels of a mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransformClass {
    /// A pure translation. Only its sub-pixel part matters.
    Translate,
    /// Any other affine transform, identified by the exact bits of its
    /// linear part (`[a, b, c, d]` as `f32`).
    General {
        /// The linear coefficients as `f32` bit patterns.
        matrix: [u32; 4],
    },
}

/// A device transform split into the part that shapes a mask and the integer
/// translation that only moves it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MaskTransform {
    class: TransformClass,
    linear: [f64; 4],
    subpixel: [u8; 2],
    integer_translate: (i32, i32),
}

impl MaskTransform {
    /// Splits `transform`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the key stores the linear part at f32 precision on purpose"
    )]
    pub fn new(transform: Affine) -> Self {
        let [a, b, c, d, e, f] = transform.as_coeffs();
        let class = if a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0 {
            TransformClass::Translate
        } else {
            TransformClass::General {
                matrix: [a, b, c, d].map(|v| canonical_f32_bits(v as f32)),
            }
        };
        let (ix, sx) = split_translation(e);
        let (iy, sy) = split_translation(f);
        Self {
            class,
            linear: [a, b, c, d],
            subpixel: [sx, sy],
            integer_translate: (ix, iy),
        }
    }

    /// The transform class.
    #[inline]
    pub fn class(&self) -> TransformClass {
        self.class
    }

    /// Quantized sub-pixel translation, each in `0..SUBPIXEL_BUCKETS`.
    #[inline]
    pub fn subpixel(&self) -> [u8; 2] {
        self.subpixel
    }

    /// The whole-pixel part of the translation.
    #[inline]
    pub fn integer_translate(&self) -> (i32, i32) {
        self.integer_translate
    }

    /// The transform a mask is actually rendered with: the original linear
    /// part and the translation snapped to its sub-pixel bucket.
    pub fn quantized(&self) -> Affine {
        let [a, b, c, d] = self.linear;
        let (ix, iy) = self.integer_translate;
        let offset = Vec2::new(
            f64::from(ix) + subpixel_offset(self.subpixel[0]),
            f64::from(iy) + subpixel_offset(self.subpixel[1]),
        );
        Affine::new([a, b, c, d, offset.x, offset.y])
    }
}

/// Fingerprint of a rasterized mask.
///
/// Two draws with equal keys produce masks that differ at most by a
/// whole-pixel translation, so one cached mask serves both.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathCacheKey {
    geometry: GeometryId,
    even_odd: bool,
    class: TransformClass,
    subpixel: [u8; 2],
}

impl PathCacheKey {
    /// Builds a key from a geometry identity, fill rule and split transform.
    pub fn new(geometry: GeometryId, fill: Fill, transform: &MaskTransform) -> Self {
        Self {
            geometry,
            even_odd: matches!(fill, Fill::EvenOdd),
            class: transform.class,
            subpixel: transform.subpixel,
        }
    }

    /// Hashes `path` and splits `transform`, returning the key and the split
    /// transform needed to place the mask.
    pub fn for_path(path: &BezPath, fill: Fill, transform: Affine) -> (Self, MaskTransform) {
        let mask_transform = MaskTransform::new(transform);
        let key = Self::new(GeometryId::from_path(path), fill, &mask_transform);
        (key, mask_transform)
    }

    /// The geometry identity.
    #[inline]
    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    /// The fill rule.
    #[inline]
    pub fn fill(&self) -> Fill {
        if self.even_odd {
            Fill::EvenOdd
        } else {
            Fill::NonZero
        }
    }

    /// The transform class.
    #[inline]
    pub fn class(&self) -> TransformClass {
        self.class
    }

    /// The quantized sub-pixel translation.
    #[inline]
    pub fn subpixel(&self) -> [u8; 2] {
        self.subpixel
    }
}

/// Returns the sub-pixel offset value for a quantized bucket.
#[inline]
pub(crate) fn subpixel_offset(quantized: u8) -> f64 {
    f64::from(quantized) / f64::from(SUBPIXEL_BUCKETS)
}

/// Splits a translation into whole pixels and a sub-pixel bucket.
///
/// Rounding up into the next pixel carries into the integer part.
#[expect(
    clippy::cast_possible_truncation,
    reason = "bucket is below SUBPIXEL_BUCKETS + 1 and pixel offsets saturate at i32 range"
)]
fn split_translation(value: f64) -> (i32, u8) {
    if !value.is_finite() {
        return (0, 0);
    }
    let whole = value.floor();
    let bucket = ((value - whole) * f64::from(SUBPIXEL_BUCKETS) + 0.5) as u8;
    let whole = whole as i32;
    if bucket >= SUBPIXEL_BUCKETS {
        (whole.saturating_add(1), 0)
    } else {
        (whole, bucket)
    }
}

#[inline]
fn canonical_f32_bits(value: f32) -> u32 {
    (value + 0.0).to_bits()
}

#[inline]
fn hash_point(hasher: &mut impl Hasher, point: Point) {
    hasher.write_u64((point.x + 0.0).to_bits());
    hasher.write_u64((point.y + 0.0).to_bits());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::{Rect, Shape};

    fn square() -> BezPath {
        Rect::new(0.0, 0.0, 10.0, 10.0).to_path(0.1)
    }

    #[test]
    fn split_translation_buckets() {
        assert_eq!(split_translation(0.0), (0, 0));
        assert_eq!(split_translation(0.1), (0, 0));
        assert_eq!(split_translation(0.2), (0, 1));
        assert_eq!(split_translation(0.5), (0, 2));
        assert_eq!(split_translation(0.75), (0, 3));
        assert_eq!(split_translation(0.9), (1, 0));
        assert_eq!(split_translation(3.25), (3, 1));
        assert_eq!(split_translation(-0.25), (-1, 3));
        assert_eq!(split_translation(f64::NAN), (0, 0));
    }

    #[test]
    fn integer_translation_shares_key() {
        let path = square();
        let (a, ta) = PathCacheKey::for_path(&path, Fill::NonZero, Affine::translate((5.0, 7.0)));
        let (b, tb) =
            PathCacheKey::for_path(&path, Fill::NonZero, Affine::translate((105.0, -3.0)));
        assert_eq!(a, b);
        assert_eq!(a.class(), TransformClass::Translate);
        assert_eq!(ta.integer_translate(), (5, 7));
        assert_eq!(tb.integer_translate(), (105, -3));
    }

    #[test]
    fn subpixel_translation_splits_key() {
        let path = square();
        let (a, _) = PathCacheKey::for_path(&path, Fill::NonZero, Affine::translate((5.0, 0.0)));
        let (b, _) = PathCacheKey::for_path(&path, Fill::NonZero, Affine::translate((5.5, 0.0)));
        assert_ne!(a, b);
    }

    #[test]
    fn scale_and_fill_split_key() {
        let path = square();
        let (plain, _) = PathCacheKey::for_path(&path, Fill::NonZero, Affine::IDENTITY);
        let (scaled, _) = PathCacheKey::for_path(&path, Fill::NonZero, Affine::scale(2.0));
        let (even_odd, _) = PathCacheKey::for_path(&path, Fill::EvenOdd, Affine::IDENTITY);
        assert_ne!(plain, scaled);
        assert_ne!(plain, even_odd);
        assert_eq!(even_odd.fill(), Fill::EvenOdd);
        assert!(matches!(scaled.class(), TransformClass::General { .. }));
    }

    #[test]
    fn geometry_is_content_derived() {
        assert_eq!(
            GeometryId::from_path(&square()),
            GeometryId::from_path(&square())
        );
        let other = Rect::new(0.0, 0.0, 10.0, 11.0).to_path(0.1);
        assert_ne!(
            GeometryId::from_path(&square()),
            GeometryId::from_path(&other)
        );
    }

    #[test]
    fn quantized_snaps_translation() {
        let transform = MaskTransform::new(Affine::translate((2.3, 4.6)));
        assert_eq!(
            transform.quantized().as_coeffs(),
            [1.0, 0.0, 0.0, 1.0, 2.25, 4.5]
        );
    }
}
