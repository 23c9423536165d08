//! Sparse coordinates and bounds over the bounded dimension set.
//!
//! The wire encoding is a bitmask plus packed parallel arrays: bit `d - 1`
//! of the mask marks dimension code `d` as present, and the i-th set bit
//! (counted low to high) owns the i-th slot of the value arrays. The arrays
//! carry no per-entry tags, so encode and decode MUST walk dimensions in the
//! same order. [`Dimension::CANONICAL_ORDER`] is that order; both directions
//! of the codec iterate it and nothing else.

use crate::error::{Error, Result};
use crate::sys;

/// Closed enumeration of the addressable dimensions. Raw code 0 is the
/// invalid sentinel and has no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Dimension {
    /// Focus position.
    Z = 1,
    /// Channel.
    C = 2,
    /// Time point.
    T = 3,
    /// Rotation.
    R = 4,
    /// Scene.
    S = 5,
    /// Illumination.
    I = 6,
    /// Acquisition phase.
    H = 7,
    /// View angle.
    V = 8,
    /// Block.
    B = 9,
}

impl Dimension {
    /// The order in which dimensions are packed into and unpacked from the
    /// wire arrays: ascending raw code. This constant is the codec's
    /// ordering contract; any iteration feeding the mask/array pair must
    /// use it.
    pub const CANONICAL_ORDER: [Dimension; sys::MAX_DIMENSIONS] = [
        Dimension::Z,
        Dimension::C,
        Dimension::T,
        Dimension::R,
        Dimension::S,
        Dimension::I,
        Dimension::H,
        Dimension::V,
        Dimension::B,
    ];

    /// Map a raw dimension code; 0 (the invalid sentinel) and anything
    /// outside the closed set yield `None`.
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Z),
            2 => Some(Self::C),
            3 => Some(Self::T),
            4 => Some(Self::R),
            5 => Some(Self::S),
            6 => Some(Self::I),
            7 => Some(Self::H),
            8 => Some(Self::V),
            9 => Some(Self::B),
            _ => None,
        }
    }

    pub fn to_raw(self) -> i32 {
        self as i32
    }

    fn mask_bit(self) -> u32 {
        1 << (self as u32 - 1)
    }

    fn slot(self) -> usize {
        (self as usize) - 1
    }
}

/// Half-open extent along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i32,
    pub size: i32,
}

/// Sparse map from [`Dimension`] to an index value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coordinate {
    values: [Option<i32>; sys::MAX_DIMENSIONS],
}

impl Coordinate {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(dimension, value)` pairs. A dimension appearing twice is
    /// a construction error, rejected before anything is encoded.
    pub fn new<E>(entries: E) -> Result<Self>
    where
        E: IntoIterator<Item = (Dimension, i32)>,
    {
        let mut coord = Self::empty();
        for (dim, value) in entries {
            if coord.values[dim.slot()].is_some() {
                return Err(Error::DuplicateDimension(dim));
            }
            coord.values[dim.slot()] = Some(value);
        }
        Ok(coord)
    }

    pub fn get(&self, dim: Dimension) -> Option<i32> {
        self.values[dim.slot()]
    }

    /// Set or replace one dimension's value, returning the previous value.
    pub fn set(&mut self, dim: Dimension, value: i32) -> Option<i32> {
        self.values[dim.slot()].replace(value)
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    /// Present entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, i32)> + '_ {
        Dimension::CANONICAL_ORDER
            .iter()
            .filter_map(|&dim| self.values[dim.slot()].map(|v| (dim, v)))
    }

    /// Encode into the bitmask + packed array wire form.
    pub fn to_raw(&self) -> sys::CoordinateRaw {
        let mut raw = sys::CoordinateRaw::default();
        let mut next = 0;
        for dim in Dimension::CANONICAL_ORDER {
            if let Some(value) = self.values[dim.slot()] {
                raw.dim_mask |= dim.mask_bit();
                raw.values[next] = value;
                next += 1;
            }
        }
        raw
    }

    /// Decode the bitmask + packed array wire form, consuming one array slot
    /// per set bit in canonical order. A mask bit outside the closed
    /// dimension set is rejected.
    pub fn from_raw(raw: &sys::CoordinateRaw) -> Result<Self> {
        if raw.dim_mask >> sys::MAX_DIMENSIONS != 0 {
            return Err(Error::invalid_param(format!(
                "coordinate mask {:#x} has bits outside the dimension set",
                raw.dim_mask
            )));
        }
        let mut coord = Self::empty();
        let mut next = 0;
        for dim in Dimension::CANONICAL_ORDER {
            if raw.dim_mask & dim.mask_bit() != 0 {
                coord.values[dim.slot()] = Some(raw.values[next]);
                next += 1;
            }
        }
        Ok(coord)
    }
}

/// Sparse map from [`Dimension`] to an [`Interval`], wire-encoded like
/// [`Coordinate`] but with two parallel value arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionBounds {
    entries: [Option<Interval>; sys::MAX_DIMENSIONS],
}

impl DimensionBounds {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(dimension, interval)` pairs, rejecting duplicates.
    pub fn new<E>(entries: E) -> Result<Self>
    where
        E: IntoIterator<Item = (Dimension, Interval)>,
    {
        let mut bounds = Self::empty();
        for (dim, interval) in entries {
            if bounds.entries[dim.slot()].is_some() {
                return Err(Error::DuplicateDimension(dim));
            }
            bounds.entries[dim.slot()] = Some(interval);
        }
        Ok(bounds)
    }

    pub fn get(&self, dim: Dimension) -> Option<Interval> {
        self.entries[dim.slot()]
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|v| v.is_none())
    }

    /// Present entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, Interval)> + '_ {
        Dimension::CANONICAL_ORDER
            .iter()
            .filter_map(|&dim| self.entries[dim.slot()].map(|iv| (dim, iv)))
    }

    pub fn to_raw(&self) -> sys::DimBoundsRaw {
        let mut raw = sys::DimBoundsRaw::default();
        let mut next = 0;
        for dim in Dimension::CANONICAL_ORDER {
            if let Some(interval) = self.entries[dim.slot()] {
                raw.dim_mask |= dim.mask_bit();
                raw.start[next] = interval.start;
                raw.size[next] = interval.size;
                next += 1;
            }
        }
        raw
    }

    pub fn from_raw(raw: &sys::DimBoundsRaw) -> Result<Self> {
        if raw.dim_mask >> sys::MAX_DIMENSIONS != 0 {
            return Err(Error::invalid_param(format!(
                "bounds mask {:#x} has bits outside the dimension set",
                raw.dim_mask
            )));
        }
        let mut bounds = Self::empty();
        let mut next = 0;
        for dim in Dimension::CANONICAL_ORDER {
            if raw.dim_mask & dim.mask_bit() != 0 {
                bounds.entries[dim.slot()] = Some(Interval {
                    start: raw.start[next],
                    size: raw.size[next],
                });
                next += 1;
            }
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_ascending_raw_code() {
        let codes: Vec<i32> = Dimension::CANONICAL_ORDER
            .iter()
            .map(|d| d.to_raw())
            .collect();
        assert_eq!(codes, (1..=sys::MAX_DIMENSIONS as i32).collect::<Vec<_>>());
    }

    #[test]
    fn raw_code_round_trips() {
        for dim in Dimension::CANONICAL_ORDER {
            assert_eq!(Dimension::from_raw(dim.to_raw()), Some(dim));
        }
        assert_eq!(Dimension::from_raw(0), None);
        assert_eq!(Dimension::from_raw(10), None);
    }

    #[test]
    fn coordinate_round_trips_regardless_of_insertion_order() {
        // Entries arrive in non-canonical order on purpose.
        let coord = Coordinate::new([
            (Dimension::T, 17),
            (Dimension::Z, 3),
            (Dimension::B, -2),
            (Dimension::C, 0),
        ])
        .unwrap();
        let raw = coord.to_raw();
        assert_eq!(raw.dim_mask.count_ones() as usize, coord.len());
        let decoded = Coordinate::from_raw(&raw).unwrap();
        assert_eq!(decoded, coord);
    }

    #[test]
    fn packed_values_follow_canonical_order_not_insertion_order() {
        let coord = Coordinate::new([(Dimension::S, 50), (Dimension::Z, 10)]).unwrap();
        let raw = coord.to_raw();
        // Z (code 1) packs before S (code 5) even though S arrived first.
        assert_eq!(raw.values[0], 10);
        assert_eq!(raw.values[1], 50);
    }

    #[test]
    fn empty_coordinate_encodes_to_zero_mask() {
        let raw = Coordinate::empty().to_raw();
        assert_eq!(raw.dim_mask, 0);
        assert_eq!(Coordinate::from_raw(&raw).unwrap(), Coordinate::empty());
    }

    #[test]
    fn full_coordinate_round_trips() {
        let coord = Coordinate::new(
            Dimension::CANONICAL_ORDER
                .iter()
                .map(|&d| (d, d.to_raw() * 100)),
        )
        .unwrap();
        assert_eq!(coord.len(), sys::MAX_DIMENSIONS);
        let decoded = Coordinate::from_raw(&coord.to_raw()).unwrap();
        assert_eq!(decoded, coord);
    }

    #[test]
    fn duplicate_dimension_is_a_construction_error() {
        let err = Coordinate::new([(Dimension::C, 1), (Dimension::C, 2)]).unwrap_err();
        assert!(matches!(err, Error::DuplicateDimension(Dimension::C)));
    }

    #[test]
    fn stray_mask_bit_is_rejected() {
        let raw = sys::CoordinateRaw {
            dim_mask: 1 << sys::MAX_DIMENSIONS,
            ..Default::default()
        };
        assert!(Coordinate::from_raw(&raw).is_err());
    }

    #[test]
    fn bounds_round_trip() {
        let bounds = DimensionBounds::new([
            (Dimension::C, Interval { start: 0, size: 4 }),
            (Dimension::Z, Interval { start: -5, size: 11 }),
        ])
        .unwrap();
        let raw = bounds.to_raw();
        // Z packs first.
        assert_eq!(raw.start[0], -5);
        assert_eq!(raw.size[0], 11);
        assert_eq!(raw.start[1], 0);
        assert_eq!(raw.size[1], 4);
        assert_eq!(DimensionBounds::from_raw(&raw).unwrap(), bounds);
    }

    #[test]
    fn bounds_duplicate_rejected() {
        let iv = Interval { start: 0, size: 1 };
        let err = DimensionBounds::new([(Dimension::V, iv), (Dimension::V, iv)]).unwrap_err();
        assert!(matches!(err, Error::DuplicateDimension(Dimension::V)));
    }
}
