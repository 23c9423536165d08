//! Two-phase fetch of the variable-length statistics record.
//!
//! The record is a fixed header followed by one trailing entry per scene,
//! and the scene count is unknown before the call. The protocol is: try a
//! small fixed capacity first, let the native side report the actual count
//! through the in/out capacity parameter, and reallocate exactly once if the
//! first buffer was too small. A second call that reports a different count
//! than the first means the underlying data changed between calls; that is
//! a fatal error, never a truncation and never another retry.

use crate::dimension::DimensionBounds;
use crate::error::{Error, Result, check};
use crate::loader::Api;
use crate::sys;
use crate::types::IntRect;

/// Trailing capacity of the first-attempt buffer. Small enough to make the
/// single-call fast path cheap, large enough to cover typical containers.
const INITIAL_SCENE_CAPACITY: i32 = 8;

// The buffer is allocated as u32 words; both record types must stay
// 4-byte-aligned with no tail padding for that to be sound.
const _: () = assert!(align_of::<sys::StatisticsRaw>() == 4);
const _: () = assert!(align_of::<sys::SceneStatisticsRaw>() == 4);
const _: () = assert!(size_of::<sys::StatisticsRaw>() % 4 == 0);
const _: () = assert!(size_of::<sys::SceneStatisticsRaw>() % 4 == 0);

/// Per-scene slice of the statistics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStatistics {
    pub scene_index: i32,
    pub bounding_box: IntRect,
    pub bounding_box_layer0: IntRect,
}

/// Decoded statistics record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub sub_block_count: i32,
    /// Smallest and largest mosaic index, when any sub-block carries one.
    pub m_index_range: Option<(i32, i32)>,
    pub bounding_box: IntRect,
    pub bounding_box_layer0: IntRect,
    pub dim_bounds: DimensionBounds,
    pub scenes: Vec<SceneStatistics>,
}

fn words_for(scene_capacity: i32) -> usize {
    (size_of::<sys::StatisticsRaw>()
        + scene_capacity as usize * size_of::<sys::SceneStatisticsRaw>())
        / 4
}

pub(crate) fn fetch(api: &Api, reader: sys::RawObjectHandle) -> Result<Statistics> {
    // SAFETY: the negotiator sizes the buffer for the capacity it passes.
    fetch_with(|statistics, scene_capacity| unsafe {
        (api.reader_get_statistics)(reader, statistics, scene_capacity)
    })
}

/// The negotiation itself, with the native call injected so the protocol is
/// testable without a loaded library.
pub(crate) fn fetch_with<F>(mut call: F) -> Result<Statistics>
where
    F: FnMut(*mut sys::StatisticsRaw, &mut i32) -> i32,
{
    let mut buf = vec![0u32; words_for(INITIAL_SCENE_CAPACITY)];
    let mut count = INITIAL_SCENE_CAPACITY;
    check(call(buf.as_mut_ptr() as *mut sys::StatisticsRaw, &mut count))?;
    if count < 0 {
        return Err(Error::invalid_param(format!(
            "native reported negative scene count {count}"
        )));
    }
    if count <= INITIAL_SCENE_CAPACITY {
        return decode(&buf, count);
    }

    // Undersized: one exact-size retry, never more.
    let required = count;
    let mut buf = vec![0u32; words_for(required)];
    count = required;
    check(call(buf.as_mut_ptr() as *mut sys::StatisticsRaw, &mut count))?;
    if count != required {
        return Err(Error::StatisticsChanged {
            first: required,
            second: count,
        });
    }
    decode(&buf, count)
}

fn decode(buf: &[u32], scene_count: i32) -> Result<Statistics> {
    debug_assert!(buf.len() >= words_for(scene_count));
    // SAFETY: the buffer is 4-aligned and sized for the header plus
    // scene_count trailing entries, all of which the native call filled.
    let header = unsafe { &*(buf.as_ptr() as *const sys::StatisticsRaw) };
    let entries = unsafe {
        std::slice::from_raw_parts(
            (buf.as_ptr() as *const u8).add(size_of::<sys::StatisticsRaw>())
                as *const sys::SceneStatisticsRaw,
            scene_count as usize,
        )
    };

    let scenes = entries
        .iter()
        .map(|e| SceneStatistics {
            scene_index: e.scene_index,
            bounding_box: IntRect::from_raw(&e.bounding_box),
            bounding_box_layer0: IntRect::from_raw(&e.bounding_box_layer0),
        })
        .collect();

    let m_index_range = (header.min_m_index != i32::MAX || header.max_m_index != i32::MIN)
        .then_some((header.min_m_index, header.max_m_index));

    Ok(Statistics {
        sub_block_count: header.sub_block_count,
        m_index_range,
        bounding_box: IntRect::from_raw(&header.bounding_box),
        bounding_box_layer0: IntRect::from_raw(&header.bounding_box_layer0),
        dim_bounds: DimensionBounds::from_raw(&header.dim_bounds)?,
        scenes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Dimension, Interval};
    use std::cell::Cell;

    fn sample_header(scene_count_hint: i32) -> sys::StatisticsRaw {
        sys::StatisticsRaw {
            sub_block_count: scene_count_hint * 3,
            min_m_index: 0,
            max_m_index: scene_count_hint - 1,
            bounding_box: sys::IntRectRaw { x: 0, y: 0, w: 512, h: 512 },
            bounding_box_layer0: sys::IntRectRaw { x: 0, y: 0, w: 256, h: 256 },
            dim_bounds: DimensionBounds::new([(Dimension::C, Interval { start: 0, size: 2 })])
                .unwrap()
                .to_raw(),
        }
    }

    /// Simulates the native side: fills the header and up to `capacity`
    /// trailing entries, reports `actual` scenes back through the in/out
    /// parameter.
    fn fake_native(
        actual: i32,
        calls: &Cell<u32>,
    ) -> impl FnMut(*mut sys::StatisticsRaw, &mut i32) -> i32 + '_ {
        move |statistics, scene_capacity| {
            calls.set(calls.get() + 1);
            let capacity = *scene_capacity;
            // SAFETY: test stands in for the native side, which trusts the
            // caller-declared capacity.
            unsafe {
                statistics.write(sample_header(actual));
                let entries = (statistics as *mut u8).add(size_of::<sys::StatisticsRaw>())
                    as *mut sys::SceneStatisticsRaw;
                for i in 0..actual.min(capacity) {
                    entries.add(i as usize).write(sys::SceneStatisticsRaw {
                        scene_index: i,
                        bounding_box: sys::IntRectRaw { x: i, y: i, w: 10, h: 10 },
                        bounding_box_layer0: sys::IntRectRaw { x: i, y: i, w: 5, h: 5 },
                    });
                }
            }
            *scene_capacity = actual;
            sys::STATUS_OK
        }
    }

    #[test]
    fn fits_in_initial_capacity_after_one_call() {
        let calls = Cell::new(0);
        let stats = fetch_with(fake_native(3, &calls)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(stats.scenes.len(), 3);
        assert_eq!(stats.scenes[2].scene_index, 2);
        assert_eq!(stats.sub_block_count, 9);
        assert_eq!(stats.m_index_range, Some((0, 2)));
        assert_eq!(
            stats.dim_bounds.get(Dimension::C),
            Some(Interval { start: 0, size: 2 })
        );
    }

    #[test]
    fn oversize_record_triggers_exactly_one_resize() {
        let calls = Cell::new(0);
        let stats = fetch_with(fake_native(23, &calls)).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(stats.scenes.len(), 23);
        assert_eq!(stats.scenes[22].scene_index, 22);
        assert_eq!(stats.scenes[22].bounding_box.x, 22);
    }

    #[test]
    fn boundary_count_equal_to_capacity_needs_no_resize() {
        let calls = Cell::new(0);
        let stats = fetch_with(fake_native(INITIAL_SCENE_CAPACITY, &calls)).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(stats.scenes.len(), INITIAL_SCENE_CAPACITY as usize);
    }

    #[test]
    fn changed_count_on_second_call_is_fatal() {
        let calls = Cell::new(0);
        let mut reported = [20, 17].into_iter();
        let err = fetch_with(|statistics, scene_capacity| {
            let actual = reported.next().expect("no third call allowed");
            fake_native(actual, &calls)(statistics, scene_capacity)
        })
        .unwrap_err();
        assert_eq!(calls.get(), 2);
        match err {
            Error::StatisticsChanged { first, second } => {
                assert_eq!(first, 20);
                assert_eq!(second, 17);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn native_failure_propagates_as_categorized_error() {
        let err = fetch_with(|_, _| sys::STATUS_INVALID_HANDLE).unwrap_err();
        assert!(matches!(
            err,
            Error::Native {
                category: crate::ErrorCategory::InvalidHandle,
                ..
            }
        ));
    }

    #[test]
    fn zero_scenes_decode_to_empty_vec() {
        let calls = Cell::new(0);
        let stats = fetch_with(fake_native(0, &calls)).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(stats.scenes.is_empty());
    }
}
