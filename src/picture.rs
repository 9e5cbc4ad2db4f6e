// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! External collaborators (spec §6): the reconstruction kernel set, the
//! picture allocator, and the reference-counted picture object. Only
//! their interfaces are specified here; this core never touches pixels.
//!
//! The manual `ref_create`/`ref_inc`/`ref_dec` primitive of spec §6 is
//! superseded by `std::sync::Arc` throughout this crate — the idiomatic
//! Rust equivalent of a reference-counted handle, not a hand-rolled
//! stand-in for it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::cdf::CdfContext;
use crate::error::Result;
use crate::headers::{GlobalMotionParams, REFS_PER_FRAME};
use crate::levels::ChromaSampling;
use crate::refmv::MvPlane;

/// Distinguishes a wait on parsing progress from a wait on reconstruction
/// (pixel) progress for the same picture (spec §4.I "Reference waits").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneProgressKind {
    /// Satisfied once *parsing* (not reconstruction) has passed the row.
    Block,
    /// Satisfied once pixels have actually been produced.
    Pixel,
}

/// One plane's backing store. Layout per spec §6: stride padded to a
/// 128-pixel-aligned width, samples 1 or 2 bytes depending on bit depth,
/// 10-bit values stored little-endian with the upper bits zero.
pub struct PlaneBuffer {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub bytes_per_sample: usize,
    pub data: Vec<u8>,
}

impl PlaneBuffer {
    pub fn new(width: usize, height: usize, bit_depth: u8) -> Self {
        let bytes_per_sample = if bit_depth > 8 { 2 } else { 1 };
        let padded_width = (width + 127) & !127;
        let stride = padded_width * bytes_per_sample;
        let padded_height = height + 256; // 128px padding on each side
        PlaneBuffer {
            width,
            height,
            stride,
            bytes_per_sample,
            data: vec![0; stride * padded_height],
        }
    }
}

/// A decoded (or in-flight) picture, shared by the reference store and by
/// any frame-parser currently using it as a reference.
pub struct Picture {
    pub width: usize,
    pub height: usize,
    pub bit_depth: u8,
    pub chroma: ChromaSampling,
    pub planes: [PlaneBuffer; 3],
    /// Per-plane progress, in rows, for parsing and for reconstruction;
    /// `progress[kind][plane]` tracks how far that stage has advanced.
    parse_progress: [AtomicUsize; 3],
    pixel_progress: [AtomicUsize; 3],
    progress_signal: (Mutex<()>, Condvar),
}

impl Picture {
    pub fn new(width: usize, height: usize, bit_depth: u8, chroma: ChromaSampling) -> Self {
        let (cw, ch) = (width >> chroma.subsample_x(), height >> chroma.subsample_y());
        Picture {
            width,
            height,
            bit_depth,
            chroma,
            planes: [
                PlaneBuffer::new(width, height, bit_depth),
                PlaneBuffer::new(cw, ch, bit_depth),
                PlaneBuffer::new(cw, ch, bit_depth),
            ],
            parse_progress: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            pixel_progress: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            progress_signal: (Mutex::new(()), Condvar::new()),
        }
    }

    /// Signals that `plane` has progressed to `row` for `kind`, waking any
    /// waiter blocked in [`Picture::wait`].
    pub fn signal(&self, kind: PlaneProgressKind, plane: usize, row: usize) {
        let counters = match kind {
            PlaneProgressKind::Block => &self.parse_progress,
            PlaneProgressKind::Pixel => &self.pixel_progress,
        };
        counters[plane].fetch_max(row, Ordering::Release);
        let _guard = self.progress_signal.0.lock().unwrap();
        self.progress_signal.1.notify_all();
    }

    /// Marks `plane` fully done (or errored) by setting progress to
    /// `usize::MAX`, per spec §7: "signal their output ... progress to
    /// `UINT_MAX` even on error to unblock waiters".
    pub fn signal_done_or_error(&self, plane: usize) {
        self.signal(PlaneProgressKind::Block, plane, usize::MAX);
        self.signal(PlaneProgressKind::Pixel, plane, usize::MAX);
    }

    /// Blocks until `plane` has reached `row` for `kind`. The fast path is
    /// a lock-free atomic load; the slow path parks on the condvar.
    pub fn wait(&self, kind: PlaneProgressKind, plane: usize, row: usize) {
        let counters = match kind {
            PlaneProgressKind::Block => &self.parse_progress,
            PlaneProgressKind::Pixel => &self.pixel_progress,
        };
        if counters[plane].load(Ordering::Acquire) >= row {
            return;
        }
        let mut guard = self.progress_signal.0.lock().unwrap();
        while counters[plane].load(Ordering::Acquire) < row {
            guard = self.progress_signal.1.wait(guard).unwrap();
        }
    }
}

/// Allocates pictures; the real allocator also owns a buffer pool, which
/// is outside this core's concern.
pub trait PictureAllocator: Send + Sync {
    fn alloc(&self, width: usize, height: usize, bit_depth: u8, chroma: ChromaSampling) -> Result<Arc<Picture>>;
}

/// Default allocator: a plain heap allocation per picture.
pub struct HeapPictureAllocator;

impl PictureAllocator for HeapPictureAllocator {
    fn alloc(&self, width: usize, height: usize, bit_depth: u8, chroma: ChromaSampling) -> Result<Arc<Picture>> {
        Ok(Arc::new(Picture::new(width, height, bit_depth, chroma)))
    }
}

/// Per-position 8-bit segmentation id map, frame-sized at 4x4 granularity.
/// Outlives its source picture when a later frame still references it
/// (spec §3 "Ownership and lifecycles").
pub struct SegMap {
    pub cols: usize,
    pub rows: usize,
    pub data: Vec<u8>,
}

impl SegMap {
    pub fn new(cols: usize, rows: usize) -> Self {
        SegMap { cols, rows, data: vec![0; cols * rows] }
    }
}

/// Film-grain synthesis parameters; consumed only by the (external)
/// reconstruction stage, carried here purely for its reference-store
/// lifecycle (spec §3 reference store tuple).
#[derive(Clone, Default)]
pub struct FilmGrainParams {
    pub apply_grain: bool,
}

/// The reconstruction-kernel hook bundle (spec §6, §9 "Deep
/// vtable-per-bit-depth"): selected once per frame by bit depth, not
/// dispatched per inner call.
pub trait ReconstructionKernels: Send + Sync {
    fn recon_b_intra(&self, block: &crate::block::Block);
    fn recon_b_inter(&self, block: &crate::block::Block);
    /// Pass-1 only: writes coefficients, updates CDFs, does no pixel work.
    fn read_coef_blocks(&self, block: &crate::block::Block);
    fn filter_sbrow(&self, sby: usize);
    fn backup_ipred_edge(&self);
}

/// A bundle that performs no pixel work; used by the parse-only paths and
/// by tests that only exercise the syntax parser.
pub struct NullKernels;

impl ReconstructionKernels for NullKernels {
    fn recon_b_intra(&self, _block: &crate::block::Block) {}
    fn recon_b_inter(&self, _block: &crate::block::Block) {}
    fn read_coef_blocks(&self, _block: &crate::block::Block) {}
    fn filter_sbrow(&self, _sby: usize) {}
    fn backup_ipred_edge(&self) {}
}

/// One occupied reference slot (spec §3 "Reference store").
#[derive(Clone)]
pub struct RefSlot {
    pub picture: Arc<Picture>,
    pub cdf: Arc<CdfContext>,
    pub segmap: Arc<SegMap>,
    pub refmvs: Arc<MvPlane>,
    pub gm_params: [GlobalMotionParams; REFS_PER_FRAME],
    pub film_grain: Arc<FilmGrainParams>,
    pub ref_poc: [u32; REFS_PER_FRAME],
    pub frame_poc: u32,
}

/// The fixed 8-slot reference ring (spec §3). Mutated only by the
/// frame-submission thread; readers hold their own `Arc` clones and never
/// mutate a slot in place.
#[derive(Default)]
pub struct ReferenceStore {
    slots: [Option<RefSlot>; 8],
}

impl ReferenceStore {
    pub fn new() -> Self {
        ReferenceStore { slots: Default::default() }
    }

    pub fn slot(&self, idx: usize) -> Option<&RefSlot> {
        self.slots[idx].as_ref()
    }

    /// Applies `refresh_frame_flags`: every bit set displaces the prior
    /// holder of that slot with `frame` (spec §4.I "Reference refresh").
    pub fn refresh(&mut self, refresh_frame_flags: u8, frame: &RefSlot) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if refresh_frame_flags & (1 << i) != 0 {
                *slot = Some(frame.clone());
            }
        }
    }
}
