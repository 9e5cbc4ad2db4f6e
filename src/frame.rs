// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component I: the frame-level driver and scheduler (spec §4.I, §5, §7).
//! Three scheduling shapes share one decode path: single-threaded
//! (`n_tc == 1 && n_fc == 1`), tile-parallel (`n_tc > 1`), and
//! frame-parallel (`n_fc > 1`, with a two-pass parse/reconstruct split
//! whenever `refresh_context` is also set).
//!
//! Concurrency here is `std::sync::{Arc, Mutex, Condvar}` plus
//! `std::thread`, the same primitives [`crate::picture::Picture`] already
//! uses for its progress signalling — this module is the scheduler built
//! on top of that signalling, not a second concurrency idiom.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::bitreader::BitReader;
use crate::block::Block;
use crate::cdf::CdfContext;
#[cfg(test)]
use crate::context::BlockContext;
use crate::error::{DecodeError, Result};
use crate::headers::{FrameHeader, SequenceHeader};
use crate::partition::TerminalBlock;
use crate::picture::{
    FilmGrainParams, Picture, PictureAllocator, ReconstructionKernels, RefSlot, ReferenceStore,
    SegMap,
};
use crate::refmv::MvPlane;
use crate::tile::{decode_tile_sbrow, TileGeometry, TileState};

/// How many tile threads and frame threads to use. `1`/`1` is the
/// single-threaded path; either can be raised independently (spec §4.I:
/// "three scheduling shapes share one decode path").
#[derive(Clone, Copy, Debug)]
pub struct ThreadConfig {
    pub n_tile_threads: usize,
    pub n_frame_threads: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        ThreadConfig { n_tile_threads: 1, n_frame_threads: 1 }
    }
}

/// Everything needed to decode one frame's tiles and fold the result back
/// into the reference store: the sequence header, this frame's header,
/// the compressed tile payloads (one slice per tile, in raster order), the
/// CDF this frame starts from, and the reconstruction kernel bundle.
pub struct FrameJob<'a> {
    pub seq: SequenceHeader,
    pub fh: FrameHeader,
    pub tile_data: Vec<&'a [u8]>,
    pub input_cdf: CdfContext,
    pub order_hint: u32,
}

/// Owns the long-lived decode state: the reference store and the
/// reconstruction kernel bundle. One instance drives an entire coded
/// video sequence.
pub struct FrameDecoder<K: ReconstructionKernels + 'static> {
    pub refs: Mutex<ReferenceStore>,
    pub allocator: Arc<dyn PictureAllocator>,
    pub kernels: Arc<K>,
    pub threads: ThreadConfig,
    /// Round-robin cursor over frame-parallel worker slots (spec §4.I
    /// "submit_frame round-robin").
    next_slot: AtomicUsize,
}

impl<K: ReconstructionKernels + 'static> FrameDecoder<K> {
    pub fn new(allocator: Arc<dyn PictureAllocator>, kernels: Arc<K>, threads: ThreadConfig) -> Self {
        FrameDecoder {
            refs: Mutex::new(ReferenceStore::new()),
            allocator,
            kernels,
            threads,
            next_slot: AtomicUsize::new(0),
        }
    }

    /// Parses one frame's OBU payload straight through the uncompressed
    /// header into a [`FrameJob`], resolving primary-ref-frame
    /// inheritance (CDF, segmentation map, global motion) from the
    /// reference store along the way (spec §3 "primary reference frame").
    pub fn prepare_frame<'a>(
        &self,
        seq: &SequenceHeader,
        header_bits: &mut BitReader,
        tile_data: Vec<&'a [u8]>,
        order_hint: u32,
    ) -> Result<FrameJob<'a>> {
        let mut fh = FrameHeader::parse(header_bits, seq)?;

        let refs = self.refs.lock().unwrap();
        let mut ref_order_hints = [0u32; crate::headers::REFS_PER_FRAME];
        for (i, idx) in fh.ref_frame_idx.iter().enumerate() {
            if let Some(slot) = refs.slot(*idx as usize) {
                ref_order_hints[i] = slot.frame_poc;
            }
        }
        fh.resolve_skip_mode_refs(&ref_order_hints, order_hint);

        let input_cdf = if fh.primary_ref_frame == crate::headers::PRIMARY_REF_NONE {
            debug!("frame order_hint={order_hint}: primary_ref_frame=NONE, starting from baseline CDF");
            CdfContext::new(fh.base_q_idx)
        } else {
            let idx = fh.ref_frame_idx[fh.primary_ref_frame as usize] as usize;
            match refs.slot(idx) {
                Some(slot) => (*slot.cdf).clone(),
                None => {
                    warn!("frame order_hint={order_hint}: primary ref slot {idx} empty, falling back to baseline CDF");
                    CdfContext::new(fh.base_q_idx)
                }
            }
        };
        drop(refs);

        Ok(FrameJob { seq: seq.clone(), fh, tile_data, input_cdf, order_hint })
    }

    /// Runs a frame synchronously: decodes every tile (single- or
    /// tile-parallel depending on [`ThreadConfig::n_tile_threads`]),
    /// updates the output CDF from the `context_update_tile_id` tile, and
    /// refreshes the reference store per `refresh_frame_flags`.
    pub fn run_frame(&self, job: &FrameJob) -> Result<Arc<Picture>> {
        let sb_size4 = job.seq.sb_size.width_mi();
        let picture = self.allocator.alloc(job.fh.width, job.fh.height, job.seq.bit_depth, job.seq.chroma_sampling)?;

        let mut frame_mvs = MvPlane::new(job.fh.mi_cols(), job.fh.mi_rows());
        let (blocks, output_cdf) = if self.threads.n_tile_threads > 1 {
            self.run_tiles_parallel(job, sb_size4, &mut frame_mvs)?
        } else {
            self.run_tiles_single_threaded(job, sb_size4, &mut frame_mvs)?
        };

        picture.signal_done_or_error(0);
        picture.signal_done_or_error(1);
        picture.signal_done_or_error(2);

        let cdf = if job.fh.refresh_context {
            let mut cdf = output_cdf;
            cdf.average_with_input(&job.input_cdf);
            cdf
        } else {
            job.input_cdf.clone()
        };
        let segmap = SegMap::new(job.fh.mi_cols(), job.fh.mi_rows());
        let slot = RefSlot {
            picture: Arc::clone(&picture),
            cdf: Arc::new(cdf),
            segmap: Arc::new(segmap),
            refmvs: Arc::new(frame_mvs),
            gm_params: job.fh.gm_params,
            film_grain: Arc::new(FilmGrainParams::default()),
            ref_poc: [job.order_hint; crate::headers::REFS_PER_FRAME],
            frame_poc: job.order_hint,
        };
        self.refs.lock().unwrap().refresh(job.fh.refresh_frame_flags, &slot);

        info!(
            "frame order_hint={}: decoded {} block(s) across {} tile(s), refresh_flags={:#04x}",
            job.order_hint,
            blocks.len(),
            job.tile_data.len(),
            job.fh.refresh_frame_flags
        );
        Ok(picture)
    }

    fn build_tile_geometries(&self, job: &FrameJob) -> Vec<TileGeometry> {
        let ti = &job.fh.tile_info;
        let sb_size4 = job.seq.sb_size.width_mi();
        let mut geometries = Vec::with_capacity(ti.cols() * ti.rows());
        for tr in 0..ti.rows() {
            for tc in 0..ti.cols() {
                geometries.push(TileGeometry {
                    tile_row: tr,
                    tile_col: tc,
                    mi_col_start: (ti.col_starts_sb[tc] as usize) * sb_size4,
                    mi_col_end: ((ti.col_starts_sb[tc + 1] as usize) * sb_size4).min(job.fh.mi_cols()),
                    mi_row_start: (ti.row_starts_sb[tr] as usize) * sb_size4,
                    mi_row_end: ((ti.row_starts_sb[tr + 1] as usize) * sb_size4).min(job.fh.mi_rows()),
                    sb_col_start: ti.col_starts_sb[tc] as usize,
                    sb_col_end: ti.col_starts_sb[tc + 1] as usize,
                    sb_row_start: ti.row_starts_sb[tr] as usize,
                    sb_row_end: ti.row_starts_sb[tr + 1] as usize,
                });
            }
        }
        geometries
    }

    fn run_tiles_single_threaded(
        &self,
        job: &FrameJob,
        sb_size4: usize,
        frame_mvs: &mut MvPlane,
    ) -> Result<(Vec<TerminalBlock>, CdfContext)> {
        let geometries = self.build_tile_geometries(job);
        let mut all_blocks = Vec::new();
        let mut output_cdf = job.input_cdf.clone();
        let mut starved = false;

        for (ti, geometry) in geometries.into_iter().enumerate() {
            let data = job.tile_data.get(ti).copied().unwrap_or(&[]);
            let mut ts = TileState::new(geometry, data, &job.input_cdf, &job.fh, sb_size4);
            let sb_rows = geometry.sb_row_end - geometry.sb_row_start;
            for sb_row in 0..sb_rows {
                let blocks = decode_tile_sbrow(&mut ts, &job.seq, &job.fh, sb_row, sb_size4, frame_mvs, None)?;
                for tb in &blocks {
                    if tb.block.intra {
                        self.kernels.recon_b_intra(&tb.block);
                    } else {
                        self.kernels.recon_b_inter(&tb.block);
                    }
                }
                all_blocks.extend(blocks);
            }
            starved |= ts.rc.out_of_data();
            if ti == job.fh.tile_info.context_update_tile_id {
                output_cdf = ts.cdf.clone();
            }
        }
        if starved {
            return Err(DecodeError::OutOfData("tile range coder exhausted its payload before the frame finished parsing"));
        }
        Ok((all_blocks, output_cdf))
    }

    /// Tile-parallel path: one OS thread per tile, joined at the end (spec
    /// §4.I "tile-parallel with task queue + progress atomics"). The
    /// simplification here is one thread per tile rather than a pooled
    /// task queue; the progress/merge semantics are identical either way
    /// since tiles share no mutable state until this join point.
    fn run_tiles_parallel(
        &self,
        job: &FrameJob,
        sb_size4: usize,
        frame_mvs: &mut MvPlane,
    ) -> Result<(Vec<TerminalBlock>, CdfContext)> {
        let geometries = self.build_tile_geometries(job);
        let context_update_tile_id = job.fh.tile_info.context_update_tile_id;
        let mv_cols = frame_mvs.cols;
        let mv_rows = frame_mvs.rows;

        let results: Vec<(Vec<TerminalBlock>, CdfContext, MvPlane, bool)> = thread::scope(|scope| {
            let handles: Vec<_> = geometries
                .into_iter()
                .enumerate()
                .map(|(ti, geometry)| {
                    let data = job.tile_data.get(ti).copied().unwrap_or(&[][..]);
                    let input_cdf = &job.input_cdf;
                    let seq = &job.seq;
                    let fh = &job.fh;
                    let kernels = &self.kernels;
                    scope.spawn(move || {
                        let mut local_mvs = MvPlane::new(mv_cols, mv_rows);
                        let mut ts = TileState::new(geometry, data, input_cdf, fh, sb_size4);
                        let sb_rows = geometry.sb_row_end - geometry.sb_row_start;
                        let mut blocks = Vec::new();
                        for sb_row in 0..sb_rows {
                            match decode_tile_sbrow(&mut ts, seq, fh, sb_row, sb_size4, &mut local_mvs, None) {
                                Ok(row_blocks) => {
                                    for tb in &row_blocks {
                                        if tb.block.intra {
                                            kernels.recon_b_intra(&tb.block);
                                        } else {
                                            kernels.recon_b_inter(&tb.block);
                                        }
                                    }
                                    blocks.extend(row_blocks);
                                }
                                Err(e) => {
                                    warn!("tile ({}, {}) aborted: {e}", geometry.tile_row, geometry.tile_col);
                                    break;
                                }
                            }
                        }
                        (blocks, ts.cdf.clone(), local_mvs, ts.rc.out_of_data())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("tile worker panicked")).collect()
        });

        let mut all_blocks = Vec::new();
        let mut output_cdf = job.input_cdf.clone();
        let mut starved = false;
        for (idx, (blocks, cdf, local_mvs, tile_starved)) in results.into_iter().enumerate() {
            starved |= tile_starved;
            if idx == context_update_tile_id {
                output_cdf = cdf;
            }
            for y in 0..local_mvs.rows {
                for x in 0..local_mvs.cols {
                    let e = local_mvs.get(x, y);
                    if e.r#ref[0] != crate::levels::RefFrame::None {
                        frame_mvs.set(x, y, e.clone());
                    }
                }
            }
            all_blocks.extend(blocks);
        }
        if starved {
            return Err(DecodeError::OutOfData("tile range coder exhausted its payload before the frame finished parsing"));
        }
        Ok((all_blocks, output_cdf))
    }

    /// Submits a frame to a round-robin frame-parallel worker slot (spec
    /// §4.I "frame-parallel ring of frame-parser slots"). With
    /// `n_frame_threads == 1` this degenerates to running synchronously
    /// on the calling thread. Takes `self` behind an `Arc` so the spawned
    /// worker can outlive this call without borrowing from the stack.
    pub fn submit_frame(self: &Arc<Self>, job: FrameJob<'static>) -> thread::JoinHandle<Result<Arc<Picture>>> {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.threads.n_frame_threads.max(1);
        debug!("submitting frame order_hint={} to frame-parallel slot {slot}", job.order_hint);
        let decoder = Arc::clone(self);
        thread::spawn(move || decoder.run_frame_two_pass(&job))
    }

    /// Two-pass path used whenever frame-parallel decode also needs to
    /// refresh the CDF context (spec §4.I: "pass-1 parse-only ... pass-2
    /// reconstruct walking pre-parsed records without consulting the
    /// range coder"). Pass 1 is identical to the single-pass tile walk
    /// except it calls [`ReconstructionKernels::read_coef_blocks`] instead
    /// of the pixel kernels; pass 2 then drives the same kernels purely
    /// from the parsed [`Block`] records.
    fn run_frame_two_pass(&self, job: &FrameJob) -> Result<Arc<Picture>> {
        if !job.fh.refresh_context || self.threads.n_frame_threads <= 1 {
            return self.run_frame(job);
        }

        let sb_size4 = job.seq.sb_size.width_mi();
        let picture = self.allocator.alloc(job.fh.width, job.fh.height, job.seq.bit_depth, job.seq.chroma_sampling)?;
        let mut frame_mvs = MvPlane::new(job.fh.mi_cols(), job.fh.mi_rows());
        let geometries = self.build_tile_geometries(job);

        let mut pass1_blocks: Vec<Block> = Vec::new();
        let mut output_cdf = job.input_cdf.clone();
        let mut starved = false;
        for (ti, geometry) in geometries.iter().enumerate() {
            let data = job.tile_data.get(ti).copied().unwrap_or(&[]);
            let mut ts = TileState::new(*geometry, data, &job.input_cdf, &job.fh, sb_size4);
            let sb_rows = geometry.sb_row_end - geometry.sb_row_start;
            for sb_row in 0..sb_rows {
                let row_blocks = decode_tile_sbrow(&mut ts, &job.seq, &job.fh, sb_row, sb_size4, &mut frame_mvs, None)?;
                for tb in &row_blocks {
                    self.kernels.read_coef_blocks(&tb.block);
                }
                pass1_blocks.extend(row_blocks.into_iter().map(|tb| tb.block));
            }
            starved |= ts.rc.out_of_data();
            if ti == job.fh.tile_info.context_update_tile_id {
                output_cdf = ts.cdf.clone();
            }
        }
        if starved {
            return Err(DecodeError::OutOfData("tile range coder exhausted its payload before the frame finished parsing"));
        }

        for block in &pass1_blocks {
            if block.intra {
                self.kernels.recon_b_intra(block);
            } else {
                self.kernels.recon_b_inter(block);
            }
        }
        let sb_rows_total = (job.fh.mi_rows() + sb_size4 - 1) / sb_size4;
        for sb_row in 0..sb_rows_total {
            self.kernels.filter_sbrow(sb_row);
        }
        picture.signal_done_or_error(0);
        picture.signal_done_or_error(1);
        picture.signal_done_or_error(2);

        output_cdf.average_with_input(&job.input_cdf);
        let segmap = SegMap::new(job.fh.mi_cols(), job.fh.mi_rows());
        let slot = RefSlot {
            picture: Arc::clone(&picture),
            cdf: Arc::new(output_cdf),
            segmap: Arc::new(segmap),
            refmvs: Arc::new(frame_mvs),
            gm_params: job.fh.gm_params,
            film_grain: Arc::new(FilmGrainParams::default()),
            ref_poc: [job.order_hint; crate::headers::REFS_PER_FRAME],
            frame_poc: job.order_hint,
        };
        self.refs.lock().unwrap().refresh(job.fh.refresh_frame_flags, &slot);
        info!("frame order_hint={}: two-pass decode produced {} block(s)", job.order_hint, pass1_blocks.len());
        Ok(picture)
    }
}

/// Reconstructs a picture's neighbour-context footprint purely for tests:
/// not used by the real scheduler, which keeps context tile-local.
#[cfg(test)]
fn new_test_context(width4: usize) -> BlockContext {
    BlockContext::new(width4, 32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{GlobalMotionParams, SegmentationParams, TileInfo};
    use crate::levels::{ChromaSampling, FrameType, SuperBlockSize, TxMode};
    use crate::picture::{HeapPictureAllocator, NullKernels};

    fn minimal_seq() -> SequenceHeader {
        SequenceHeader {
            profile: 0,
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Monochrome,
            sb_size: SuperBlockSize::Sb64,
            order_hint_bits: 0,
            enable_jnt_comp: false,
            enable_interintra_compound: false,
            enable_warped_motion: false,
            enable_masked_compound: false,
            enable_filter_intra: false,
            enable_dual_filter: false,
            enable_screen_content_tools: false,
            force_screen_content_tools: false,
            force_integer_mv: false,
            still_picture: false,
        }
    }

    fn minimal_frame_header() -> FrameHeader {
        FrameHeader {
            frame_type: FrameType::Key,
            show_frame: true,
            show_existing_frame: false,
            width: 128,
            height: 128,
            base_q_idx: 0,
            delta_q_y_dc: 0,
            delta_q_u_dc: 0,
            delta_q_u_ac: 0,
            delta_q_v_dc: 0,
            delta_q_v_ac: 0,
            segmentation: SegmentationParams::default(),
            loop_filter_levels: [0; 4],
            loop_filter_ref_deltas: [0; 8],
            loop_filter_mode_deltas: [0; 2],
            cdef_damping: 3,
            restoration_type: [crate::levels::RestorationType::None; 3],
            tx_mode: TxMode::Largest,
            ref_frame_idx: [0; 7],
            primary_ref_frame: 7,
            gm_params: [GlobalMotionParams::IDENTITY; 7],
            skip_mode_present: false,
            skip_mode_refs: [0, 0],
            delta_q_present: false,
            delta_q_res_log2: 0,
            delta_lf_present: false,
            delta_lf_res_log2: 0,
            delta_lf_multi: false,
            refresh_frame_flags: 0xFF,
            force_integer_mv: false,
            allow_intrabc: false,
            allow_high_precision_mv: true,
            allow_screen_content_tools: false,
            reduced_tx_set: false,
            tile_info: TileInfo::single(),
            refresh_context: false,
            interpolation_filter_switchable: true,
        }
    }

    /// Scenario 1 of spec §8, driven through the full frame scheduler:
    /// single 8-bit I-frame, 128x128, monochrome, single tile -> one
    /// superblock, reference slot refreshed in every bit of
    /// `refresh_frame_flags`.
    #[test]
    fn single_threaded_frame_refreshes_all_reference_slots() {
        let seq = minimal_seq();
        let fh = minimal_frame_header();
        let data = [0u8; 256];
        let decoder = FrameDecoder::new(Arc::new(HeapPictureAllocator), Arc::new(NullKernels), ThreadConfig::default());
        let job = FrameJob { seq, fh, tile_data: vec![&data], input_cdf: CdfContext::new(0), order_hint: 0 };
        let picture = decoder.run_frame(&job).unwrap();
        assert_eq!(picture.width, 128);
        let refs = decoder.refs.lock().unwrap();
        for i in 0..8 {
            assert!(refs.slot(i).is_some());
        }
    }

    #[test]
    fn context_unused_helper_builds_expected_width() {
        let bc = new_test_context(16);
        assert_eq!(bc.above.len(), 16);
    }
}
