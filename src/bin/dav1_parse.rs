// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Informative CLI surface (spec §6): splits an Annex-B-style OBU stream
//! into sequence/frame headers and tile payloads, drives the frame
//! scheduler, and reports per-frame decode results. Demuxing and pixel
//! output are outside this core's concern; this binary only needs enough
//! of each to exercise the parser end to end.

use std::fs::File;
use std::io::{Read, Write};
use std::process::ExitCode;
use std::sync::Arc;

use av1_parse_core::bitreader::BitReader;
use av1_parse_core::frame::{FrameDecoder, ThreadConfig};
use av1_parse_core::headers::SequenceHeader;
use av1_parse_core::picture::{HeapPictureAllocator, NullKernels};
use clap::Parser;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dav1_parse", version = env!("CARGO_PKG_VERSION"), disable_version_flag = true, about = "AV1 bitstream parsing and block-decision core driver")]
struct Cli {
    /// Print version information.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Input OBU stream.
    #[arg(short, long)]
    input: String,

    /// Output file; written only when reconstruction kernels produce pixels
    /// (this core's default kernel bundle is a no-op, so this is a
    /// pass-through placeholder matching the informative CLI surface).
    #[arg(short, long)]
    output: Option<String>,

    /// Suppress per-frame log lines.
    #[arg(short, long)]
    quiet: bool,

    /// Decode at most N frames.
    #[arg(short, long)]
    limit: Option<usize>,

    /// Skip the first N frames.
    #[arg(short, long, default_value_t = 0)]
    skip: usize,

    /// Output muxer name (informative only; no muxer is implemented here).
    #[arg(long)]
    muxer: Option<String>,

    /// Frame-parallel worker count.
    #[arg(long, default_value_t = 1)]
    framethreads: usize,

    /// Tile-parallel worker count.
    #[arg(long, default_value_t = 1)]
    tilethreads: usize,
}

/// One Open Bitstream Unit's header fields and payload slice, per the AV1
/// low-overhead bitstream format (spec §6 "AV1 Annex B OBU stream ...
/// low-overhead").
struct Obu<'a> {
    obu_type: u8,
    payload: &'a [u8],
}

const OBU_SEQUENCE_HEADER: u8 = 1;
const OBU_TEMPORAL_DELIMITER: u8 = 2;
const OBU_FRAME_HEADER: u8 = 3;
const OBU_TILE_GROUP: u8 = 4;
const OBU_FRAME: u8 = 6;

/// Splits a byte stream into OBUs. Supports only the common
/// `has_size_field = 1` low-overhead layout; a stream without explicit
/// sizes (each OBU running to end-of-buffer) is rejected as malformed
/// since this driver has no outer length framing to fall back on.
fn split_obus(mut data: &[u8]) -> Vec<Obu<'_>> {
    let mut obus = Vec::new();
    while !data.is_empty() {
        let header_byte = data[0];
        let obu_type = (header_byte >> 3) & 0x0F;
        let extension_flag = (header_byte >> 2) & 1;
        let has_size_field = (header_byte >> 1) & 1;
        let mut pos = 1usize;
        if extension_flag == 1 {
            pos += 1;
        }
        if has_size_field == 0 {
            // No explicit size: treat the remainder as one final OBU.
            obus.push(Obu { obu_type, payload: &data[pos..] });
            break;
        }
        let (size, leb_len) = match read_leb128(&data[pos..]) {
            Some(v) => v,
            None => break,
        };
        pos += leb_len;
        let end = (pos + size as usize).min(data.len());
        obus.push(Obu { obu_type, payload: &data[pos..end] });
        data = &data[end..];
    }
    obus
}

fn read_leb128(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(8) {
        value |= ((byte & 0x7F) as u64) << (i * 7);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn run(cli: &Cli) -> av1_parse_core::Result<usize> {
    let mut file = File::open(&cli.input).map_err(|_| av1_parse_core::DecodeError::Alloc("failed to open input file"))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(|_| av1_parse_core::DecodeError::Alloc("failed to read input file"))?;

    let obus = split_obus(&data);
    let mut seq: Option<SequenceHeader> = None;
    let threads = ThreadConfig { n_tile_threads: cli.tilethreads.max(1), n_frame_threads: cli.framethreads.max(1) };
    let decoder = FrameDecoder::new(Arc::new(HeapPictureAllocator), Arc::new(NullKernels), threads);

    let mut frame_count = 0usize;
    let mut order_hint = 0u32;
    // A standalone OBU_FRAME_HEADER is followed by one or more
    // OBU_TILE_GROUPs before the frame is complete; accumulate them here
    // until a temporal delimiter, the next frame header, or end of stream
    // closes the frame out.
    let mut pending_header: Option<&[u8]> = None;
    let mut pending_tiles: Vec<&[u8]> = Vec::new();

    macro_rules! flush_pending {
        () => {
            if let (Some(header_payload), Some(seq)) = (pending_header.take(), &seq) {
                if !(frame_count < cli.skip) && cli.limit.map_or(true, |l| frame_count - cli.skip < l) {
                    let mut r = BitReader::new(header_payload);
                    let mut job = decoder.prepare_frame(seq, &mut r, Vec::new(), order_hint)?;
                    job.tile_data = std::mem::take(&mut pending_tiles);
                    let picture = decoder.run_frame(&job)?;
                    if !cli.quiet {
                        info!("frame {frame_count}: {}x{} decoded", picture.width, picture.height);
                    }
                    order_hint = order_hint.wrapping_add(1);
                }
                frame_count += 1;
                pending_tiles.clear();
            }
        };
    }

    for obu in &obus {
        match obu.obu_type {
            OBU_TEMPORAL_DELIMITER => flush_pending!(),
            OBU_SEQUENCE_HEADER => {
                let mut r = BitReader::new(obu.payload);
                seq = Some(SequenceHeader::parse(&mut r)?);
            }
            OBU_FRAME_HEADER => {
                flush_pending!();
                pending_header = Some(obu.payload);
            }
            OBU_TILE_GROUP => pending_tiles.push(obu.payload),
            OBU_FRAME => {
                flush_pending!();
                let seq = match &seq {
                    Some(s) => s,
                    None => continue,
                };
                if frame_count < cli.skip {
                    frame_count += 1;
                    continue;
                }
                if let Some(limit) = cli.limit {
                    if frame_count - cli.skip >= limit {
                        break;
                    }
                }
                let mut r = BitReader::new(obu.payload);
                let mut job = decoder.prepare_frame(seq, &mut r, Vec::new(), order_hint)?;
                let tile_offset = r.flush().min(obu.payload.len());
                job.tile_data = vec![&obu.payload[tile_offset..]];
                let picture = decoder.run_frame(&job)?;
                if !cli.quiet {
                    info!("frame {frame_count}: {}x{} decoded", picture.width, picture.height);
                }
                frame_count += 1;
                order_hint = order_hint.wrapping_add(1);
            }
            _ => {}
        }
    }
    flush_pending!();

    if let Some(path) = &cli.output {
        // No reconstruction kernel is wired in by default, so there are no
        // pixels to mux; an empty file documents that the run completed.
        let _ = File::create(path).and_then(|mut f| f.write_all(b""));
    }

    Ok(frame_count)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(n) => {
            if !cli.quiet {
                info!("decoded {n} frame(s)");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("decode failed: {e}");
            ExitCode::FAILURE
        }
    }
}
