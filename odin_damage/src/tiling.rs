/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! tiled analysis of scenes that are too large to be processed in one piece.
//!
//! The aligned images are split into a row-major grid of square tiles (edge tiles are clipped). Tiles
//! are processed in batches by a fixed size rayon pool, each tile independently: uniform tiles (every
//! band spatially flat, e.g. open water) are skipped, tiles without enough changed pixels are not
//! classified. Results are stitched into full
//! size change and label rasters in tile order, which makes the outcome independent of thread
//! scheduling. A tile that fails (or panics) gets an all-zero placeholder and is reported in the
//! tile outcomes. Regions that cross tile seams stay separate fields.

use std::panic::{AssertUnwindSafe, catch_unwind};
use image::{RgbImage, imageops};
use ndarray::{Array2, s};
use rayon::prelude::*;
use tracing::{debug, error, info};
use odin_raster::CoordinateMapper;

use crate::{
    DamageConfig, Strategy,
    classify::{DamageStatistics, Field, classify_damage},
    detect::detect_changes,
    errors::{OdinDamageError, Result, invalid_dimensions, op_failed}
};

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct TileSpec {
    pub row: usize,
    pub col: usize,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileSpec {
    pub fn pixel_count (&self)->usize { self.width * self.height }
}

#[derive(Debug,Clone,PartialEq)]
pub enum TileOutcome {
    Processed,
    /// both sub-images below the variance floor
    SkippedUniform,
    /// not enough changed pixels to classify
    SkippedNoChange,
    Failed(String),
}

/// what a tile worker hands back. Rasters are tile sized, fields in tile pixel coordinates
pub struct TileResult {
    pub spec: TileSpec,
    pub change_map: Array2<f32>,
    pub labels: Array2<u8>,
    pub fields: Vec<Field>,
    pub outcome: TileOutcome,
}

impl TileResult {
    pub fn empty (spec: TileSpec, outcome: TileOutcome)->Self {
        TileResult {
            spec,
            change_map: Array2::zeros( (spec.height, spec.width)),
            labels: Array2::zeros( (spec.height, spec.width)),
            fields: Vec::new(),
            outcome
        }
    }
}

/// stitched result of a tiled run
pub struct TiledAnalysis {
    pub change_map: Array2<f32>,
    pub labels: Array2<u8>,
    pub fields: Vec<Field>,
    pub statistics: DamageStatistics,
    pub tile_size: usize,
    pub tiles: Vec<(TileSpec,TileOutcome)>,
}

impl TiledAnalysis {
    pub fn failed_tiles (&self)->Vec<(&TileSpec,&str)> {
        self.tiles.iter().filter_map( |(spec,outcome)| match outcome {
            TileOutcome::Failed(cause) => Some( (spec, cause.as_str()) ),
            _ => None
        }).collect()
    }

    pub fn count (&self, outcome: &TileOutcome)->usize {
        self.tiles.iter().filter( |(_,o)| o == outcome).count()
    }
}

/// square tile side that fits the configured share of available memory
pub fn optimal_tile_size (available: u64, config: &DamageConfig)->usize {
    let budget = available as f64 * config.tile_memory_fraction;
    let side = (budget / config.tile_bytes_per_pixel as f64).sqrt() as usize;
    side.clamp( config.min_tile_size, config.max_tile_size)
}

/// row-major tile grid, last row/column clipped to the image
pub fn tile_grid (width: usize, height: usize, tile_size: usize)->Vec<TileSpec> {
    let mut tiles = Vec::new();
    if tile_size == 0 { return tiles }

    for (row, y) in (0..height).step_by( tile_size).enumerate() {
        for (col, x) in (0..width).step_by( tile_size).enumerate() {
            tiles.push( TileSpec{ row, col, x, y, width: tile_size.min( width - x), height: tile_size.min( height - y) });
        }
    }
    tiles
}

/// largest spatial (population) variance of the R, G and B bands. A solid colour has zero variance
/// no matter how different its bands are
pub fn band_variance (img: &RgbImage)->f64 {
    let n = img.width() as f64 * img.height() as f64;
    if n == 0.0 { return 0.0 }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for px in img.pixels() {
        for (i, &v) in px.0.iter().enumerate() {
            let v = v as f64;
            sum[i] += v;
            sum_sq[i] += v * v;
        }
    }
    (0..3).map( |i| {
        let mean = sum[i] / n;
        (sum_sq[i] / n - mean * mean).max( 0.0)
    }).fold( 0.0, f64::max)
}

/// the standard per tile analysis: early exit, detection and classification
pub fn analyze_tile (spec: &TileSpec, pre: &RgbImage, post: &RgbImage, config: &DamageConfig)->Result<TileResult> {
    if band_variance( pre) < config.tile_variance_floor && band_variance( post) < config.tile_variance_floor {
        return Ok( TileResult::empty( *spec, TileOutcome::SkippedUniform))
    }

    let strategy = Strategy::for_detection( spec.pixel_count(), config);
    let change = detect_changes( pre, post, strategy, config)?;

    if change.changed_pixels() < config.min_changed_pixels {
        return Ok( TileResult {
            spec: *spec,
            change_map: change.change_map,
            labels: Array2::zeros( (spec.height, spec.width)),
            fields: Vec::new(),
            outcome: TileOutcome::SkippedNoChange
        })
    }

    let classification = classify_damage( &change.change_map, &change.mask, config, None)?;
    Ok( TileResult {
        spec: *spec,
        change_map: change.change_map,
        labels: classification.labels,
        fields: classification.fields,
        outcome: TileOutcome::Processed
    })
}

pub struct TileOrchestrator<'a> {
    config: &'a DamageConfig,
    mapper: Option<&'a CoordinateMapper>,
    tile_size: usize,
    workers: usize,
}

impl<'a> TileOrchestrator<'a> {
    pub fn new (config: &'a DamageConfig, mapper: Option<&'a CoordinateMapper>, available_memory: u64)->Self {
        TileOrchestrator {
            config,
            mapper,
            tile_size: optimal_tile_size( available_memory, config),
            workers: config.worker_count(),
        }
    }

    pub fn with_tile_size (mut self, tile_size: usize)->Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_workers (mut self, workers: usize)->Self {
        self.workers = workers.max(1);
        self
    }

    pub fn tile_size (&self)->usize { self.tile_size }
    pub fn workers (&self)->usize { self.workers }

    pub fn batch_size (&self, n_tiles: usize)->usize {
        self.config.tile_batch_size.unwrap_or_else( || (n_tiles / (self.workers * 2)).max(1))
    }

    pub fn process (&self, pre: &RgbImage, post: &RgbImage, progress: &dyn Fn(f32,&str))->Result<TiledAnalysis> {
        let config = self.config;
        self.process_with( pre, post, progress, |spec,a,b| analyze_tile( spec, a, b, config))
    }

    /// run `analyze` on every tile. `progress` is called after each batch with values in 0..=1
    pub fn process_with<F> (&self, pre: &RgbImage, post: &RgbImage, progress: &dyn Fn(f32,&str), analyze: F)->Result<TiledAnalysis>
        where F: Fn(&TileSpec,&RgbImage,&RgbImage)->Result<TileResult> + Sync
    {
        if pre.dimensions() != post.dimensions() {
            return Err( invalid_dimensions( format!("pre image {:?} != post image {:?}", pre.dimensions(), post.dimensions())))
        }
        let (w,h) = (post.width() as usize, post.height() as usize);

        let tiles = tile_grid( w, h, self.tile_size);
        let n_tiles = tiles.len();
        let batch_size = self.batch_size( n_tiles);
        info!("processing {}x{} in {} tiles of {} px ({} workers, batches of {})", w, h, n_tiles, self.tile_size, self.workers, batch_size);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads( self.workers)
            .thread_name( |i| format!("damage-tile-{i}"))
            .build()
            .map_err( |e| op_failed( format!("cannot create tile worker pool: {e}")))?;

        let mut change_map = Array2::<f32>::zeros( (h,w));
        let mut labels = Array2::<u8>::zeros( (h,w));
        let mut fields: Vec<Field> = Vec::new();
        let mut outcomes: Vec<(TileSpec,TileOutcome)> = Vec::with_capacity( n_tiles);
        let mut done = 0;

        for batch in tiles.chunks( batch_size) {
            let results: Vec<TileResult> = pool.install( || {
                batch.par_iter().map( |spec| run_tile( spec, pre, post, &analyze)).collect()
            });

            for r in results {
                let TileSpec{ x, y, width, height, .. } = r.spec;
                change_map.slice_mut( s![y..y+height, x..x+width]).assign( &r.change_map);
                labels.slice_mut( s![y..y+height, x..x+width]).assign( &r.labels);

                for f in r.fields {
                    let mut f = f.translated( x, y);
                    if let Some(mapper) = self.mapper { f = f.with_geography( mapper); }
                    f.field_id = fields.len() + 1;
                    fields.push( f);
                }
                outcomes.push( (r.spec, r.outcome));
            }

            done += batch.len();
            debug!("processed {}/{} tiles", done, n_tiles);
            progress( done as f32 / n_tiles as f32, &format!("processed {done} of {n_tiles} tiles"));
        }

        let statistics = DamageStatistics::from_labels( &labels, &fields);
        let analysis = TiledAnalysis { change_map, labels, fields, statistics, tile_size: self.tile_size, tiles: outcomes };

        info!("tiled analysis done: {} processed, {} uniform, {} unchanged, {} failed, {} fields",
            analysis.count( &TileOutcome::Processed), analysis.count( &TileOutcome::SkippedUniform),
            analysis.count( &TileOutcome::SkippedNoChange), analysis.failed_tiles().len(), analysis.fields.len());

        Ok( analysis)
    }
}

/// crop, analyze and contain any failure of a single tile
fn run_tile<F> (spec: &TileSpec, pre: &RgbImage, post: &RgbImage, analyze: &F)->TileResult
    where F: Fn(&TileSpec,&RgbImage,&RgbImage)->Result<TileResult> + Sync
{
    let (x, y, w, h) = (spec.x as u32, spec.y as u32, spec.width as u32, spec.height as u32);
    let pre_tile = imageops::crop_imm( pre, x, y, w, h).to_image();
    let post_tile = imageops::crop_imm( post, x, y, w, h).to_image();

    let res = match catch_unwind( AssertUnwindSafe( || analyze( spec, &pre_tile, &post_tile))) {
        Ok(Ok(r)) => check_tile_result( spec, r),
        Ok(Err(e)) => Err(e),
        Err(_) => Err( op_failed("tile analysis panicked")),
    };

    res.unwrap_or_else( |e| {
        let e = OdinDamageError::TileFailed{ row: spec.row, col: spec.col, cause: e.to_string() };
        error!("{}", e);
        TileResult::empty( *spec, TileOutcome::Failed( e.to_string()))
    })
}

fn check_tile_result (spec: &TileSpec, r: TileResult)->Result<TileResult> {
    let dim = (spec.height, spec.width);
    if r.change_map.dim() != dim || r.labels.dim() != dim {
        Err( invalid_dimensions( format!("tile result {:?} does not match tile {:?}", r.change_map.dim(), dim)))
    } else {
        Ok( TileResult{ spec: *spec, ..r })
    }
}
