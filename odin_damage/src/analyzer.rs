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

//! the analysis pipeline: load, map, detect, classify, report

use std::{fs, panic::{AssertUnwindSafe, catch_unwind}, path::{Path, PathBuf}, sync::Arc};
use chrono::Utc;
use image::RgbImage;
use ndarray::Array2;
use tracing::{info, warn};
use odin_raster::{
    CoordinateMapper, GeodeticReprojector, RasterSource, Reproject,
    open_raster, save_geotiff_gray32f, save_geotiff_gray8
};

use crate::{
    AlignedPair, AlignmentMetadata, AnalysisStage, DamageConfig, ProgressCallback, Strategy,
    classify::{DamageStatistics, Field, classify_damage},
    detect::detect_changes,
    errors::{OdinDamageError, Result},
    loader::load_and_align,
    memory,
    report::{DamageReport, FieldCatalog, damage_overlay},
    tiling::{TileOrchestrator, TileOutcome, TileSpec}
};

/// where `DamageAnalyzer::run_to_dir` puts its output
#[derive(Debug,Clone,PartialEq)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub field_catalog: PathBuf,
    pub labels: PathBuf,
    pub change_map: PathBuf,
    pub overlay: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir<P: AsRef<Path>> (dir: P)->Self {
        let dir = dir.as_ref();
        ArtifactPaths {
            report: dir.join("damage_report.json"),
            field_catalog: dir.join("field_analysis.json"),
            labels: dir.join("damage_labels.tif"),
            change_map: dir.join("change_map.tif"),
            overlay: dir.join("damage_overlay.png"),
        }
    }
}

/// everything a completed analysis produced
pub struct DamageAnalysis {
    pub metadata: AlignmentMetadata,
    pub change_map: Array2<f32>,
    pub labels: Array2<u8>,
    pub statistics: DamageStatistics,
    pub method: String,
    /// tile outcomes if the scene was processed in tiles
    pub tiles: Option<Vec<(TileSpec,TileOutcome)>>,
    pub report: DamageReport,
    pub catalog: FieldCatalog,
}

impl DamageAnalysis {
    pub fn fields (&self)->&[Field] { &self.catalog.fields }

    pub fn failed_tiles (&self)->Vec<&TileSpec> {
        self.tiles.iter().flatten().filter_map( |(spec,outcome)| match outcome {
            TileOutcome::Failed(_) => Some(spec),
            _ => None
        }).collect()
    }

    /// write reports, rasters and the overlay into `dir` (which is created if required).
    /// Artifacts written before a failure are left in place
    pub fn save_artifacts<P: AsRef<Path>> (&self, dir: P)->Result<ArtifactPaths> {
        let dir = dir.as_ref();
        fs::create_dir_all( dir)?;
        let paths = ArtifactPaths::in_dir( dir);
        let m = &self.metadata;
        let georef = m.transform.as_ref().map( |t| (t, m.crs.as_ref()));

        self.report.save( &paths.report)?;
        self.catalog.save( &paths.field_catalog)?;

        let labels: Vec<u8> = self.labels.iter().copied().collect();
        save_geotiff_gray8( &paths.labels, m.width, m.height, &labels, georef)?;

        let change: Vec<f32> = self.change_map.iter().copied().collect();
        save_geotiff_gray32f( &paths.change_map, m.width, m.height, &change, georef)?;

        damage_overlay( &self.labels).save( &paths.overlay)?;

        info!("saved damage artifacts to {:?}", dir);
        Ok( paths)
    }
}

/// GDAL (PROJ) if available, the pure Rust geodetic transforms otherwise
#[cfg(feature = "gdal")]
fn default_reprojector ()->Arc<dyn Reproject> { Arc::new( odin_raster::gdal_source::GdalReprojector) }

#[cfg(not(feature = "gdal"))]
fn default_reprojector ()->Arc<dyn Reproject> { Arc::new( GeodeticReprojector) }

pub struct DamageAnalyzer {
    config: DamageConfig,
    reprojector: Arc<dyn Reproject>,
    callbacks: Vec<ProgressCallback>,
}

impl DamageAnalyzer {
    pub fn new (config: DamageConfig)->Result<Self> {
        config.validate()?;
        Ok( DamageAnalyzer { config, reprojector: default_reprojector(), callbacks: Vec::new() })
    }

    pub fn with_reprojector (mut self, reprojector: Arc<dyn Reproject>)->Self {
        self.reprojector = reprojector;
        self
    }

    pub fn config (&self)->&DamageConfig { &self.config }

    pub fn reprojector (&self)->&dyn Reproject { self.reprojector.as_ref() }

    pub fn add_progress_callback (&mut self, cb: ProgressCallback) {
        self.callbacks.push( cb);
    }

    fn progress (&self, percent: f32, msg: &str) {
        for cb in &self.callbacks {
            if catch_unwind( AssertUnwindSafe( || cb( percent, msg))).is_err() {
                warn!("progress callback panicked at {:.0}%: {}", percent, msg);
            }
        }
    }

    pub fn analyze_files<P: AsRef<Path>> (&self, pre: P, post: P)->Result<DamageAnalysis> {
        let analysis = self.run_files( pre.as_ref(), post.as_ref())?;
        self.progress( 100.0, "analysis complete");
        Ok( analysis)
    }

    pub fn analyze_sources (&self, pre: &dyn RasterSource, post: &dyn RasterSource)->Result<DamageAnalysis> {
        let analysis = self.run_sources( pre, post)?;
        self.progress( 100.0, "analysis complete");
        Ok( analysis)
    }

    /// analyze images that already are on the same grid
    pub fn analyze_images (&self, pre: RgbImage, post: RgbImage, metadata: AlignmentMetadata)->Result<DamageAnalysis> {
        self.progress( 0.0, "starting analysis");
        let pair = AlignedPair::new( pre, post, metadata).map_err( |e| e.in_stage( AnalysisStage::Load, "aligned images"))?;
        let analysis = self.run_pair( pair)?;
        self.progress( 100.0, "analysis complete");
        Ok( analysis)
    }

    /// analyze two raster files and write all artifacts to `out_dir`
    pub fn run_to_dir<P: AsRef<Path>> (&self, pre: P, post: P, out_dir: P)->Result<(DamageAnalysis,ArtifactPaths)> {
        let analysis = self.run_files( pre.as_ref(), post.as_ref())?;
        let paths = analysis.save_artifacts( out_dir.as_ref())
            .map_err( |e| e.in_stage( AnalysisStage::Report, &format!("saving artifacts to {:?}", out_dir.as_ref())))?;
        self.progress( 95.0, "reports written");
        self.progress( 100.0, "analysis complete");
        Ok( (analysis, paths))
    }

    fn run_files (&self, pre: &Path, post: &Path)->Result<DamageAnalysis> {
        let open = |path: &Path| open_raster( path)
            .map_err( |e| OdinDamageError::from(e).in_stage( AnalysisStage::Load, &format!("opening {:?}", path)));
        let pre_src = open( pre)?;
        let post_src = open( post)?;
        self.run_sources( pre_src.as_ref(), post_src.as_ref())
    }

    fn run_sources (&self, pre: &dyn RasterSource, post: &dyn RasterSource)->Result<DamageAnalysis> {
        self.progress( 0.0, "loading images");
        let pair = load_and_align( pre, post, &self.config).map_err( |e| {
            let (pm, qm) = (pre.meta(), post.meta());
            e.in_stage( AnalysisStage::Load, &format!("aligning {} ({}x{}) with {} ({}x{})",
                pre.name(), pm.width, pm.height, post.name(), qm.width, qm.height))
        })?;
        self.run_pair( pair)
    }

    fn run_pair (&self, pair: AlignedPair)->Result<DamageAnalysis> {
        let AlignedPair{ pre, post, metadata } = pair;
        let pixels = metadata.pixel_count();
        self.progress( 10.0, &format!("loaded {}x{} images", metadata.width, metadata.height));

        let target = self.config.reference_crs().map_err( |e| e.in_stage( AnalysisStage::Load, "reference CRS"))?;
        let mut mapper = CoordinateMapper::new( target, self.reprojector.clone());
        mapper.initialize( metadata.transform, metadata.crs.clone());
        if !mapper.is_initialized() {
            info!("images are not georeferenced, fields only get pixel coordinates");
        }
        self.progress( 20.0, "coordinate mapping initialized");

        let (change_map, labels, fields, statistics, method, tiles) = if pixels > self.config.tiling_pixel_threshold {
            let available = memory::available_memory( &self.config);
            let orchestrator = TileOrchestrator::new( &self.config, Some(&mapper), available);
            self.progress( 30.0, &format!("analyzing tiles of {} px", orchestrator.tile_size()));

            let tiled = orchestrator.process( &pre, &post, &|f,msg| self.progress( 30.0 + 50.0 * f, msg))
                .map_err( |e| e.in_stage( AnalysisStage::Detect, &format!("tiled analysis of {}x{}", metadata.width, metadata.height)))?;
            (tiled.change_map, tiled.labels, tiled.fields, tiled.statistics, "tiled".to_string(), Some(tiled.tiles))

        } else {
            let strategy = Strategy::for_detection( pixels, &self.config);
            self.progress( 30.0, &format!("detecting changes ({})", strategy.name()));
            let change = detect_changes( &pre, &post, strategy, &self.config)
                .map_err( |e| e.in_stage( AnalysisStage::Detect, &format!("{} detection on {}x{}", strategy.name(), metadata.width, metadata.height)))?;
            info!("{} of {} pixels changed", change.changed_pixels(), pixels);
            self.progress( 80.0, "changes detected");

            let c = classify_damage( &change.change_map, &change.mask, &self.config, Some(&mapper))
                .map_err( |e| e.in_stage( AnalysisStage::Classify, &format!("{} changed pixels", change.changed_pixels())))?;
            let method = format!("{} detection, {} classification", strategy.name(), c.strategy.name());
            (change.change_map, c.labels, c.fields, c.statistics, method, None)
        };
        self.progress( 85.0, &format!("classified {} damage regions", fields.len()));

        let timestamp = Utc::now();
        let report = DamageReport::new( &statistics, &metadata, &method, timestamp);
        let catalog = FieldCatalog::new( fields, &self.config, &mapper, &metadata, &method, timestamp);
        info!("damaged area {} km², {}% affected, most common level: {}",
            report.summary.total_damaged_area_km2, report.summary.percentage_area_affected, report.summary.most_common_damage_level);

        Ok( DamageAnalysis { metadata, change_map, labels, statistics, method, tiles, report, catalog })
    }
}
