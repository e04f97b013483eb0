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

use std::{fs, path::Path};
use serde::{Deserialize,Serialize};
use imageproc::region_labelling::Connectivity as LabelConnectivity;
use odin_raster::Crs;

use crate::{DamageLevel, errors::{Result, config_error}};

pub const GIB: u64 = 1024 * 1024 * 1024;

/// cumulative upper (inclusive) bounds of the mean change intensity for each severity.
/// Everything above `severe` is catastrophic
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct DamageThresholds {
    pub minimal: f32,
    pub moderate: f32,
    pub severe: f32,
}

impl Default for DamageThresholds {
    fn default()->Self {
        DamageThresholds { minimal: 0.10, moderate: 0.30, severe: 0.60 }
    }
}

impl DamageThresholds {
    pub fn classify (&self, mean_intensity: f32)->DamageLevel {
        if mean_intensity <= self.minimal {
            DamageLevel::Minimal
        } else if mean_intensity <= self.moderate {
            DamageLevel::Moderate
        } else if mean_intensity <= self.severe {
            DamageLevel::Severe
        } else {
            DamageLevel::Catastrophic
        }
    }

    /// textual ranges as reported in the field catalog
    pub fn ranges (&self)->Vec<(DamageLevel,String)> {
        vec![
            (DamageLevel::Minimal, format!("0.0-{}", self.minimal)),
            (DamageLevel::Moderate, format!("{}-{}", self.minimal, self.moderate)),
            (DamageLevel::Severe, format!("{}-{}", self.moderate, self.severe)),
            (DamageLevel::Catastrophic, format!("{}-1.0", self.severe)),
        ]
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
pub enum Connectivity {
    Four,
    Eight
}

impl From<Connectivity> for LabelConnectivity {
    fn from (c: Connectivity)->Self {
        match c {
            Connectivity::Four => LabelConnectivity::Four,
            Connectivity::Eight => LabelConnectivity::Eight,
        }
    }
}

/// all tunables of the damage analysis. This is immutable once an analyzer is created.
/// Fields that are missing in a config file get their default values
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    pub thresholds: DamageThresholds,

    /// components with fewer pixels are noise
    pub min_region_pixels: usize,
    pub connectivity: Connectivity,

    // loader memory budget
    pub memory_reserve_bytes: u64,
    pub load_bytes_per_pixel: u64,
    /// if set we don't ask the system for available memory
    pub available_memory_bytes: Option<u64>,
    /// additional integer decimation if the loader kept the native resolution
    pub force_downsample: usize,

    // tiling
    pub tile_memory_fraction: f64,
    pub tile_bytes_per_pixel: u64,
    pub min_tile_size: usize,
    pub max_tile_size: usize,
    pub max_workers: usize,
    pub tile_batch_size: Option<usize>,
    /// tiles whose pre and post bands all have a spatial variance below this (8 bit units squared) are not analyzed
    pub tile_variance_floor: f64,
    /// tiles with fewer changed pixels are not classified
    pub min_changed_pixels: usize,

    // strategy selection
    pub fast_pixel_threshold: usize,
    pub fast_classify_pixels: usize,
    pub fast_classify_regions: usize,
    pub tiling_pixel_threshold: usize,

    /// change intensities at or below this are never considered changed
    pub min_change_intensity: f32,

    /// target system of the coordinate mapper
    pub reference_crs: String,
}

impl Default for DamageConfig {
    fn default()->Self {
        DamageConfig {
            thresholds: DamageThresholds::default(),
            min_region_pixels: 10,
            connectivity: Connectivity::Four,

            memory_reserve_bytes: 2 * GIB,
            load_bytes_per_pixel: 24, // 3 bands x 2 images x 4 bytes processing overhead
            available_memory_bytes: None,
            force_downsample: 1,

            tile_memory_fraction: 0.3,
            tile_bytes_per_pixel: 24, // 3 bands x 8 bytes
            min_tile_size: 256,
            max_tile_size: 1024,
            max_workers: 5,
            tile_batch_size: None,
            tile_variance_floor: 100.0,
            min_changed_pixels: 10,

            fast_pixel_threshold: 500_000,
            fast_classify_pixels: 1_000_000,
            fast_classify_regions: 1_000,
            tiling_pixel_threshold: 1_000_000,

            min_change_intensity: 0.02,
            reference_crs: "EPSG:4326".to_string(),
        }
    }
}

impl DamageConfig {
    pub fn load<P: AsRef<Path>> (path: P)->Result<Self> {
        let input = fs::read_to_string( path.as_ref())?;
        let config: DamageConfig = ron::from_str( &input)?;
        config.validate()?;
        Ok( config)
    }

    pub fn validate (&self)->Result<()> {
        let t = &self.thresholds;
        if !(0.0 < t.minimal && t.minimal < t.moderate && t.moderate < t.severe && t.severe < 1.0) {
            return Err( config_error( format!("damage thresholds not ascending within (0,1): {:?}", t)))
        }
        if self.min_region_pixels == 0 || self.min_changed_pixels == 0 {
            return Err( config_error("noise floors have to be positive"))
        }
        if self.min_tile_size == 0 || self.min_tile_size > self.max_tile_size {
            return Err( config_error( format!("invalid tile size range {}..{}", self.min_tile_size, self.max_tile_size)))
        }
        if !(self.tile_memory_fraction > 0.0 && self.tile_memory_fraction <= 1.0) {
            return Err( config_error( format!("tile memory fraction {} not in (0,1]", self.tile_memory_fraction)))
        }
        if self.load_bytes_per_pixel == 0 || self.tile_bytes_per_pixel == 0 {
            return Err( config_error("bytes per pixel have to be positive"))
        }
        if self.max_workers == 0 || self.force_downsample == 0 || self.tile_batch_size == Some(0) {
            return Err( config_error("worker count, batch size and downsample factor have to be positive"))
        }
        if !(0.0..1.0).contains( &self.min_change_intensity) {
            return Err( config_error( format!("min change intensity {} not in [0,1)", self.min_change_intensity)))
        }
        self.reference_crs()?;
        Ok(())
    }

    pub fn reference_crs (&self)->Result<Crs> {
        Crs::from_spec( &self.reference_crs).map_err( |e| config_error( e))
    }

    /// number of tile workers: capped by config and leaving one cpu for the orchestrator
    pub fn worker_count (&self)->usize {
        let cpus = std::thread::available_parallelism().map( |n| n.get()).unwrap_or(2);
        self.max_workers.min( cpus.saturating_sub(1)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundaries () {
        let t = DamageThresholds::default();
        assert_eq!( t.classify( 0.05), DamageLevel::Minimal);
        assert_eq!( t.classify( 0.10), DamageLevel::Minimal);
        assert_eq!( t.classify( 0.1001), DamageLevel::Moderate);
        assert_eq!( t.classify( 0.30), DamageLevel::Moderate);
        assert_eq!( t.classify( 0.45), DamageLevel::Severe);
        assert_eq!( t.classify( 0.60), DamageLevel::Severe);
        assert_eq!( t.classify( 0.61), DamageLevel::Catastrophic);
        assert_eq!( t.classify( 1.0), DamageLevel::Catastrophic);
    }

    #[test]
    fn test_partial_ron () {
        let config: DamageConfig = ron::from_str( "(min_region_pixels: 25, thresholds: (minimal: 0.05))").unwrap();
        assert_eq!( config.min_region_pixels, 25);
        assert_eq!( config.thresholds.minimal, 0.05);
        assert_eq!( config.thresholds.moderate, 0.30);
        assert_eq!( config.max_tile_size, 1024);
        assert!( config.validate().is_ok());
    }

    #[test]
    fn test_validate () {
        let mut config = DamageConfig::default();
        assert!( config.validate().is_ok());

        config.thresholds.moderate = 0.05;
        assert!( config.validate().is_err());

        let config = DamageConfig { min_tile_size: 2048, ..DamageConfig::default() };
        assert!( config.validate().is_err());

        let config = DamageConfig { reference_crs: "nowhere".into(), ..DamageConfig::default() };
        assert!( config.validate().is_err());

        assert!( DamageConfig::default().worker_count() >= 1);
    }
}
