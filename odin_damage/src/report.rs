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

//! JSON damage report, field catalog and the overlay image

use std::{fs::File, io::{BufWriter, Write}, path::Path};
use chrono::{DateTime, SecondsFormat, Utc};
use image::{Rgba, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize,Serialize};
use odin_raster::{Bounds, CoordinateMapper, GeoCoord};

use crate::{
    AlignmentMetadata, DamageConfig, DamageLevel, DamageThresholds,
    classify::{DamageStatistics, Field, GeoBounds, LevelStatistics},
    errors::Result
};

fn round_to (v: f64, decimals: i32)->f64 {
    let f = 10f64.powi( decimals);
    (v * f).round() / f
}

fn percentage (part: f64, total: f64)->f64 {
    if total > 0.0 { part / total * 100.0 } else { 0.0 }
}

pub fn save_json<T: Serialize, P: AsRef<Path>> (value: &T, path: P)->Result<()> {
    let mut w = BufWriter::new( File::create( path.as_ref())?);
    serde_json::to_writer_pretty( &mut w, value)?;
    w.flush()?;
    Ok(())
}

/* #region damage report ****************************************************************************/

#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct AnalysisMetadata {
    pub timestamp: String,
    pub image_dimensions: ImageDimensions,
    pub resolution_m_per_pixel: f64,
    pub total_area_km2: f64,
    pub analysis_method: String,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct LevelReport {
    pub region_count: usize,
    pub total_area_m2: f64,
    pub total_area_km2: f64,
    pub percentage_of_total_area: f64,
    pub percentage_of_damaged_area: f64,
    pub average_change_intensity: f64,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct LevelReports {
    pub minimal: LevelReport,
    pub moderate: LevelReport,
    pub severe: LevelReport,
    pub catastrophic: LevelReport,
}

impl LevelReports {
    pub fn get (&self, level: DamageLevel)->Option<&LevelReport> {
        match level {
            DamageLevel::None => None,
            DamageLevel::Minimal => Some(&self.minimal),
            DamageLevel::Moderate => Some(&self.moderate),
            DamageLevel::Severe => Some(&self.severe),
            DamageLevel::Catastrophic => Some(&self.catastrophic),
        }
    }
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct ReportSummary {
    pub total_damaged_area_km2: f64,
    pub percentage_area_affected: f64,
    pub most_common_damage_level: DamageLevel,
    pub total_damage_regions: usize,
}

/// area based summary of a damage analysis
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct DamageReport {
    pub analysis_metadata: AnalysisMetadata,
    pub damage_assessment: LevelReports,
    pub summary: ReportSummary,
}

impl DamageReport {
    pub fn new (stats: &DamageStatistics, meta: &AlignmentMetadata, method: &str, timestamp: DateTime<Utc>)->Self {
        let pixel_area_m2 = meta.resolution * meta.resolution;
        let total_pixels = meta.pixel_count() as f64;
        let damaged_pixels = stats.total_damaged_area() as f64;

        let level_report = |s: &LevelStatistics| {
            let area_m2 = s.total_area as f64 * pixel_area_m2;
            LevelReport {
                region_count: s.count,
                total_area_m2: round_to( area_m2, 2),
                total_area_km2: round_to( area_m2 / 1e6, 6),
                percentage_of_total_area: round_to( percentage( s.total_area as f64, total_pixels), 2),
                percentage_of_damaged_area: round_to( percentage( s.total_area as f64, damaged_pixels), 2),
                average_change_intensity: round_to( s.avg_intensity, 3),
            }
        };

        DamageReport {
            analysis_metadata: AnalysisMetadata {
                timestamp: timestamp.to_rfc3339_opts( SecondsFormat::Secs, true),
                image_dimensions: ImageDimensions{ width: meta.width, height: meta.height },
                resolution_m_per_pixel: meta.resolution,
                total_area_km2: round_to( total_pixels * pixel_area_m2 / 1e6, 6),
                analysis_method: method.to_string(),
            },
            damage_assessment: LevelReports {
                minimal: level_report( &stats.minimal),
                moderate: level_report( &stats.moderate),
                severe: level_report( &stats.severe),
                catastrophic: level_report( &stats.catastrophic),
            },
            summary: ReportSummary {
                total_damaged_area_km2: round_to( damaged_pixels * pixel_area_m2 / 1e6, 6),
                percentage_area_affected: round_to( percentage( damaged_pixels, total_pixels), 2),
                most_common_damage_level: most_common_level( stats),
                total_damage_regions: stats.total_regions(),
            }
        }
    }

    pub fn save<P: AsRef<Path>> (&self, path: P)->Result<()> { save_json( self, path) }
}

/// level with the largest damaged area. Ties go to the lower severity
pub fn most_common_level (stats: &DamageStatistics)->DamageLevel {
    let mut best = (DamageLevel::None, 0);
    for (level,s) in stats.iter() {
        if s.total_area > best.1 { best = (level, s.total_area); }
    }
    best.0
}

/* #endregion damage report */

/* #region field catalog ****************************************************************************/

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct ThresholdRanges {
    pub minimal: String,
    pub moderate: String,
    pub severe: String,
    pub catastrophic: String,
}

impl ThresholdRanges {
    pub fn new (thresholds: &DamageThresholds)->Self {
        let mut ranges = ThresholdRanges {
            minimal: String::new(), moderate: String::new(), severe: String::new(), catastrophic: String::new()
        };
        for (level, range) in thresholds.ranges() {
            match level {
                DamageLevel::Minimal => ranges.minimal = range,
                DamageLevel::Moderate => ranges.moderate = range,
                DamageLevel::Severe => ranges.severe = range,
                DamageLevel::Catastrophic => ranges.catastrophic = range,
                DamageLevel::None => {}
            }
        }
        ranges
    }
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct CoordinateSystem {
    pub pixel_coordinates: String,
    pub geographic_coordinates: String,
    pub crs_original: Option<String>,
    pub has_geographic_coords: bool,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub image_bounds: Option<GeoBounds>,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct SizeDistribution {
    pub min_area: usize,
    pub max_area: usize,
    pub avg_area: f64,
}

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
pub struct DamageDistribution {
    pub minimal: usize,
    pub moderate: usize,
    pub severe: usize,
    pub catastrophic: usize,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct ShapeMetrics {
    pub avg_compactness: f64,
    pub avg_regularity: f64,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct FieldStatistics {
    pub size_distribution: SizeDistribution,
    pub damage_distribution: DamageDistribution,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub shape_metrics: Option<ShapeMetrics>,
}

impl FieldStatistics {
    fn from_fields (fields: &[Field])->Option<Self> {
        let min_area = fields.iter().map( |f| f.area()).min()?;
        let max_area = fields.iter().map( |f| f.area()).max()?;
        let avg_area = fields.iter().map( |f| f.area() as f64).sum::<f64>() / fields.len() as f64;

        let mut dd = DamageDistribution::default();
        for f in fields {
            match f.level() {
                DamageLevel::Minimal => dd.minimal += 1,
                DamageLevel::Moderate => dd.moderate += 1,
                DamageLevel::Severe => dd.severe += 1,
                DamageLevel::Catastrophic => dd.catastrophic += 1,
                DamageLevel::None => {}
            }
        }

        let shapes: Vec<(f64,f64)> = fields.iter().filter_map( |f| {
            let compactness = f.geometry.compactness?;
            let regularity = f.shape_analysis.as_ref()?.regularity;
            Some( (compactness, regularity))
        }).collect();
        let shape_metrics = if shapes.is_empty() { None } else {
            let n = shapes.len() as f64;
            Some( ShapeMetrics {
                avg_compactness: shapes.iter().map( |s| s.0).sum::<f64>() / n,
                avg_regularity: shapes.iter().map( |s| s.1).sum::<f64>() / n,
            })
        };

        Some( FieldStatistics {
            size_distribution: SizeDistribution{ min_area, max_area, avg_area },
            damage_distribution: dd,
            shape_metrics
        })
    }
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct CatalogMetadata {
    pub total_fields: usize,
    pub analysis_timestamp: String,
    pub analysis_method: String,
    pub damage_thresholds: ThresholdRanges,
    pub coordinate_system: CoordinateSystem,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub field_statistics: Option<FieldStatistics>,
}

/// all fields of an analysis with catalog level metadata
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct FieldCatalog {
    pub metadata: CatalogMetadata,
    pub fields: Vec<Field>,
}

impl FieldCatalog {
    pub fn new (fields: Vec<Field>, config: &DamageConfig, mapper: &CoordinateMapper, meta: &AlignmentMetadata,
                method: &str, timestamp: DateTime<Utc>)->Self {
        let damage_thresholds = ThresholdRanges::new( &config.thresholds);

        let image_bounds = mapper.raster_bounds( meta.width, meta.height).map( |b: Bounds| GeoBounds {
            southwest: GeoCoord{ longitude: b.left, latitude: b.bottom },
            northeast: GeoCoord{ longitude: b.right, latitude: b.top },
        });
        let coordinate_system = CoordinateSystem {
            pixel_coordinates: "column,row of the aligned image, origin at the upper left corner".to_string(),
            geographic_coordinates: mapper.target_crs().to_string(),
            crs_original: mapper.source_crs().map( |c| c.to_string()),
            has_geographic_coords: fields.iter().any( |f| f.geometry.centroid.longitude.is_some()),
            image_bounds,
        };

        FieldCatalog {
            metadata: CatalogMetadata {
                total_fields: fields.len(),
                analysis_timestamp: timestamp.to_rfc3339_opts( SecondsFormat::Secs, true),
                analysis_method: method.to_string(),
                damage_thresholds,
                coordinate_system,
                field_statistics: FieldStatistics::from_fields( &fields),
            },
            fields
        }
    }

    pub fn save<P: AsRef<Path>> (&self, path: P)->Result<()> { save_json( self, path) }
}

/* #endregion field catalog */

/* #region overlay **********************************************************************************/

const OVERLAY_ALPHA: u8 = 160;

pub fn level_color (level: DamageLevel)->Rgba<u8> {
    match level {
        DamageLevel::None => Rgba([0,0,0,0]),
        DamageLevel::Minimal => Rgba([0,255,0,OVERLAY_ALPHA]),
        DamageLevel::Moderate => Rgba([255,255,0,OVERLAY_ALPHA]),
        DamageLevel::Severe => Rgba([255,165,0,OVERLAY_ALPHA]),
        DamageLevel::Catastrophic => Rgba([255,0,0,OVERLAY_ALPHA]),
    }
}

/// transparent image with damaged pixels colored by severity
pub fn damage_overlay (labels: &Array2<u8>)->RgbaImage {
    let (h,w) = labels.dim();
    RgbaImage::from_fn( w as u32, h as u32, |x,y| {
        let level = DamageLevel::from_index( labels[[y as usize, x as usize]]).unwrap_or( DamageLevel::None);
        level_color( level)
    })
}

/* #endregion overlay */

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stats (minimal: usize, moderate: usize, severe: usize, catastrophic: usize)->DamageStatistics {
        let ls = |a: usize| LevelStatistics{ count: if a > 0 {1} else {0}, total_area: a, avg_intensity: if a > 0 {0.4567} else {0.0} };
        DamageStatistics{ minimal: ls(minimal), moderate: ls(moderate), severe: ls(severe), catastrophic: ls(catastrophic) }
    }

    #[test]
    fn test_most_common () {
        assert_eq!( most_common_level( &stats(0,0,0,0)), DamageLevel::None);
        assert_eq!( most_common_level( &stats(10,30,20,0)), DamageLevel::Moderate);
        assert_eq!( most_common_level( &stats(0,25,25,25)), DamageLevel::Moderate);
    }

    #[test]
    fn test_report_rounding () {
        let meta = AlignmentMetadata{ resolution: 0.3, ..AlignmentMetadata::ungeoreferenced( 1000, 1000) };
        let ts = Utc.with_ymd_and_hms( 2023, 2, 6, 1, 17, 0).unwrap();
        let report = DamageReport::new( &stats(0,0,2501,0), &meta, "precise", ts);

        let severe = &report.damage_assessment.severe;
        assert_eq!( severe.total_area_m2, 225.09);
        assert_eq!( severe.total_area_km2, 0.000225);
        assert_eq!( severe.percentage_of_total_area, 0.25);
        assert_eq!( severe.percentage_of_damaged_area, 100.0);
        assert_eq!( severe.average_change_intensity, 0.457);
        assert_eq!( report.damage_assessment.minimal.percentage_of_damaged_area, 0.0);

        assert_eq!( report.analysis_metadata.total_area_km2, 0.09);
        assert_eq!( report.analysis_metadata.timestamp, "2023-02-06T01:17:00Z");
        assert_eq!( report.summary.most_common_damage_level, DamageLevel::Severe);
        assert_eq!( report.summary.total_damage_regions, 1);

        let json = serde_json::to_value( &report).unwrap();
        assert_eq!( json["summary"]["most_common_damage_level"], "severe");
        assert_eq!( json["damage_assessment"]["severe"]["region_count"], 1);
    }

    #[test]
    fn test_overlay_colors () {
        let mut labels = Array2::<u8>::zeros( (2,3));
        labels[[0,1]] = 4;
        labels[[1,2]] = 1;
        let img = damage_overlay( &labels);
        assert_eq!( img.dimensions(), (3,2));
        assert_eq!( img.get_pixel( 1, 0), &Rgba([255,0,0,OVERLAY_ALPHA]));
        assert_eq!( img.get_pixel( 2, 1), &Rgba([0,255,0,OVERLAY_ALPHA]));
        assert_eq!( img.get_pixel( 0, 0).0[3], 0);
    }

    #[test]
    fn test_empty_catalog () {
        let config = DamageConfig::default();
        let mapper = CoordinateMapper::geodetic();
        let meta = AlignmentMetadata::ungeoreferenced( 64, 64);
        let catalog = FieldCatalog::new( Vec::new(), &config, &mapper, &meta, "fast", Utc::now());

        assert_eq!( catalog.metadata.total_fields, 0);
        assert!( catalog.metadata.field_statistics.is_none());
        assert!( !catalog.metadata.coordinate_system.has_geographic_coords);
        assert_eq!( catalog.metadata.damage_thresholds.minimal, "0.0-0.1");
        assert_eq!( catalog.metadata.damage_thresholds.moderate, "0.1-0.3");
        assert_eq!( catalog.metadata.damage_thresholds.catastrophic, "0.6-1.0");

        let json = serde_json::to_value( &catalog).unwrap();
        assert!( json["metadata"].get("field_statistics").is_none());
        assert_eq!( json["metadata"]["coordinate_system"]["geographic_coordinates"], "EPSG:4326");
    }

    #[test]
    fn test_custom_threshold_ranges () {
        let mut config = DamageConfig::default();
        config.thresholds = DamageThresholds { minimal: 0.05, moderate: 0.25, severe: 0.5 };
        let mapper = CoordinateMapper::geodetic();
        let meta = AlignmentMetadata::ungeoreferenced( 64, 64);
        let catalog = FieldCatalog::new( Vec::new(), &config, &mapper, &meta, "fast", Utc::now());

        let ranges = &catalog.metadata.damage_thresholds;
        assert_eq!( ranges, &ThresholdRanges::new( &config.thresholds));
        assert_eq!( ranges.minimal, "0.0-0.05");
        assert_eq!( ranges.moderate, "0.05-0.25");
        assert_eq!( ranges.severe, "0.25-0.5");
        assert_eq!( ranges.catastrophic, "0.5-1.0");
    }
}
