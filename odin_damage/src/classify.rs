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

//! turn a change mask into labeled damage regions ("fields") and per severity statistics

use std::f64::consts::PI;
use image::{GrayImage, Luma};
use imageproc::region_labelling::connected_components;
use ndarray::Array2;
use serde::{Deserialize,Serialize};
use tracing::debug;
use odin_raster::{CoordinateMapper, GeoCoord};

use crate::{
    Connectivity, DamageConfig, DamageLevel, Strategy,
    errors::{Result, invalid_dimensions}
};

const HISTOGRAM_BINS: usize = 10;

/* #region field data model *************************************************************************/

#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct GeoBounds {
    pub southwest: GeoCoord,
    pub northeast: GeoCoord,
}

/// inclusive pixel bounds
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct PixelBounds {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub geographic: Option<GeoBounds>,
}

/// mean pixel position of a field
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub latitude: Option<f64>,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct FieldGeometry {
    pub bounds: PixelBounds,
    pub centroid: Centroid,
    pub area_pixels: usize,
    pub width_pixels: usize,
    pub height_pixels: usize,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub perimeter_pixels: Option<f64>,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub compactness: Option<f64>,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct IntensityStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    #[serde(rename="distribution",skip_serializing_if="Option::is_none",default)]
    pub histogram: Option<[u32;HISTOGRAM_BINS]>,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct DamageAssessment {
    pub level: DamageLevel,
    pub level_index: u8,
    pub intensity: IntensityStats,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct ShapeAnalysis {
    pub aspect_ratio: f64,
    pub regularity: f64,
    pub elongation: f64,
}

/// a connected region of changed pixels that passed the noise floor
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct Field {
    pub field_id: usize,
    pub geometry: FieldGeometry,
    pub damage_assessment: DamageAssessment,
    #[serde(skip_serializing_if="Option::is_none",default)]
    pub shape_analysis: Option<ShapeAnalysis>,
}

impl Field {
    pub fn level (&self)->DamageLevel { self.damage_assessment.level }
    pub fn area (&self)->usize { self.geometry.area_pixels }
    pub fn mean_intensity (&self)->f64 { self.damage_assessment.intensity.mean }

    /// the same field in a raster where our origin is at (dx,dy). Geographic positions are dropped
    pub fn translated (mut self, dx: usize, dy: usize)->Field {
        let g = &mut self.geometry;
        g.bounds.min_x += dx;
        g.bounds.max_x += dx;
        g.bounds.min_y += dy;
        g.bounds.max_y += dy;
        g.bounds.geographic = None;
        g.centroid.x += dx as f64;
        g.centroid.y += dy as f64;
        g.centroid.longitude = None;
        g.centroid.latitude = None;
        self
    }

    /// add geographic centroid and bounds if the mapper can provide them
    pub fn with_geography (mut self, mapper: &CoordinateMapper)->Field {
        if !mapper.is_initialized() { return self }

        let b = &self.geometry.bounds;
        let (min_x, max_x, min_y, max_y) = (b.min_x as f64, (b.max_x + 1) as f64, b.min_y as f64, (b.max_y + 1) as f64);
        if let Some(corners) = mapper.pixels_to_geographic( &[(min_x,max_y), (max_x,min_y)]) {
            self.geometry.bounds.geographic = Some( GeoBounds{ southwest: corners[0], northeast: corners[1] });
        }

        // centroid is in pixel index space, mapper works on pixel corners
        let c = &self.geometry.centroid;
        if let Some(gc) = mapper.pixel_to_geographic( c.x + 0.5, c.y + 0.5) {
            self.geometry.centroid.longitude = Some(gc.longitude);
            self.geometry.centroid.latitude = Some(gc.latitude);
        }
        self
    }
}

/* #endregion field data model */

/* #region statistics *******************************************************************************/

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
pub struct LevelStatistics {
    /// number of regions
    pub count: usize,
    /// summed pixel area
    pub total_area: usize,
    /// mean of the per region mean intensities
    pub avg_intensity: f64,
}

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
pub struct DamageStatistics {
    pub minimal: LevelStatistics,
    pub moderate: LevelStatistics,
    pub severe: LevelStatistics,
    pub catastrophic: LevelStatistics,
}

impl DamageStatistics {
    pub fn get (&self, level: DamageLevel)->Option<&LevelStatistics> {
        match level {
            DamageLevel::None => None,
            DamageLevel::Minimal => Some(&self.minimal),
            DamageLevel::Moderate => Some(&self.moderate),
            DamageLevel::Severe => Some(&self.severe),
            DamageLevel::Catastrophic => Some(&self.catastrophic),
        }
    }

    fn get_mut (&mut self, level: DamageLevel)->Option<&mut LevelStatistics> {
        match level {
            DamageLevel::None => None,
            DamageLevel::Minimal => Some(&mut self.minimal),
            DamageLevel::Moderate => Some(&mut self.moderate),
            DamageLevel::Severe => Some(&mut self.severe),
            DamageLevel::Catastrophic => Some(&mut self.catastrophic),
        }
    }

    /// (level,stats) in ascending severity
    pub fn iter (&self)->impl Iterator<Item=(DamageLevel,&LevelStatistics)> {
        DamageLevel::SEVERITIES.into_iter().filter_map( move |l| self.get(l).map( |s| (l,s)))
    }

    pub fn from_fields (fields: &[Field])->Self {
        let mut stats = DamageStatistics::default();
        for f in fields {
            if let Some(s) = stats.get_mut( f.level()) {
                s.count += 1;
                s.total_area += f.area();
                s.avg_intensity += f.mean_intensity();
            }
        }
        stats.average_intensities();
        stats
    }

    /// areas from a label raster, counts and intensities from the fields. This is what we use after
    /// stitching tiles
    pub fn from_labels (labels: &Array2<u8>, fields: &[Field])->Self {
        let mut stats = DamageStatistics::from_fields( fields);
        for l in DamageLevel::SEVERITIES {
            if let Some(s) = stats.get_mut(l) { s.total_area = 0; }
        }
        for &v in labels.iter() {
            if let Some(s) = DamageLevel::from_index(v).and_then( |l| stats.get_mut(l)) {
                s.total_area += 1;
            }
        }
        stats
    }

    fn average_intensities (&mut self) {
        for l in DamageLevel::SEVERITIES {
            if let Some(s) = self.get_mut(l) {
                if s.count > 0 { s.avg_intensity /= s.count as f64; }
            }
        }
    }

    pub fn total_damaged_area (&self)->usize { self.iter().map( |(_,s)| s.total_area).sum() }

    pub fn total_regions (&self)->usize { self.iter().map( |(_,s)| s.count).sum() }
}

/* #endregion statistics */

/* #region classification ***************************************************************************/

/// connected components of a change mask. Label 0 is background
pub struct Components {
    pub labels: Array2<u32>,
    pub count: usize,
}

impl Components {
    pub fn dim (&self)->(usize,usize) { self.labels.dim() }
    pub fn pixel_count (&self)->usize { self.labels.len() }
}

pub fn label_components (mask: &Array2<bool>, connectivity: Connectivity)->Components {
    let (h,w) = mask.dim();
    let img = GrayImage::from_fn( w as u32, h as u32, |x,y| Luma([ if mask[[y as usize, x as usize]] { 255 } else { 0 } ]));
    let label_img = connected_components( &img, connectivity.into(), Luma([0u8]));

    let mut count = 0usize;
    let labels = Array2::from_shape_fn( (h,w), |(y,x)| {
        let l = label_img.get_pixel( x as u32, y as u32).0[0];
        count = count.max( l as usize);
        l
    });

    Components { labels, count }
}

/// result of classifying one (full or tile) change map
#[derive(Debug,Clone)]
pub struct Classification {
    /// per pixel `DamageLevel` index
    pub labels: Array2<u8>,
    pub statistics: DamageStatistics,
    pub fields: Vec<Field>,
    pub strategy: Strategy,
}

impl Classification {
    pub fn empty (width: usize, height: usize, strategy: Strategy)->Self {
        Classification {
            labels: Array2::zeros( (height,width)),
            statistics: DamageStatistics::default(),
            fields: Vec::new(),
            strategy
        }
    }
}

#[derive(Clone)]
struct RegionAcc {
    area: usize,
    min_x: usize, max_x: usize,
    min_y: usize, max_y: usize,
    sum_x: f64, sum_y: f64,
    sum_v: f64, min_v: f32, max_v: f32,
}

impl Default for RegionAcc {
    fn default()->Self {
        RegionAcc {
            area: 0, min_x: usize::MAX, max_x: 0, min_y: usize::MAX, max_y: 0,
            sum_x: 0.0, sum_y: 0.0, sum_v: 0.0, min_v: f32::MAX, max_v: f32::MIN
        }
    }
}

impl RegionAcc {
    #[inline]
    fn add (&mut self, x: usize, y: usize, v: f32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as f64;
        self.sum_y += y as f64;
        self.sum_v += v as f64;
        self.min_v = self.min_v.min(v);
        self.max_v = self.max_v.max(v);
    }

    fn mean (&self)->f64 { self.sum_v / self.area as f64 }
}

/// label the mask, pick the classification strategy from size and region count and classify
pub fn classify_damage (change_map: &Array2<f32>, mask: &Array2<bool>, config: &DamageConfig, mapper: Option<&CoordinateMapper>)->Result<Classification> {
    let components = label_components( mask, config.connectivity);
    let strategy = Strategy::for_classification( components.pixel_count(), components.count, config);
    classify_components( &components, change_map, strategy, config, mapper)
}

pub fn classify_components (components: &Components, change_map: &Array2<f32>, strategy: Strategy,
                            config: &DamageConfig, mapper: Option<&CoordinateMapper>)->Result<Classification> {
    if components.dim() != change_map.dim() {
        return Err( invalid_dimensions( format!("labels {:?} != change map {:?}", components.dim(), change_map.dim())))
    }
    let (h,w) = change_map.dim();
    let lbl = &components.labels;

    let mut regions: Vec<RegionAcc> = vec![ RegionAcc::default(); components.count + 1];
    for ((y,x), &l) in lbl.indexed_iter() {
        if l > 0 { regions[l as usize].add( x, y, change_map[[y,x]]); }
    }

    let levels: Vec<DamageLevel> = regions.iter().enumerate().map( |(i,r)| {
        if i == 0 || r.area < config.min_region_pixels { DamageLevel::None } else { config.thresholds.classify( r.mean() as f32) }
    }).collect();

    let labels = lbl.mapv( |l| levels[l as usize].index());

    // only the precise variant computes perimeters and histograms
    let (perimeters, histograms) = if strategy == Strategy::Precise {
        region_shapes( lbl, change_map, &levels)
    } else {
        (Vec::new(), Vec::new())
    };

    let mut fields: Vec<Field> = Vec::new();
    for (i,r) in regions.iter().enumerate() {
        let level = levels[i];
        if level == DamageLevel::None { continue }

        let width = r.max_x - r.min_x + 1;
        let height = r.max_y - r.min_y + 1;
        let area = r.area as f64;

        let (perimeter, compactness, shape) = if let Some(&p) = perimeters.get(i) {
            let shape = ShapeAnalysis {
                aspect_ratio: width as f64 / height as f64,
                regularity: if p > 0.0 { 4.0 * PI * area / (p*p) } else { 0.0 },
                elongation: width.min(height) as f64 / width.max(height) as f64,
            };
            (Some(p), Some( p*p / (4.0 * PI * area)), Some(shape))
        } else {
            (None, None, None)
        };

        let field = Field {
            field_id: fields.len() + 1,
            geometry: FieldGeometry {
                bounds: PixelBounds{ min_x: r.min_x, max_x: r.max_x, min_y: r.min_y, max_y: r.max_y, geographic: None },
                centroid: Centroid{ x: r.sum_x / area, y: r.sum_y / area, longitude: None, latitude: None },
                area_pixels: r.area,
                width_pixels: width,
                height_pixels: height,
                perimeter_pixels: perimeter,
                compactness,
            },
            damage_assessment: DamageAssessment {
                level,
                level_index: level.index(),
                intensity: IntensityStats {
                    mean: r.mean(),
                    max: r.max_v as f64,
                    min: r.min_v as f64,
                    histogram: histograms.get(i).copied()
                }
            },
            shape_analysis: shape,
        };

        fields.push( match mapper {
            Some(mapper) => field.with_geography( mapper),
            None => field
        });
    }

    let statistics = DamageStatistics::from_fields( &fields);
    debug!("{} classification of {}x{}: {} components, {} fields", strategy.name(), w, h, components.count, fields.len());

    Ok( Classification{ labels, statistics, fields, strategy } )
}

/// perimeter (number of 4-neighbor pixel sides bordering another region or the raster edge) and
/// intensity histogram for each retained region
fn region_shapes (lbl: &Array2<u32>, change_map: &Array2<f32>, levels: &[DamageLevel])->(Vec<f64>,Vec<[u32;HISTOGRAM_BINS]>) {
    let (h,w) = lbl.dim();
    let mut perimeters = vec![ 0.0f64; levels.len()];
    let mut histograms = vec![ [0u32;HISTOGRAM_BINS]; levels.len()];

    for ((y,x), &l) in lbl.indexed_iter() {
        let li = l as usize;
        if l == 0 || levels[li] == DamageLevel::None { continue }

        let bin = ((change_map[[y,x]] * HISTOGRAM_BINS as f32) as usize).min( HISTOGRAM_BINS - 1);
        histograms[li][bin] += 1;

        let mut sides = 0;
        if x == 0 || lbl[[y,x-1]] != l { sides += 1; }
        if x + 1 == w || lbl[[y,x+1]] != l { sides += 1; }
        if y == 0 || lbl[[y-1,x]] != l { sides += 1; }
        if y + 1 == h || lbl[[y+1,x]] != l { sides += 1; }
        perimeters[li] += sides as f64;
    }

    (perimeters, histograms)
}

/* #endregion classification */
