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

use std::sync::Arc;
use serde::{Deserialize,Serialize};
use tracing::warn;

use crate::{Bounds, Crs, GeoTransform, GeodeticReprojector, Reproject};

#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct GeoCoord {
    pub longitude: f64,
    pub latitude: f64
}

/// maps pixel positions of the aligned analysis raster into the reference coordinate system.
///
/// A mapper starts out uninitialized and only becomes usable once it got the affine transform (and
/// optionally the CRS) of the aligned raster. Pixel coordinates refer to the upper left pixel corner,
/// i.e. (0,0) maps to the raster origin. If the raster has no CRS the map coordinates are returned
/// as-is. Mapping never fails hard - if a position can't be mapped we log and return `None` so that
/// callers can keep the pixel geometry.
pub struct CoordinateMapper {
    transform: Option<GeoTransform>,
    source_crs: Option<Crs>,
    target_crs: Crs,
    reprojector: Arc<dyn Reproject>,
}

impl CoordinateMapper {
    pub fn new (target_crs: Crs, reprojector: Arc<dyn Reproject>)->Self {
        CoordinateMapper { transform: None, source_crs: None, target_crs, reprojector }
    }

    /// uninitialized mapper to WGS84 that uses our closed form reprojection
    pub fn geodetic ()->Self {
        Self::new( Crs::Wgs84, Arc::new( GeodeticReprojector))
    }

    pub fn initialize (&mut self, transform: Option<GeoTransform>, crs: Option<Crs>) {
        self.transform = transform;
        self.source_crs = crs;
    }

    pub fn is_initialized (&self)->bool { self.transform.is_some() }

    pub fn transform (&self)->Option<&GeoTransform> { self.transform.as_ref() }
    pub fn source_crs (&self)->Option<&Crs> { self.source_crs.as_ref() }
    pub fn target_crs (&self)->&Crs { &self.target_crs }

    /// pixel position in source map units
    pub fn pixel_to_map (&self, x: f64, y: f64)->Option<(f64,f64)> {
        self.transform.as_ref().map( |t| t.apply( x, y))
    }

    pub fn pixel_to_geographic (&self, x: f64, y: f64)->Option<GeoCoord> {
        self.pixels_to_geographic( &[(x,y)]).and_then( |v| v.into_iter().next())
    }

    /// batch version (all or nothing)
    pub fn pixels_to_geographic (&self, pixels: &[(f64,f64)])->Option<Vec<GeoCoord>> {
        let transform = self.transform.as_ref()?;
        let mut pts: Vec<(f64,f64)> = pixels.iter().map( |&(x,y)| transform.apply( x, y)).collect();

        if let Some(src) = &self.source_crs {
            if let Err(e) = self.reprojector.reproject( src, &self.target_crs, &mut pts) {
                warn!("failed to map {} pixel positions to {}: {}", pixels.len(), self.target_crs, e);
                return None
            }
        }

        Some( pts.into_iter().map( |(longitude,latitude)| GeoCoord{longitude,latitude}).collect())
    }

    /// map bounds of the whole raster in the target system
    pub fn raster_bounds (&self, width: usize, height: usize)->Option<Bounds> {
        let (w,h) = (width as f64, height as f64);
        let corners = self.pixels_to_geographic( &[(0.0,0.0), (w,0.0), (w,h), (0.0,h)])?;
        let pts: Vec<(f64,f64)> = corners.iter().map( |c| (c.longitude,c.latitude)).collect();
        Some( Bounds::enclosing( &pts))
    }
}
