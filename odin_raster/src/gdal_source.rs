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

//! GDAL backed raster source and reprojection (feature "gdal")

use std::{path::{Path,PathBuf}, sync::Mutex};
use gdal::{Dataset, raster::{Buffer, GdalDataType, ResampleAlg}, spatial_ref::{CoordTransform, CoordTransformOptions, SpatialRef}};
use image::{Rgb, RgbImage};

use crate::{
    Crs, GeoTransform, PixelType, RasterMeta, RasterSource, Reproject, Resampling, Window,
    errors::{OdinRasterError, Result, op_failed}
};

/// GDAL datasets are not Sync so we serialize access
pub struct GdalSource {
    path: PathBuf,
    ds: Mutex<Dataset>,
    meta: RasterMeta,
}

impl GdalSource {
    pub fn open<P: AsRef<Path>> (path: P)->Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ds = Dataset::open( &path)?;

        let (width,height) = ds.raster_size();
        let band_count = ds.raster_count() as usize;
        let pixel_type = match ds.rasterband(1)?.band_type() {
            GdalDataType::UInt8 => PixelType::U8,
            GdalDataType::UInt16 => PixelType::U16,
            GdalDataType::Int16 => PixelType::I16,
            GdalDataType::UInt32 => PixelType::U32,
            GdalDataType::Int32 => PixelType::I32,
            GdalDataType::Float32 => PixelType::F32,
            GdalDataType::Float64 => PixelType::F64,
            _ => PixelType::Other
        };
        let transform = ds.geo_transform().ok().map( GeoTransform::new);
        let crs = ds.spatial_ref().ok().and_then( |srs| crs_of( &srs));

        let meta = RasterMeta { width, height, band_count, pixel_type, crs, transform };
        Ok( GdalSource{ path, ds: Mutex::new(ds), meta } )
    }
}

fn crs_of (srs: &SpatialRef)->Option<Crs> {
    if let Ok(code) = srs.auth_code() {
        Some( Crs::from_epsg( code as u32))
    } else {
        srs.to_wkt().ok().map( Crs::Wkt)
    }
}

fn spatial_ref (crs: &Crs)->Result<SpatialRef> {
    match crs {
        Crs::Wkt(wkt) => Ok( SpatialRef::from_wkt( wkt)?),
        other => {
            let epsg = other.epsg().ok_or_else( || op_failed( format!("no EPSG code for {}", other)))?;
            Ok( SpatialRef::from_epsg( epsg)?)
        }
    }
}

impl RasterSource for GdalSource {
    fn name (&self)->String { self.path.display().to_string() }

    fn meta (&self)->&RasterMeta { &self.meta }

    /// GDAL does the decimation while reading so we never hold the native resolution in memory
    fn read_rgb8 (&self, bands: [usize;3], window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage> {
        window.check_within( self.meta.width, self.meta.height)?;
        let alg = match resampling {
            Resampling::Nearest => ResampleAlg::NearestNeighbour,
            Resampling::Bilinear => ResampleAlg::Bilinear,
        };

        let ds = self.ds.lock().map_err( |_| op_failed("poisoned dataset lock"))?;
        let mut channels: Vec<Vec<u8>> = Vec::with_capacity(3);
        for b in bands {
            let band = ds.rasterband( b)?;
            let buf: Buffer<u8> = band.read_as( (window.x as isize, window.y as isize), (window.width, window.height), out_size, Some(alg))?;
            channels.push( buf.data().to_vec());
        }

        let (w,h) = out_size;
        let mut img = RgbImage::new( w as u32, h as u32);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Rgb([ channels[0][i], channels[1][i], channels[2][i] ]);
        }
        Ok( img)
    }
}

/// reprojection for everything GDAL/PROJ knows about
#[derive(Debug,Clone,Copy,Default)]
pub struct GdalReprojector;

impl Reproject for GdalReprojector {
    fn reproject (&self, from: &Crs, to: &Crs, pts: &mut [(f64,f64)])->Result<()> {
        if from == to || pts.is_empty() { return Ok(()) }

        let s_srs = spatial_ref( from)?;
        let t_srs = spatial_ref( to)?;
        let s_is_geo = s_srs.is_geographic();
        let t_is_geo = t_srs.is_geographic();

        let mut ct_options = CoordTransformOptions::new()?;
        ct_options.desired_accuracy( 0.0);
        ct_options.set_ballpark_allowed( false);
        let transform = CoordTransform::new_with_options( &s_srs, &t_srs, &ct_options)?;

        // EPSG geographic systems are lat/lon ordered in GDAL >= 3
        let mut xs: Vec<f64> = pts.iter().map( |p| if s_is_geo { p.1 } else { p.0 }).collect();
        let mut ys: Vec<f64> = pts.iter().map( |p| if s_is_geo { p.0 } else { p.1 }).collect();
        let mut zs: [f64;0] = [];

        transform.transform_coords( &mut xs, &mut ys, &mut zs)
            .map_err( |e| OdinRasterError::ReprojectionFailed( e.to_string()))?;

        for (i,p) in pts.iter_mut().enumerate() {
            *p = if t_is_geo { (ys[i], xs[i]) } else { (xs[i], ys[i]) };
        }
        Ok(())
    }
}
