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
#![allow(unused)]

//! georeferenced raster access for ODIN image analysis.
//!
//! This crate provides the raster boundary: a [`RasterSource`] abstraction for reading (optionally
//! resampled) RGB windows of georeferenced images, the affine [`GeoTransform`], coordinate reference
//! systems and point reprojection, GeoTIFF writers for analysis products, and the
//! [`CoordinateMapper`] that turns pixel positions into geographic coordinates.
//!
//! GeoTIFF input is read with the pure Rust `tiff` crate. If the `gdal` feature is enabled every
//! GDAL supported format can be opened through [`gdal_source::GdalSource`].

use std::path::Path;
use image::RgbImage;

pub mod errors;
pub use errors::{OdinRasterError,Result};

mod geotransform;
pub use geotransform::{GeoTransform,Bounds};

mod crs;
pub use crs::Crs;

pub mod reproject;
pub use reproject::{Reproject,GeodeticReprojector};

pub mod geotiff;
pub use geotiff::{GeoTiffSource,save_geotiff_rgb8,save_geotiff_gray8,save_geotiff_gray32f};

mod mem_source;
pub use mem_source::MemRasterSource;

mod mapper;
pub use mapper::{CoordinateMapper,GeoCoord};

#[cfg(feature = "gdal")]
pub mod gdal_source;

/// sample type of the raster bands as stored in the source
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum PixelType {
    U8, U16, I16, U32, I32, F32, F64, Other
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum Resampling {
    Nearest,
    Bilinear
}

impl Resampling {
    pub(crate) fn filter (&self)->image::imageops::FilterType {
        match self {
            Resampling::Nearest => image::imageops::FilterType::Nearest,
            Resampling::Bilinear => image::imageops::FilterType::Triangle,
        }
    }
}

/// pixel window of a raster (upper left corner and size)
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub struct Window {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize
}

impl Window {
    pub fn new (x: usize, y: usize, width: usize, height: usize)->Self { Window{x,y,width,height} }

    pub fn full (width: usize, height: usize)->Self { Window{ x: 0, y: 0, width, height } }

    pub fn check_within (&self, width: usize, height: usize)->Result<()> {
        if self.width == 0 || self.height == 0 || self.x + self.width > width || self.y + self.height > height {
            Err( OdinRasterError::InvalidWindow( format!("{:?} not within {}x{}", self, width, height)))
        } else {
            Ok(())
        }
    }
}

/// what we know about a raster without reading its pixels
#[derive(Debug,Clone,PartialEq)]
pub struct RasterMeta {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub pixel_type: PixelType,
    pub crs: Option<Crs>,
    pub transform: Option<GeoTransform>,
}

impl RasterMeta {
    pub fn pixel_count (&self)->usize { self.width * self.height }

    pub fn bounds (&self)->Option<Bounds> {
        self.transform.as_ref().map( |t| t.bounds( self.width, self.height))
    }

    /// the 1-based band indices we use to assemble an RGB image from this raster
    pub fn rgb_bands (&self)->[usize;3] {
        if self.band_count >= 3 { [1,2,3] } else { [1,1,1] }
    }
}

/// the raster boundary: anything that can tell us its metadata and read an 8 bit RGB window, optionally
/// resampled to a different output size
pub trait RasterSource: Send + Sync {
    /// human readable identification (normally the path) used in diagnostics
    fn name (&self)->String;

    fn meta (&self)->&RasterMeta;

    /// read the given 1-based `bands` of `window` into an RGB image of `out_size` (width,height)
    fn read_rgb8 (&self, bands: [usize;3], window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage>;
}

/// open a georeferenced raster file with the best available backend
pub fn open_raster<P: AsRef<Path>> (path: P)->Result<Box<dyn RasterSource>> {
    #[cfg(feature = "gdal")]
    {
        return Ok( Box::new( gdal_source::GdalSource::open( path)?))
    }

    #[cfg(not(feature = "gdal"))]
    {
        Ok( Box::new( GeoTiffSource::open( path)?))
    }
}

/// crop and resample helper for sources that already hold the whole image in memory
pub(crate) fn crop_resample (img: &RgbImage, window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage> {
    window.check_within( img.width() as usize, img.height() as usize)?;
    let (ow,oh) = out_size;
    if ow == 0 || oh == 0 {
        return Err( OdinRasterError::InvalidWindow( format!("empty output size {}x{}", ow, oh)))
    }

    let native = (window.width,window.height) == out_size;
    if window == Window::full( img.width() as usize, img.height() as usize) {
        return if native {
            Ok( img.clone())
        } else {
            Ok( image::imageops::resize( img, ow as u32, oh as u32, resampling.filter()))
        }
    }

    let sub = image::imageops::crop_imm( img, window.x as u32, window.y as u32, window.width as u32, window.height as u32);
    if native {
        Ok( sub.to_image())
    } else {
        Ok( image::imageops::resize( &*sub, ow as u32, oh as u32, resampling.filter()))
    }
}
