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

//! memory bounded loading of pre/post images onto a common pixel grid

use image::{RgbImage, imageops::{self, FilterType}};
use tracing::{info,warn};
use odin_raster::{Bounds, Crs, GeoTransform, RasterSource, Resampling, Window};

use crate::{
    DamageConfig, memory,
    errors::{OdinDamageError, Result, invalid_dimensions}
};

/// meters per degree of latitude (and of longitude at the equator)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// describes the common grid of an aligned image pair. Transform, CRS and bounds are the ones of the
/// post-event (reference) image, adjusted for downsampling
#[derive(Debug,Clone,PartialEq)]
pub struct AlignmentMetadata {
    pub width: usize,
    pub height: usize,
    pub native_width: usize,
    pub native_height: usize,
    pub transform: Option<GeoTransform>,
    pub crs: Option<Crs>,
    pub bounds: Option<Bounds>,
    /// approximate ground size of one (aligned) pixel in meters
    pub resolution: f64,
    /// integer decimation of the reference image (1 = native resolution)
    pub downsample_factor: usize,
}

impl AlignmentMetadata {
    pub fn pixel_count (&self)->usize { self.width * self.height }

    /// metadata for images that have no georeference
    pub fn ungeoreferenced (width: usize, height: usize)->Self {
        AlignmentMetadata {
            width, height, native_width: width, native_height: height,
            transform: None, crs: None, bounds: None, resolution: 1.0, downsample_factor: 1
        }
    }

    pub fn georeferenced (width: usize, height: usize, transform: GeoTransform, crs: Option<Crs>)->Self {
        let resolution = ground_resolution( &transform, crs.as_ref(), width, height);
        AlignmentMetadata {
            width, height, native_width: width, native_height: height,
            bounds: Some( transform.bounds( width, height)),
            transform: Some(transform), crs, resolution, downsample_factor: 1
        }
    }
}

/// two images of identical dimensions on the same grid
pub struct AlignedPair {
    pub pre: RgbImage,
    pub post: RgbImage,
    pub metadata: AlignmentMetadata,
}

impl AlignedPair {
    pub fn new (pre: RgbImage, post: RgbImage, metadata: AlignmentMetadata)->Result<Self> {
        if pre.dimensions() != post.dimensions() || post.dimensions() != (metadata.width as u32, metadata.height as u32) {
            return Err( invalid_dimensions( format!("pre {:?}, post {:?}, grid {}x{}",
                pre.dimensions(), post.dimensions(), metadata.width, metadata.height)))
        }
        Ok( AlignedPair{ pre, post, metadata } )
    }
}

/// number of pixels per image we can afford to hold in memory
pub fn max_pixel_budget (available: u64, config: &DamageConfig)->Result<u64> {
    let reserve = config.memory_reserve_bytes;
    if available <= reserve {
        return Err( OdinDamageError::InsufficientMemory{ available, reserve })
    }

    let max_pixels = (available - reserve) / config.load_bytes_per_pixel;
    if max_pixels == 0 {
        return Err( OdinDamageError::InsufficientMemory{ available, reserve })
    }
    Ok( max_pixels)
}

/// target (width, height, integer downsample factor) so that width*height fits into `max_pixels`
pub fn target_dimensions (width: usize, height: usize, max_pixels: u64)->Result<(usize,usize,usize)> {
    if width == 0 || height == 0 {
        return Err( invalid_dimensions( format!("empty source raster {}x{}", width, height)))
    }

    let total = (width * height) as u64;
    if total <= max_pixels {
        return Ok( (width, height, 1) )
    }

    let factor = (total as f64 / max_pixels as f64).sqrt().ceil() as usize;
    let (w,h) = (width / factor, height / factor);
    if w == 0 || h == 0 {
        return Err( invalid_dimensions( format!("{}x{} downsampled by {} is empty", width, height, factor)))
    }
    Ok( (w, h, factor) )
}

/// approximate meters per pixel. Degrees are converted at the latitude of the raster center
pub fn ground_resolution (transform: &GeoTransform, crs: Option<&Crs>, width: usize, height: usize)->f64 {
    let res = transform.x_resolution();
    match crs {
        Some(crs) if crs.is_geographic() => {
            let (_,lat) = transform.apply( width as f64 / 2.0, height as f64 / 2.0);
            res * METERS_PER_DEGREE * lat.to_radians().cos()
        }
        _ => res
    }
}

/// load both rasters onto the (possibly downsampled) grid of the post-event image
pub fn load_and_align (pre: &dyn RasterSource, post: &dyn RasterSource, config: &DamageConfig)->Result<AlignedPair> {
    let available = memory::available_memory( config);
    let max_pixels = max_pixel_budget( available, config)?;

    let post_meta = post.meta();
    let (native_w, native_h) = (post_meta.width, post_meta.height);
    let (w, h, factor) = target_dimensions( native_w, native_h, max_pixels)?;

    if factor > 1 {
        info!("{}x{} exceeds budget of {} pixels, downsampling by {} to {}x{}", native_w, native_h, max_pixels, factor, w, h);
    } else {
        info!("loading {}x{} at native resolution (budget {} pixels)", native_w, native_h, max_pixels);
    }

    let post_img = post.read_rgb8( post_meta.rgb_bands(), Window::full( native_w, native_h), (w,h), Resampling::Bilinear)?;

    let pre_meta = pre.meta();
    let mut pre_img = pre.read_rgb8( pre_meta.rgb_bands(), Window::full( pre_meta.width, pre_meta.height), (w,h), Resampling::Bilinear)?;
    if pre_img.dimensions() != post_img.dimensions() {
        pre_img = imageops::resize( &pre_img, w as u32, h as u32, FilterType::Triangle);
    }

    if let (Some(pre_crs), Some(post_crs)) = (&pre_meta.crs, &post_meta.crs) {
        if pre_crs != post_crs {
            warn!("pre-event CRS {} differs from post-event CRS {}, aligning on pixel grid only", pre_crs, post_crs);
        }
    }

    let transform = post_meta.transform.map( |t| t.scaled( native_w as f64 / w as f64, native_h as f64 / h as f64));
    let crs = post_meta.crs.clone();
    let resolution = match &transform {
        Some(t) => ground_resolution( t, crs.as_ref(), w, h),
        None => {
            warn!("{} has no georeference, using pixel units", post.name());
            factor as f64
        }
    };

    let metadata = AlignmentMetadata {
        width: w, height: h, native_width: native_w, native_height: native_h,
        bounds: post_meta.bounds(), transform, crs, resolution, downsample_factor: factor
    };
    let pair = AlignedPair::new( pre_img, post_img, metadata)?;

    if factor == 1 && config.force_downsample > 1 {
        Ok( force_downsample( pair, config.force_downsample))
    } else {
        Ok( pair)
    }
}

/// decimate both images by taking every `stride`-th pixel
pub fn force_downsample (pair: AlignedPair, stride: usize)->AlignedPair {
    if stride <= 1 { return pair }

    let AlignedPair{ pre, post, metadata: m } = pair;
    let w = m.width.div_ceil( stride);
    let h = m.height.div_ceil( stride);
    let s = stride as u32;
    let decimate = |img: &RgbImage| RgbImage::from_fn( w as u32, h as u32, |x,y| *img.get_pixel( x*s, y*s));

    info!("forced downsampling by {} to {}x{}", stride, w, h);
    let metadata = AlignmentMetadata {
        width: w,
        height: h,
        transform: m.transform.map( |t| t.scaled( stride as f64, stride as f64)),
        resolution: m.resolution * stride as f64,
        downsample_factor: m.downsample_factor * stride,
        ..m
    };

    AlignedPair{ pre: decimate( &pre), post: decimate( &post), metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GIB;

    #[test]
    fn test_budget () {
        let config = DamageConfig::default();
        assert!( matches!( max_pixel_budget( GIB, &config), Err(OdinDamageError::InsufficientMemory{..})));
        assert_eq!( max_pixel_budget( 2*GIB + 2400, &config).unwrap(), 100);
    }

    #[test]
    fn test_target_dimensions () {
        // 20000x20000 with a 100M pixel budget -> factor 2
        assert_eq!( target_dimensions( 20000, 20000, 100_000_000).unwrap(), (10000, 10000, 2));
        assert_eq!( target_dimensions( 512, 512, 1_000_000).unwrap(), (512, 512, 1));
        assert_eq!( target_dimensions( 1000, 10, 100).unwrap(), (100, 1, 10));
        assert!( target_dimensions( 1000, 1, 10).is_err());
        assert!( target_dimensions( 0, 10, 100).is_err());
    }

    #[test]
    fn test_ground_resolution () {
        let gt = GeoTransform::north_up( 36.0, 0.5, 0.0001, 0.0001);
        let r = ground_resolution( &gt, Some(&Crs::Wgs84), 100, 100);
        assert!( (r - 11.132).abs() < 0.01);

        let gt = GeoTransform::north_up( 500000.0, 4000000.0, 0.5, 0.5);
        assert_eq!( ground_resolution( &gt, Some(&Crs::UtmNorth(37)), 100, 100), 0.5);
    }

    #[test]
    fn test_force_downsample () {
        let img = RgbImage::from_fn( 10, 7, |x,y| image::Rgb([x as u8, y as u8, 0]));
        let md = AlignmentMetadata::georeferenced( 10, 7, GeoTransform::north_up( 0.0, 0.0, 1.0, 1.0), None);
        let pair = AlignedPair::new( img.clone(), img, md).unwrap();

        let pair = force_downsample( pair, 3);
        assert_eq!( pair.post.dimensions(), (4, 3));
        assert_eq!( pair.pre.get_pixel( 1, 2), &image::Rgb([3,6,0]));
        assert_eq!( pair.metadata.downsample_factor, 3);
        assert_eq!( pair.metadata.resolution, 3.0);
        assert_eq!( pair.metadata.native_width, 10);
    }
}
