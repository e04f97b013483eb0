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

use image::{Rgb, RgbImage};
use crate::{crop_resample, Crs, GeoTransform, PixelType, RasterMeta, RasterSource, Resampling, Window, errors::Result};

/// a raster that already lives in memory
pub struct MemRasterSource {
    name: String,
    image: RgbImage,
    meta: RasterMeta,
}

impl MemRasterSource {
    pub fn new (name: impl ToString, image: RgbImage, transform: Option<GeoTransform>, crs: Option<Crs>)->Self {
        let meta = RasterMeta {
            width: image.width() as usize,
            height: image.height() as usize,
            band_count: 3,
            pixel_type: PixelType::U8,
            crs,
            transform
        };
        MemRasterSource { name: name.to_string(), image, meta }
    }

    pub fn image (&self)->&RgbImage { &self.image }
}

impl RasterSource for MemRasterSource {
    fn name (&self)->String { self.name.clone() }

    fn meta (&self)->&RasterMeta { &self.meta }

    fn read_rgb8 (&self, bands: [usize;3], window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage> {
        let mut img = crop_resample( &self.image, window, out_size, resampling)?;
        if bands != [1,2,3] {
            for px in img.pixels_mut() {
                let src = px.0;
                let pick = |b: usize| src[ b.clamp(1,3) - 1];
                *px = Rgb([ pick(bands[0]), pick(bands[1]), pick(bands[2]) ]);
            }
        }
        Ok( img)
    }
}
