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

//! separable window filters over f32 planes, computed by imageproc. Borders are padded by
//! continuity (`aaa|abcd|ddd`)

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::separable_filter_equal;
use lazy_static::lazy_static;
use ndarray::{Array2, Zip};

type GrayF32 = ImageBuffer<Luma<f32>,Vec<f32>>;

lazy_static! {
    pub static ref GAUSS_3: Vec<f32> = gaussian_kernel( 3, 0.8);
    pub static ref GAUSS_5: Vec<f32> = gaussian_kernel( 5, 1.0);
    pub static ref GAUSS_11: Vec<f32> = gaussian_kernel( 11, 2.0);
    pub static ref BOX_7: Vec<f32> = box_kernel( 7);
    pub static ref BOX_11: Vec<f32> = box_kernel( 11);
}

pub fn gaussian_kernel (size: usize, sigma: f32)->Vec<f32> {
    let r = (size / 2) as f32;
    let mut k: Vec<f32> = (0..size).map( |i| {
        let d = i as f32 - r;
        (-(d*d) / (2.0*sigma*sigma)).exp()
    }).collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each( |v| *v /= sum);
    k
}

pub fn box_kernel (size: usize)->Vec<f32> {
    vec![ 1.0 / size as f32; size]
}

/// correlate rows and then columns with the same symmetric 1D kernel (odd length)
pub fn convolve_separable (src: &Array2<f32>, kernel: &[f32])->Array2<f32> {
    let (h,w) = src.dim();
    let img: GrayF32 = ImageBuffer::from_fn( w as u32, h as u32, |x,y| Luma([ src[[y as usize, x as usize]] ]));
    let filtered = separable_filter_equal( &img, kernel);
    Array2::from_shape_fn( (h,w), |(y,x)| filtered.get_pixel( x as u32, y as u32).0[0])
}

/// local mean and (population) variance over the kernel window
pub fn local_mean_var (src: &Array2<f32>, kernel: &[f32])->(Array2<f32>,Array2<f32>) {
    let mean = convolve_separable( src, kernel);
    let sq_mean = convolve_separable( &src.mapv( |v| v*v), kernel);
    let var = Zip::from( &sq_mean).and( &mean).map_collect( |&sq,&m| (sq - m*m).max(0.0));
    (mean, var)
}

/// 8 bit luma with the ITU-R 601 weights
pub fn luma8 (img: &RgbImage)->GrayImage {
    GrayImage::from_fn( img.width(), img.height(), |x,y| {
        let p = img.get_pixel( x, y).0;
        let l = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        image::Luma([ l.round().min(255.0) as u8 ])
    })
}

/// (rows, cols) plane of an 8 bit gray image
pub fn gray_plane (img: &GrayImage)->Array2<f32> {
    let (w,h) = (img.width() as usize, img.height() as usize);
    Array2::from_shape_fn( (h,w), |(y,x)| img.get_pixel( x as u32, y as u32).0[0] as f32)
}

/// sample mean and population standard deviation of all plane values
pub fn mean_std (a: &Array2<f32>)->(f32,f32) {
    let n = a.len();
    if n == 0 { return (0.0, 0.0) }
    let mean = a.iter().map( |&v| v as f64).sum::<f64>() / n as f64;
    let var = a.iter().map( |&v| { let d = v as f64 - mean; d*d }).sum::<f64>() / n as f64;
    (mean as f32, var.sqrt() as f32)
}
