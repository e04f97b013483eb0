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

//! per-pixel change intensity of two aligned images.
//!
//! Change is a weighted combination of three signals, each normalized to [0,1]:
//!  - structural change (local correlation resp. SSIM of the luma planes)
//!  - color distance in RGB space
//!  - edge change
//!
//! The resulting map is smoothed, clipped to [0,1] and binarized into a change mask. There are two
//! variants: `Fast` (box window correlation, Sobel gradients, global threshold) for large inputs and
//! `Precise` (SSIM, Canny edges, locally adaptive threshold) for inputs below the configured size.

use image::RgbImage;
use imageproc::{edges::canny, gradients::{horizontal_sobel, vertical_sobel}};
use ndarray::{Array2, Zip};
use serde::{Deserialize,Serialize};
use tracing::debug;

use crate::{
    DamageConfig,
    errors::{Result, invalid_dimensions},
    filters::{BOX_7, BOX_11, GAUSS_3, GAUSS_5, GAUSS_11, convolve_separable, gray_plane, local_mean_var, luma8, mean_std}
};

const STRUCTURAL_WEIGHT: f32 = 0.5;
const COLOR_WEIGHT: f32 = 0.3;
const EDGE_WEIGHT: f32 = 0.2;

/// windows with a luma variance below this are flat (no structure to correlate)
const FLAT_VARIANCE: f32 = 1.0;

/// global threshold is mean + k * stddev of the change map
const GLOBAL_THRESHOLD_K: f32 = 1.5;

// SSIM stabilization constants for 8 bit data
const SSIM_C1: f32 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f32 = (0.03 * 255.0) * (0.03 * 255.0);
const SSIM_COV_NORM: f32 = 49.0 / 48.0; // sample covariance over 7x7 window

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

// adaptive (Sauvola) threshold parameters for values in [0,1]
const ADAPTIVE_K: f32 = 0.2;
const ADAPTIVE_R: f32 = 0.5;

#[derive(Debug,Clone,Copy,PartialEq,Eq,Serialize,Deserialize)]
#[serde(rename_all="lowercase")]
pub enum Strategy {
    Fast,
    Precise
}

impl Strategy {
    /// choose the change detection variant for an input of `pixels`
    pub fn for_detection (pixels: usize, config: &DamageConfig)->Strategy {
        if pixels > config.fast_pixel_threshold { Strategy::Fast } else { Strategy::Precise }
    }

    /// choose the classification variant for an input of `pixels` with `regions` connected components
    pub fn for_classification (pixels: usize, regions: usize, config: &DamageConfig)->Strategy {
        if regions > config.fast_classify_regions || pixels > config.fast_classify_pixels { Strategy::Fast } else { Strategy::Precise }
    }

    pub fn name (&self)->&'static str {
        match self {
            Strategy::Fast => "fast",
            Strategy::Precise => "precise",
        }
    }
}

/// change map (values in [0,1]) and mask, both with shape (rows,cols) of the input images
#[derive(Debug,Clone)]
pub struct ChangeResult {
    pub change_map: Array2<f32>,
    pub mask: Array2<bool>,
    pub strategy: Strategy,
}

impl ChangeResult {
    pub fn changed_pixels (&self)->usize { self.mask.iter().filter( |&&b| b).count() }

    /// result for a region we did not analyze
    pub fn unchanged (width: usize, height: usize, strategy: Strategy)->Self {
        ChangeResult {
            change_map: Array2::zeros( (height,width)),
            mask: Array2::from_elem( (height,width), false),
            strategy
        }
    }
}

pub fn detect_changes (pre: &RgbImage, post: &RgbImage, strategy: Strategy, config: &DamageConfig)->Result<ChangeResult> {
    if pre.dimensions() != post.dimensions() {
        return Err( invalid_dimensions( format!("pre image {:?} != post image {:?}", pre.dimensions(), post.dimensions())))
    }
    if pre.width() == 0 || pre.height() == 0 {
        return Err( invalid_dimensions("empty images"))
    }

    let (change_map, mask) = match strategy {
        Strategy::Fast => detect_fast( pre, post, config),
        Strategy::Precise => detect_precise( pre, post, config),
    };

    let result = ChangeResult{ change_map, mask, strategy };
    debug!("{} change detection on {}x{}: {} changed pixels", strategy.name(), pre.width(), pre.height(), result.changed_pixels());
    Ok( result)
}

fn detect_fast (pre: &RgbImage, post: &RgbImage, config: &DamageConfig)->(Array2<f32>,Array2<bool>) {
    let l1 = luma8( pre);
    let l2 = luma8( post);
    let g1 = gray_plane( &l1);
    let g2 = gray_plane( &l2);

    let structural = correlation_change( &g1, &g2);
    let color = color_distance( pre, post);
    let edges = gradient_change( &l1, &l2);

    let change = combine( &structural, &color, &edges, &GAUSS_3);

    let (mean, std) = mean_std( &change);
    let threshold = (mean + GLOBAL_THRESHOLD_K * std).max( config.min_change_intensity);
    let mask = change.mapv( |v| v > threshold);

    (change, mask)
}

fn detect_precise (pre: &RgbImage, post: &RgbImage, config: &DamageConfig)->(Array2<f32>,Array2<bool>) {
    let l1 = luma8( pre);
    let l2 = luma8( post);
    let g1 = gray_plane( &l1);
    let g2 = gray_plane( &l2);

    let structural = ssim_change( &g1, &g2);
    let color = color_distance( pre, post);
    let edges = canny_change( &l1, &l2);

    let change = combine( &structural, &color, &edges, &GAUSS_5);
    let mask = adaptive_threshold( &change, config.min_change_intensity, config.thresholds.minimal);

    (change, mask)
}

fn combine (structural: &Array2<f32>, color: &Array2<f32>, edges: &Array2<f32>, smoothing: &[f32])->Array2<f32> {
    let raw = Zip::from( structural).and( color).and( edges)
        .map_collect( |&s,&c,&e| STRUCTURAL_WEIGHT*s + COLOR_WEIGHT*c + EDGE_WEIGHT*e);
    convolve_separable( &raw, smoothing).mapv( |v| v.clamp( 0.0, 1.0))
}

/// 1 - local normalized cross correlation over 11x11 box windows, in [0,2]
fn correlation_change (g1: &Array2<f32>, g2: &Array2<f32>)->Array2<f32> {
    let (m1, v1) = local_mean_var( g1, &BOX_11);
    let (m2, v2) = local_mean_var( g2, &BOX_11);
    let cross = convolve_separable( &(g1 * g2), &BOX_11);

    Zip::from( &cross).and( &m1).and( &m2).and( &v1).and( &v2).map_collect( |&c,&m1,&m2,&v1,&v2| {
        let ncc = match (v1 < FLAT_VARIANCE, v2 < FLAT_VARIANCE) {
            (true,true) => 1.0,
            (true,false) | (false,true) => 0.0,
            _ => ((c - m1*m2) / (v1.sqrt() * v2.sqrt())).clamp( -1.0, 1.0)
        };
        1.0 - ncc
    })
}

/// 1 - SSIM over 7x7 uniform windows, in [0,2]
fn ssim_change (g1: &Array2<f32>, g2: &Array2<f32>)->Array2<f32> {
    let (m1, v1) = local_mean_var( g1, &BOX_7);
    let (m2, v2) = local_mean_var( g2, &BOX_7);
    let cross = convolve_separable( &(g1 * g2), &BOX_7);

    Zip::from( &cross).and( &m1).and( &m2).and( &v1).and( &v2).map_collect( |&c,&m1,&m2,&v1,&v2| {
        let cov = (c - m1*m2) * SSIM_COV_NORM;
        let (v1, v2) = (v1 * SSIM_COV_NORM, v2 * SSIM_COV_NORM);
        let ssim = ((2.0*m1*m2 + SSIM_C1) * (2.0*cov + SSIM_C2)) / ((m1*m1 + m2*m2 + SSIM_C1) * (v1 + v2 + SSIM_C2));
        1.0 - ssim
    })
}

/// euclidean RGB distance normalized by the largest possible distance
fn color_distance (pre: &RgbImage, post: &RgbImage)->Array2<f32> {
    let max_dist = 3.0f32.sqrt() * 255.0;
    let (w,h) = (pre.width() as usize, pre.height() as usize);

    Array2::from_shape_fn( (h,w), |(y,x)| {
        let a = pre.get_pixel( x as u32, y as u32).0;
        let b = post.get_pixel( x as u32, y as u32).0;
        let d2: f32 = (0..3).map( |i| { let d = a[i] as f32 - b[i] as f32; d*d }).sum();
        d2.sqrt() / max_dist
    })
}

/// normalized absolute difference of Sobel gradient magnitudes
fn gradient_change (l1: &image::GrayImage, l2: &image::GrayImage)->Array2<f32> {
    let e1 = sobel_magnitude( l1);
    let e2 = sobel_magnitude( l2);
    let max_edge = e1.iter().chain( e2.iter()).fold( 1e-10f32, |acc,&v| acc.max(v));
    Zip::from( &e1).and( &e2).map_collect( |&a,&b| (a - b).abs() / max_edge)
}

fn sobel_magnitude (img: &image::GrayImage)->Array2<f32> {
    let gx = horizontal_sobel( img);
    let gy = vertical_sobel( img);
    let (w,h) = (img.width() as usize, img.height() as usize);

    Array2::from_shape_fn( (h,w), |(y,x)| {
        let dx = gx.get_pixel( x as u32, y as u32).0[0] as f32;
        let dy = gy.get_pixel( x as u32, y as u32).0[0] as f32;
        (dx*dx + dy*dy).sqrt()
    })
}

/// 1 where exactly one of the images has a Canny edge pixel
fn canny_change (l1: &image::GrayImage, l2: &image::GrayImage)->Array2<f32> {
    let e1 = canny( l1, CANNY_LOW, CANNY_HIGH);
    let e2 = canny( l2, CANNY_LOW, CANNY_HIGH);
    let (w,h) = (l1.width() as usize, l1.height() as usize);

    Array2::from_shape_fn( (h,w), |(y,x)| {
        let a = e1.get_pixel( x as u32, y as u32).0[0] > 0;
        let b = e2.get_pixel( x as u32, y as u32).0[0] > 0;
        if a != b { 1.0 } else { 0.0 }
    })
}

/// Sauvola style local threshold over a gaussian weighted 11x11 neighborhood. Values at or below
/// `floor` are never foreground, values above `solid` always are. The latter keeps the interior of
/// a changed block connected to its high contrast rim, which otherwise raises the local threshold
/// above the interior level on low contrast (bright) backgrounds
fn adaptive_threshold (change: &Array2<f32>, floor: f32, solid: f32)->Array2<bool> {
    let (mean, var) = local_mean_var( change, &GAUSS_11);
    Zip::from( change).and( &mean).and( &var).map_collect( |&v,&m,&var| {
        let t = m * (1.0 + ADAPTIVE_K * (var.sqrt() / ADAPTIVE_R - 1.0));
        v > t.max( floor) || v > solid
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured (w: u32, h: u32)->RgbImage {
        RgbImage::from_fn( w, h, |x,y| {
            let v = ((x*31 + y*17) ^ (x*y)) % 200 + 20;
            Rgb([ v as u8, (v/2) as u8, (255 - v) as u8 ])
        })
    }

    #[test]
    fn test_strategy_selection () {
        let config = DamageConfig::default();
        assert_eq!( Strategy::for_detection( 500_000, &config), Strategy::Precise);
        assert_eq!( Strategy::for_detection( 500_001, &config), Strategy::Fast);
        assert_eq!( Strategy::for_classification( 1_000_000, 1000, &config), Strategy::Precise);
        assert_eq!( Strategy::for_classification( 1_000, 1001, &config), Strategy::Fast);
        assert_eq!( Strategy::for_classification( 1_000_001, 1, &config), Strategy::Fast);
    }

    #[test]
    fn test_identical_images_unchanged () {
        let config = DamageConfig::default();
        let img = textured( 96, 64);

        for strategy in [Strategy::Fast, Strategy::Precise] {
            let res = detect_changes( &img, &img, strategy, &config).unwrap();
            let max = res.change_map.iter().fold( 0.0f32, |a,&v| a.max(v));
            println!("{:?}: max change {}", strategy, max);
            assert!( max < config.min_change_intensity);
            assert_eq!( res.changed_pixels(), 0);
        }
    }

    #[test]
    fn test_change_map_range () {
        let config = DamageConfig::default();
        let pre = textured( 80, 80);
        let post = RgbImage::from_fn( 80, 80, |x,y| {
            if (50..66).contains( &x) && (30..46).contains( &y) { Rgb([250,250,250]) } else { *pre.get_pixel( x, y) }
        });

        for strategy in [Strategy::Fast, Strategy::Precise] {
            let res = detect_changes( &pre, &post, strategy, &config).unwrap();
            assert_eq!( res.change_map.dim(), (80,80));
            assert!( res.change_map.iter().all( |&v| (0.0..=1.0).contains( &v)));
            assert!( res.changed_pixels() > 0);
            assert!( res.mask[[38,58]]);
            // far away from the changed block
            assert!( !res.mask[[40,5]]);
        }
    }

    #[test]
    fn test_dimension_mismatch () {
        let config = DamageConfig::default();
        assert!( detect_changes( &textured( 10, 10), &textured( 10, 11), Strategy::Fast, &config).is_err());
    }

    #[test]
    fn test_uniform_block_precise () {
        let config = DamageConfig::default();
        let pre = RgbImage::from_pixel( 128, 128, Rgb([40,40,40]));
        let mut post = pre.clone();
        for y in 40..80 { for x in 40..80 { post.put_pixel( x, y, Rgb([180,180,180])); } }

        let res = detect_changes( &pre, &post, Strategy::Precise, &config).unwrap();
        // block center is solid, far background is untouched
        assert!( res.mask[[60,60]]);
        assert!( res.mask[[50,50]]);
        assert!( !res.mask[[10,10]]);
        assert!( !res.mask[[60,100]]);
    }

    #[test]
    fn test_block_on_bright_background () {
        let config = DamageConfig::default();
        for (bg, fg) in [([60u8,90,60], [160u8,190,160]), ([100,100,100], [202,202,202])] {
            let pre = RgbImage::from_pixel( 128, 128, Rgb(bg));
            let mut post = pre.clone();
            for y in 40..80 { for x in 40..80 { post.put_pixel( x, y, Rgb(fg)); } }

            let res = detect_changes( &pre, &post, Strategy::Precise, &config).unwrap();
            println!("{:?} -> {:?}: {} changed, row 60: {:?}", bg, fg, res.changed_pixels(),
                (36..84).map( |x| res.mask[[60,x]] as u8).collect::<Vec<_>>());

            // no unchanged ring between rim and interior
            assert!( (40..80).all( |x| res.mask[[60,x]]));
            assert!( (40..80).all( |y| res.mask[[y,60]]));
            assert!( !res.mask[[10,10]]);
            assert!( !res.mask[[60,110]]);
        }
    }
}
