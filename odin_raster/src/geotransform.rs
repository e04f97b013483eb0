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

use serde::{Deserialize,Serialize};

/// affine pixel-to-map transform in GDAL coefficient order:
///   x_map = a[0] + px*a[1] + py*a[2]
///   y_map = a[3] + px*a[4] + py*a[5]
/// pixel coordinates refer to the upper left corner of a pixel
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct GeoTransform (pub [f64;6]);

impl GeoTransform {
    pub fn new (a: [f64;6])->Self { GeoTransform(a) }

    /// north-up transform from the upper left corner and (positive) pixel sizes
    pub fn north_up (x0: f64, y0: f64, dx: f64, dy: f64)->Self {
        GeoTransform([x0, dx, 0.0, y0, 0.0, -dy])
    }

    pub fn coefficients (&self)->&[f64;6] { &self.0 }

    #[inline]
    pub fn apply (&self, px: f64, py: f64)->(f64,f64) {
        let a = &self.0;
        ( a[0] + px*a[1] + py*a[2], a[3] + px*a[4] + py*a[5] )
    }

    /// transform for a raster that covers the same area with pixels that are `sx` (columns) and
    /// `sy` (rows) times as large
    pub fn scaled (&self, sx: f64, sy: f64)->Self {
        let a = &self.0;
        GeoTransform([ a[0], a[1]*sx, a[2]*sy, a[3], a[4]*sx, a[5]*sy ])
    }

    /// transform of a sub-window that starts at pixel (x,y)
    pub fn translated (&self, x: f64, y: f64)->Self {
        let (x0,y0) = self.apply( x, y);
        let a = &self.0;
        GeoTransform([ x0, a[1], a[2], y0, a[4], a[5] ])
    }

    pub fn is_north_up (&self)->bool { self.0[2] == 0.0 && self.0[4] == 0.0 }

    /// pixel width in map units
    pub fn x_resolution (&self)->f64 { self.0[1].hypot( self.0[4]) }

    /// pixel height in map units
    pub fn y_resolution (&self)->f64 { self.0[2].hypot( self.0[5]) }

    /// map bounds covered by a raster of the given pixel dimensions
    pub fn bounds (&self, width: usize, height: usize)->Bounds {
        let (w,h) = (width as f64, height as f64);
        let corners = [ self.apply(0.0,0.0), self.apply(w,0.0), self.apply(0.0,h), self.apply(w,h) ];
        Bounds::enclosing( &corners)
    }
}

/// axis aligned bounds in map units of some coordinate reference system
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64
}

impl Bounds {
    pub fn new (left: f64, bottom: f64, right: f64, top: f64)->Self {
        Bounds{left,bottom,right,top}
    }

    pub fn enclosing (pts: &[(f64,f64)])->Self {
        let mut b = Bounds::new( f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for &(x,y) in pts {
            b.left = b.left.min(x);
            b.right = b.right.max(x);
            b.bottom = b.bottom.min(y);
            b.top = b.top.max(y);
        }
        b
    }

    pub fn width (&self)->f64 { self.right - self.left }
    pub fn height (&self)->f64 { self.top - self.bottom }
    pub fn center (&self)->(f64,f64) { ((self.left + self.right)/2.0, (self.bottom + self.top)/2.0) }

    pub fn corners (&self)->[(f64,f64);4] {
        [ (self.left,self.bottom), (self.right,self.bottom), (self.right,self.top), (self.left,self.top) ]
    }
}
