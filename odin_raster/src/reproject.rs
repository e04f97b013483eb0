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
#![allow(uncommon_codepoints,non_snake_case)]

//! point reprojection between coordinate reference systems

use crate::{Bounds, Crs, errors::{OdinRasterError,Result,unsupported_crs}};

/// the reprojection seam. Implementations have to be usable from concurrent tile workers
pub trait Reproject: Send + Sync {

    /// transform (x,y) points in place from `from` to `to`. Geographic coordinates are (lon,lat)
    fn reproject (&self, from: &Crs, to: &Crs, pts: &mut [(f64,f64)])->Result<()>;

    /// transform bounds by reprojecting their corners
    fn reproject_bounds (&self, from: &Crs, to: &Crs, bounds: &Bounds)->Result<Bounds> {
        let mut pts = bounds.corners();
        self.reproject( from, to, &mut pts)?;
        Ok( Bounds::enclosing( &pts))
    }
}

/// closed form reprojection for WGS84, UTM (north and south) and Web Mercator. This does not need
/// any native library
#[derive(Debug,Clone,Copy,Default)]
pub struct GeodeticReprojector;

impl Reproject for GeodeticReprojector {
    fn reproject (&self, from: &Crs, to: &Crs, pts: &mut [(f64,f64)])->Result<()> {
        if from == to { return Ok(()) }
        check_supported( from)?;
        check_supported( to)?;

        for p in pts.iter_mut() {
            let (lon,lat) = to_geographic( from, p.0, p.1)?;
            *p = from_geographic( to, lon, lat)?;
        }
        Ok(())
    }
}

fn check_supported (crs: &Crs)->Result<()> {
    match crs {
        Crs::Wgs84 | Crs::UtmNorth(_) | Crs::UtmSouth(_) | Crs::WebMercator => Ok(()),
        other => Err( unsupported_crs( format!("no closed form reprojection for {}", other)))
    }
}

fn to_geographic (crs: &Crs, x: f64, y: f64)->Result<(f64,f64)> {
    let (lon,lat) = match crs {
        Crs::Wgs84 => (x,y),
        Crs::UtmNorth(zone) => utm_to_geo( *zone, true, x, y),
        Crs::UtmSouth(zone) => utm_to_geo( *zone, false, x, y),
        Crs::WebMercator => web_mercator_to_geo( x, y),
        other => return Err( unsupported_crs( other))
    };

    if lon.is_finite() && lat.is_finite() {
        Ok( (lon,lat) )
    } else {
        Err( OdinRasterError::ReprojectionFailed( format!("({},{}) of {} has no geographic position", x, y, crs)))
    }
}

fn from_geographic (crs: &Crs, lon: f64, lat: f64)->Result<(f64,f64)> {
    match crs {
        Crs::Wgs84 => Ok( (lon,lat) ),
        Crs::UtmNorth(zone) => geo_to_utm( *zone, true, lon, lat),
        Crs::UtmSouth(zone) => geo_to_utm( *zone, false, lon, lat),
        Crs::WebMercator => geo_to_web_mercator( lon, lat),
        other => Err( unsupported_crs( other))
    }
}

/* #region UTM (Krüger series, WGS84 ellipsoid) *****************************************************/

const WGS84_A: f64 = 6378137.0;
const WGS84_F: f64 = 1.0 / 298.257223563;
const UTM_K0: f64 = 0.9996;
const UTM_E0: f64 = 500000.0;
const UTM_N0_SOUTH: f64 = 10000000.0;

struct Krueger {
    A: f64,         // rectifying radius
    n: f64,
    α: [f64;3],
    β: [f64;3],
    δ: [f64;3],
}

fn krueger ()->Krueger {
    let n = WGS84_F / (2.0 - WGS84_F);
    let n2 = n*n;
    let n3 = n2*n;
    let n4 = n2*n2;

    Krueger {
        A: WGS84_A / (1.0 + n) * (1.0 + n2/4.0 + n4/64.0),
        n,
        α: [ n/2.0 - 2.0/3.0*n2 + 5.0/16.0*n3,  13.0/48.0*n2 - 3.0/5.0*n3,  61.0/240.0*n3 ],
        β: [ n/2.0 - 2.0/3.0*n2 + 37.0/96.0*n3,  1.0/48.0*n2 + 1.0/15.0*n3,  17.0/480.0*n3 ],
        δ: [ 2.0*n - 2.0/3.0*n2 - 2.0*n3,  7.0/3.0*n2 - 8.0/5.0*n3,  56.0/15.0*n3 ],
    }
}

fn central_meridian (zone: u32)->f64 { (zone as f64 * 6.0 - 183.0).to_radians() }

fn check_zone (zone: u32)->Result<()> {
    if (1..=60).contains( &zone) { Ok(()) } else { Err( unsupported_crs( format!("UTM zone {}", zone))) }
}

/// (lon,lat) degrees to (easting,northing) meters in the given zone
pub fn geo_to_utm (zone: u32, north: bool, lon: f64, lat: f64)->Result<(f64,f64)> {
    check_zone( zone)?;
    if !(-80.0..=84.0).contains( &lat) {
        return Err( OdinRasterError::ReprojectionFailed( format!("latitude {} outside of UTM coverage", lat)))
    }

    let k = krueger();
    let φ = lat.to_radians();
    let dλ = lon.to_radians() - central_meridian( zone);
    let c = 2.0 * k.n.sqrt() / (1.0 + k.n);

    let t = (φ.sin().atanh() - c * (c * φ.sin()).atanh()).sinh();
    let ξp = (t / dλ.cos()).atan();
    let ηp = (dλ.sin() / (1.0 + t*t).sqrt()).atanh();

    let mut ξ = ξp;
    let mut η = ηp;
    for j in 0..3 {
        let j2 = 2.0 * (j + 1) as f64;
        ξ += k.α[j] * (j2*ξp).sin() * (j2*ηp).cosh();
        η += k.α[j] * (j2*ξp).cos() * (j2*ηp).sinh();
    }

    let easting = UTM_E0 + UTM_K0 * k.A * η;
    let northing = if north { 0.0 } else { UTM_N0_SOUTH } + UTM_K0 * k.A * ξ;
    Ok( (easting,northing) )
}

/// (easting,northing) meters in the given zone to (lon,lat) degrees
pub fn utm_to_geo (zone: u32, north: bool, easting: f64, northing: f64)->(f64,f64) {
    let k = krueger();
    let n0 = if north { 0.0 } else { UTM_N0_SOUTH };

    let ξ = (northing - n0) / (UTM_K0 * k.A);
    let η = (easting - UTM_E0) / (UTM_K0 * k.A);

    let mut ξp = ξ;
    let mut ηp = η;
    for j in 0..3 {
        let j2 = 2.0 * (j + 1) as f64;
        ξp -= k.β[j] * (j2*ξ).sin() * (j2*η).cosh();
        ηp -= k.β[j] * (j2*ξ).cos() * (j2*η).sinh();
    }

    let χ = (ξp.sin() / ηp.cosh()).asin();
    let mut φ = χ;
    for j in 0..3 {
        φ += k.δ[j] * (2.0 * (j + 1) as f64 * χ).sin();
    }
    let λ = central_meridian( zone) + (ηp.sinh() / ξp.cos()).atan();

    (λ.to_degrees(), φ.to_degrees())
}

/* #endregion UTM */

/* #region web mercator *****************************************************************************/

const WEB_MERCATOR_MAX_LAT: f64 = 85.05112878;

pub fn geo_to_web_mercator (lon: f64, lat: f64)->Result<(f64,f64)> {
    if lat.abs() > WEB_MERCATOR_MAX_LAT {
        return Err( OdinRasterError::ReprojectionFailed( format!("latitude {} outside of web mercator coverage", lat)))
    }
    let x = WGS84_A * lon.to_radians();
    let y = WGS84_A * (std::f64::consts::FRAC_PI_4 + lat.to_radians()/2.0).tan().ln();
    Ok( (x,y) )
}

pub fn web_mercator_to_geo (x: f64, y: f64)->(f64,f64) {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon,lat)
}

/* #endregion web mercator */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_central_meridian () {
        let (e,n) = geo_to_utm( 10, true, -123.0, 0.0).unwrap();
        assert!( (e - 500000.0).abs() < 1e-6);
        assert!( n.abs() < 1e-6);

        // meridian arc at 45° scaled by k0
        let (e,n) = geo_to_utm( 10, true, -123.0, 45.0).unwrap();
        assert!( (e - 500000.0).abs() < 1e-6);
        assert!( (n - 4982950.4).abs() < 1.0, "northing {}", n);
    }

    #[test]
    fn test_utm_roundtrip () {
        // Antakya, zone 37N
        let (lon,lat) = (36.1612, 36.2021);
        let (e,n) = geo_to_utm( 37, true, lon, lat).unwrap();
        println!("utm 37N: {} {}", e, n);
        assert!( e > 400000.0 && e < 600000.0);

        let (lon1,lat1) = utm_to_geo( 37, true, e, n);
        assert!( (lon1 - lon).abs() < 1e-8 && (lat1 - lat).abs() < 1e-8);

        let (e,n) = geo_to_utm( 19, false, -70.6, -33.45).unwrap();
        assert!( n > 0.0 && n < UTM_N0_SOUTH);
        let (lon1,lat1) = utm_to_geo( 19, false, e, n);
        assert!( (lon1 + 70.6).abs() < 1e-8 && (lat1 + 33.45).abs() < 1e-8);
    }

    #[test]
    fn test_web_mercator () {
        let (x,y) = geo_to_web_mercator( 180.0, 0.0).unwrap();
        assert!( (x - 20037508.342789244).abs() < 1e-6);
        assert!( y.abs() < 1e-6);

        let (lon,lat) = web_mercator_to_geo( 1000000.0, 2000000.0);
        let (x,y) = geo_to_web_mercator( lon, lat).unwrap();
        assert!( (x - 1000000.0).abs() < 1e-6 && (y - 2000000.0).abs() < 1e-6);
    }

    #[test]
    fn test_reprojector () {
        let r = GeodeticReprojector;
        let mut pts = [(500000.0, 0.0)];
        r.reproject( &Crs::UtmNorth(37), &Crs::Wgs84, &mut pts).unwrap();
        assert!( (pts[0].0 - 39.0).abs() < 1e-9 && pts[0].1.abs() < 1e-9);

        let mut pts = [(1.0, 2.0)];
        assert!( r.reproject( &Crs::Epsg(2154), &Crs::Wgs84, &mut pts).is_err());
    }
}
