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

use std::fmt;
use crate::errors::{Result,unsupported_crs};

/// the coordinate reference systems we know about. Anything we can't compute ourselves is kept as
/// `Epsg` or `Wkt` so that it can still be passed on to GDAL
#[derive(Debug,Clone,PartialEq)]
pub enum Crs {
    Wgs84,
    UtmNorth(u32), // zone
    UtmSouth(u32),
    WebMercator,
    Epsg(u32),
    Wkt(String),
}

impl Crs {
    pub fn from_epsg (epsg: u32)->Crs {
        match epsg {
            4326 => Crs::Wgs84,
            32601..32661 => Crs::UtmNorth( epsg - 32600),
            32701..32761 => Crs::UtmSouth( epsg - 32700),
            3857 | 900913 => Crs::WebMercator,
            _ => Crs::Epsg(epsg)
        }
    }

    /// parse "EPSG:nnnn", "nnnn", "WGS84" or WKT text
    pub fn from_spec (spec: &str)->Result<Crs> {
        let spec = spec.trim();
        let has_epsg_prefix = spec.get(..5).map( |p| p.eq_ignore_ascii_case("epsg:")).unwrap_or(false);

        if has_epsg_prefix {
            spec[5..].parse::<u32>()
                .map( Crs::from_epsg)
                .map_err( |_| unsupported_crs( spec))
        } else if let Ok(epsg) = spec.parse::<u32>() {
            Ok( Crs::from_epsg(epsg))
        } else if spec.eq_ignore_ascii_case("WGS84") {
            Ok( Crs::Wgs84)
        } else if spec.starts_with("GEOGCS") || spec.starts_with("PROJCS") || spec.starts_with("GEOGCRS") || spec.starts_with("PROJCRS") {
            Ok( Crs::Wkt( spec.to_string()))
        } else {
            Err( unsupported_crs( spec))
        }
    }

    pub fn epsg (&self)->Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::UtmNorth(zone) => Some(32600 + zone),
            Crs::UtmSouth(zone) => Some(32700 + zone),
            Crs::WebMercator => Some(3857),
            Crs::Epsg(epsg) => Some(*epsg),
            Crs::Wkt(_) => None
        }
    }

    /// true if map units are degrees. Unknown EPSG codes in the 4000 range are geographic
    pub fn is_geographic (&self)->bool {
        match self {
            Crs::Wgs84 => true,
            Crs::Epsg(epsg) => (4000..5000).contains( epsg),
            Crs::Wkt(wkt) => wkt.starts_with("GEOGCS") || wkt.starts_with("GEOGCRS"),
            _ => false
        }
    }
}

impl fmt::Display for Crs {
    fn fmt (&self, f: &mut fmt::Formatter<'_>)->fmt::Result {
        match self {
            Crs::Wkt(wkt) => write!( f, "{}", wkt),
            other => match other.epsg() {
                Some(epsg) => write!( f, "EPSG:{}", epsg),
                None => write!( f, "unknown")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spec () {
        assert_eq!( Crs::from_spec("EPSG:4326").unwrap(), Crs::Wgs84);
        assert_eq!( Crs::from_spec("epsg:32637").unwrap(), Crs::UtmNorth(37));
        assert_eq!( Crs::from_spec("32737").unwrap(), Crs::UtmSouth(37));
        assert_eq!( Crs::from_spec("EPSG:3857").unwrap(), Crs::WebMercator);
        assert_eq!( Crs::from_spec("EPSG:2154").unwrap(), Crs::Epsg(2154));
        assert!( Crs::from_spec("EPSG:abc").is_err());
        assert!( Crs::from_spec("somewhere").is_err());
    }

    #[test]
    fn test_display () {
        assert_eq!( Crs::UtmNorth(37).to_string(), "EPSG:32637");
        assert_eq!( Crs::Wgs84.to_string(), "EPSG:4326");
        assert!( Crs::Wgs84.is_geographic());
        assert!( !Crs::UtmSouth(1).is_geographic());
    }
}
