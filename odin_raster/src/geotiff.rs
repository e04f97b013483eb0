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

//! pure Rust GeoTIFF input and output based on the `tiff` crate

use std::{fs::File, io::{BufReader,BufWriter}, path::{Path,PathBuf}};
use image::{Rgb, RgbImage};
use tiff::{
    ColorType as TiffColorType,
    decoder::{ChunkType, Decoder, DecodingResult},
    encoder::{Compression as TiffCompression, DeflateLevel, TiffEncoder, TiffValue, colortype::{self, ColorType}},
    tags::Tag,
};
use tracing::debug;

use crate::{
    Crs, GeoTransform, PixelType, RasterMeta, RasterSource, Resampling, Window,
    errors::{OdinRasterError, Result, unsupported_format}
};

// GeoKey ids (GeoTIFF 1.0 spec section 6.2)
const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// a GeoTIFF file. Metadata is read on open, pixels are decoded on demand for each read.
pub struct GeoTiffSource {
    path: PathBuf,
    meta: RasterMeta,
}

impl GeoTiffSource {
    pub fn open<P: AsRef<Path>> (path: P)->Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut decoder = open_decoder( &path)?;

        let (w,h) = decoder.dimensions()?;
        let (band_count, pixel_type) = band_layout( decoder.colortype()?)?;
        let transform = read_transform( &mut decoder)?;
        let crs = read_crs( &mut decoder)?;

        debug!("opened GeoTIFF {:?}: {}x{} bands={} crs={:?}", path, w, h, band_count, crs);

        let meta = RasterMeta { width: w as usize, height: h as usize, band_count, pixel_type, crs, transform };
        Ok( GeoTiffSource{ path, meta } )
    }

    pub fn path (&self)->&Path { &self.path }

    /// decode `window` chunk by chunk (strips or tiles), reducing each decoded row into the output
    /// grid right away. Only one chunk row of the window is held in memory besides the output
    fn read_window (&self, bands: [usize;3], window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage> {
        for b in bands {
            if b == 0 || b > self.meta.band_count {
                return Err( OdinRasterError::InvalidWindow( format!("band {} not in 1..={}", b, self.meta.band_count)))
            }
        }
        let (ow,oh) = out_size;
        if ow == 0 || oh == 0 {
            return Err( OdinRasterError::InvalidWindow( format!("empty output size {}x{}", ow, oh)))
        }

        let mut decoder = open_decoder( &self.path)?;
        if let Some(v) = decoder.find_tag( Tag::PlanarConfiguration)? {
            if v.into_u16()? != 1 {
                return Err( unsupported_format( format!("{:?}: planar sample configuration", self.path)))
            }
        }

        let (w,h) = (self.meta.width, self.meta.height);
        let nb = self.meta.band_count;
        let (cw,ch) = decoder.chunk_dimensions();
        let (cw,ch) = (cw as usize, ch as usize);
        if cw == 0 || ch == 0 {
            return Err( unsupported_format( format!("{:?}: empty chunks", self.path)))
        }
        let chunks_across = match decoder.get_chunk_type() {
            ChunkType::Strip => 1,
            ChunkType::Tile => w.div_ceil( cw),
        };

        let mut sink = RowSink::new( window, out_size, resampling);
        let row_len = window.width * 3;
        let first_col = window.x / cw;
        let last_col = (window.x + window.width - 1) / cw;

        for chunk_row in window.y / ch ..= (window.y + window.height - 1) / ch {
            let band_y = chunk_row * ch;
            let y0 = band_y.max( window.y);
            let y1 = (band_y + ch).min( window.y + window.height).min( h);
            let mut band = vec![0u8; row_len * (y1 - y0)];

            for chunk_col in first_col..=last_col {
                let idx = (chunk_row * chunks_across + chunk_col) as u32;
                let (dw,dh) = decoder.chunk_data_dimensions( idx);
                let (dw,dh) = (dw as usize, dh as usize);
                let samples = chunk_samples( decoder.read_chunk( idx)?, &self.path)?;
                if samples.len() < dw * dh * nb {
                    return Err( unsupported_format( format!("{:?}: short data in chunk {}", self.path, idx)))
                }

                let band_x = chunk_col * cw;
                let x0 = band_x.max( window.x);
                let x1 = (band_x + dw).min( window.x + window.width);
                for y in y0..y1.min( band_y + dh) {
                    let src_row = (y - band_y) * dw;
                    let dst_row = (y - y0) * row_len;
                    for x in x0..x1 {
                        let s = (src_row + x - band_x) * nb;
                        let d = dst_row + (x - window.x) * 3;
                        band[d]   = samples[s + bands[0] - 1];
                        band[d+1] = samples[s + bands[1] - 1];
                        band[d+2] = samples[s + bands[2] - 1];
                    }
                }
            }

            for (i, row) in band.chunks_exact( row_len).enumerate() {
                sink.push_row( y0 + i - window.y, row);
            }
        }

        Ok( sink.finish())
    }
}

fn chunk_samples (res: DecodingResult, path: &Path)->Result<Vec<u8>> {
    match res {
        DecodingResult::U8(buf) => Ok( buf),
        DecodingResult::U16(buf) => Ok( buf.into_iter().map( |v| (v >> 8) as u8).collect()),
        _ => Err( unsupported_format( format!("{:?}: only 8 and 16 bit unsigned samples supported", path)))
    }
}

/// maps output index `o` of `n_out` to the nearest of `n_in` source indices
fn nearest_index (o: usize, n_in: usize, n_out: usize)->usize {
    (((2*o + 1) * n_in) / (2*n_out)).min( n_in - 1)
}

/// reduces window rows (top to bottom, window relative row index) into the output image
enum RowSink {
    /// native resolution
    Copy { img: RgbImage },
    /// nearest neighbour, `src_y` is non-decreasing
    Nearest { img: RgbImage, src_x: Vec<usize>, src_y: Vec<usize>, next: usize },
    /// box average over `kx`*`ky` blocks into `img`, followed by a triangle filter resize to `out_size`.
    /// Remainder rows and columns are folded into the last block
    Box { img: RgbImage, kx: usize, ky: usize, col_count: Vec<u32>, acc: Vec<u32>, rows: u32, iy: usize, out_size: (usize,usize) },
}

impl RowSink {
    fn new (window: Window, out_size: (usize,usize), resampling: Resampling)->Self {
        let (ww,wh) = (window.width, window.height);
        let (ow,oh) = out_size;

        if (ww,wh) == out_size {
            RowSink::Copy { img: RgbImage::new( ow as u32, oh as u32) }

        } else if resampling == Resampling::Nearest {
            RowSink::Nearest {
                img: RgbImage::new( ow as u32, oh as u32),
                src_x: (0..ow).map( |o| nearest_index( o, ww, ow)).collect(),
                src_y: (0..oh).map( |o| nearest_index( o, wh, oh)).collect(),
                next: 0
            }

        } else {
            let kx = (ww / ow).max(1);
            let ky = (wh / oh).max(1);
            let (iw,ih) = ((ww / kx).max(1), (wh / ky).max(1));
            let mut col_count = vec![0u32; iw];
            for x in 0..ww { col_count[ (x / kx).min( iw-1)] += 1; }

            RowSink::Box {
                img: RgbImage::new( iw as u32, ih as u32),
                kx, ky, col_count,
                acc: vec![0u32; iw * 3],
                rows: 0, iy: 0,
                out_size
            }
        }
    }

    fn push_row (&mut self, y: usize, row: &[u8]) {
        match self {
            RowSink::Copy { img } => {
                let stride = row.len();
                let buf: &mut [u8] = &mut **img;
                buf[ y*stride .. (y+1)*stride].copy_from_slice( row);
            }
            RowSink::Nearest { img, src_x, src_y, next } => {
                while *next < src_y.len() && src_y[*next] == y {
                    for (ox, &sx) in src_x.iter().enumerate() {
                        img.put_pixel( ox as u32, *next as u32, Rgb([ row[sx*3], row[sx*3+1], row[sx*3+2] ]));
                    }
                    *next += 1;
                }
            }
            RowSink::Box { img, kx, ky, col_count, acc, rows, iy, .. } => {
                let ih = img.height() as usize;
                let iw = col_count.len();
                let target = (y / *ky).min( ih-1);
                if target != *iy && *rows > 0 {
                    flush_box_row( img, *iy, col_count, acc, *rows);
                    *rows = 0;
                }
                *iy = target;
                for (x, px) in row.chunks_exact(3).enumerate() {
                    let ix = (x / *kx).min( iw-1) * 3;
                    acc[ix] += px[0] as u32;
                    acc[ix+1] += px[1] as u32;
                    acc[ix+2] += px[2] as u32;
                }
                *rows += 1;
            }
        }
    }

    fn finish (self)->RgbImage {
        match self {
            RowSink::Copy { img } | RowSink::Nearest { img, .. } => img,
            RowSink::Box { mut img, col_count, mut acc, rows, iy, out_size, .. } => {
                if rows > 0 { flush_box_row( &mut img, iy, &col_count, &mut acc, rows); }
                let (ow,oh) = out_size;
                if img.dimensions() == (ow as u32, oh as u32) {
                    img
                } else {
                    image::imageops::resize( &img, ow as u32, oh as u32, Resampling::Bilinear.filter())
                }
            }
        }
    }
}

fn flush_box_row (img: &mut RgbImage, iy: usize, col_count: &[u32], acc: &mut [u32], rows: u32) {
    for (ix, &cols) in col_count.iter().enumerate() {
        let n = cols * rows;
        let a = &mut acc[ ix*3 .. ix*3 + 3];
        img.put_pixel( ix as u32, iy as u32, Rgb([ ((a[0] + n/2) / n) as u8, ((a[1] + n/2) / n) as u8, ((a[2] + n/2) / n) as u8 ]));
        a.fill(0);
    }
}

impl RasterSource for GeoTiffSource {
    fn name (&self)->String { self.path.display().to_string() }

    fn meta (&self)->&RasterMeta { &self.meta }

    fn read_rgb8 (&self, bands: [usize;3], window: Window, out_size: (usize,usize), resampling: Resampling)->Result<RgbImage> {
        window.check_within( self.meta.width, self.meta.height)?;
        self.read_window( bands, window, out_size, resampling)
    }
}

fn open_decoder (path: &Path)->Result<Decoder<BufReader<File>>> {
    let file = File::open( path)?;
    Ok( Decoder::new( BufReader::new(file))?)
}

fn band_layout (ct: TiffColorType)->Result<(usize,PixelType)> {
    let (bands, bits) = match ct {
        TiffColorType::Gray(bits) => (1, bits),
        TiffColorType::GrayA(bits) => (2, bits),
        TiffColorType::RGB(bits) => (3, bits),
        TiffColorType::RGBA(bits) => (4, bits),
        TiffColorType::Multiband{ bit_depth, num_samples } => (num_samples as usize, bit_depth),
        other => return Err( unsupported_format( format!("color type {:?}", other)))
    };

    match bits {
        8 => Ok( (bands, PixelType::U8) ),
        16 => Ok( (bands, PixelType::U16) ),
        _ => Err( unsupported_format( format!("{} bit samples", bits)))
    }
}

fn read_transform<R: std::io::Read + std::io::Seek> (decoder: &mut Decoder<R>)->Result<Option<GeoTransform>> {
    if let Some(v) = decoder.find_tag( Tag::ModelTransformationTag)? {
        let m = v.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok( Some( GeoTransform::new([ m[3], m[0], m[1], m[7], m[4], m[5] ])))
        }
    }

    let scale = decoder.find_tag( Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.find_tag( Tag::ModelTiepointTag)?;
    if let (Some(scale),Some(tiepoint)) = (scale,tiepoint) {
        let s = scale.into_f64_vec()?;
        let t = tiepoint.into_f64_vec()?;
        if s.len() >= 2 && t.len() >= 6 {
            let (i,j,x,y) = (t[0], t[1], t[3], t[4]);
            return Ok( Some( GeoTransform::new([ x - i*s[0], s[0], 0.0, y + j*s[1], 0.0, -s[1] ])))
        }
    }

    Ok(None)
}

fn read_crs<R: std::io::Read + std::io::Seek> (decoder: &mut Decoder<R>)->Result<Option<Crs>> {
    let keys = match decoder.find_tag( Tag::GeoKeyDirectoryTag)? {
        Some(v) => v.into_u16_vec()?,
        None => return Ok(None)
    };
    Ok( crs_from_geokeys( &keys))
}

/// only inline (short valued) keys are relevant for us
fn crs_from_geokeys (keys: &[u16])->Option<Crs> {
    if keys.len() < 4 { return None }
    let n = keys[3] as usize;

    let mut projected: Option<u16> = None;
    let mut geographic: Option<u16> = None;
    for k in keys[4..].chunks_exact(4).take(n) {
        if k[1] == 0 && k[3] != USER_DEFINED {
            match k[0] {
                PROJECTED_CS_TYPE_KEY => projected = Some(k[3]),
                GEOGRAPHIC_TYPE_KEY => geographic = Some(k[3]),
                _ => {}
            }
        }
    }

    projected.or(geographic).map( |epsg| Crs::from_epsg( epsg as u32))
}

fn geokeys_for (crs: &Crs)->Option<Vec<u16>> {
    let epsg = crs.epsg()?;
    if epsg > u16::MAX as u32 { return None }

    let (model, cs_key) = if crs.is_geographic() {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY)
    };

    Some( vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE_KEY, 0, 1, model,
        GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        cs_key, 0, 1, epsg as u16,
    ])
}

/* #region writers ********************************************************************************/

fn check_path (path: &Path)->Result<()> {
    match path.extension().and_then( |e| e.to_str()) {
        Some(ext) if ext.ends_with("tif") || ext.ends_with("tiff") => Ok(()),
        _ => Err( unsupported_format( format!("{:?} is not a TIFF file name", path)))
    }
}

fn write_geotiff<C,P> (path: P, width: usize, height: usize, data: &[C::Inner], georef: Option<(&GeoTransform,Option<&Crs>)>)->Result<()>
    where C: ColorType, P: AsRef<Path>, [C::Inner]: TiffValue
{
    let path = path.as_ref();
    check_path( path)?;
    if data.len() != width * height * C::BITS_PER_SAMPLE.len() {
        return Err( OdinRasterError::InvalidWindow( format!("{} samples for {}x{} image", data.len(), width, height)))
    }

    let file = File::create( path)?;
    let mut enc = TiffEncoder::new( BufWriter::new(file))?.with_compression( TiffCompression::Deflate(DeflateLevel::Best));
    let mut img = enc.new_image::<C>( width as u32, height as u32)?;

    if let Some((gt,crs)) = georef {
        let a = gt.coefficients();
        let dir = img.encoder();
        if gt.is_north_up() {
            let scale = [ a[1], -a[5], 0.0 ];
            let tiepoint = [ 0.0, 0.0, 0.0, a[0], a[3], 0.0 ];
            dir.write_tag( Tag::ModelPixelScaleTag, &scale[..])?;
            dir.write_tag( Tag::ModelTiepointTag, &tiepoint[..])?;
        } else {
            let m = [ a[1], a[2], 0.0, a[0],  a[4], a[5], 0.0, a[3],  0.0, 0.0, 0.0, 0.0,  0.0, 0.0, 0.0, 1.0 ];
            dir.write_tag( Tag::ModelTransformationTag, &m[..])?;
        }

        if let Some(keys) = crs.and_then( geokeys_for) {
            dir.write_tag( Tag::GeoKeyDirectoryTag, &keys[..])?;
        }
    }

    img.write_data( data)?;
    debug!("saved GeoTIFF {:?} ({}x{})", path, width, height);
    Ok(())
}

pub fn save_geotiff_rgb8<P: AsRef<Path>> (path: P, img: &RgbImage, georef: Option<(&GeoTransform,Option<&Crs>)>)->Result<()> {
    write_geotiff::<colortype::RGB8,_>( path, img.width() as usize, img.height() as usize, img.as_raw(), georef)
}

pub fn save_geotiff_gray8<P: AsRef<Path>> (path: P, width: usize, height: usize, data: &[u8], georef: Option<(&GeoTransform,Option<&Crs>)>)->Result<()> {
    write_geotiff::<colortype::Gray8,_>( path, width, height, data, georef)
}

pub fn save_geotiff_gray32f<P: AsRef<Path>> (path: P, width: usize, height: usize, data: &[f32], georef: Option<(&GeoTransform,Option<&Crs>)>)->Result<()> {
    write_geotiff::<colortype::Gray32Float,_>( path, width, height, data, georef)
}

/* #endregion writers */
