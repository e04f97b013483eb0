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

use thiserror::Error;

pub type Result<T> = std::result::Result<T,OdinRasterError>;

#[derive(Error,Debug)]
pub enum OdinRasterError {

    // pass through for IO errors
    #[error("raster IO error: {0}")]
    IOError( #[from] std::io::Error),

    #[error("TIFF error: {0}")]
    TiffError( #[from] tiff::TiffError),

    #[error("image error: {0}")]
    ImageError( #[from] image::ImageError),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    GdalError( #[from] gdal::errors::GdalError),

    #[error("unsupported raster format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid raster window: {0}")]
    InvalidWindow(String),

    #[error("raster has no georeference: {0}")]
    MissingGeoreference(String),

    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("reprojection failed: {0}")]
    ReprojectionFailed(String),

    // generic self-created error
    #[error("raster operation failed: {0}")]
    OpFailed(String),
}

pub fn op_failed<S: ToString> (msg: S)->OdinRasterError {
    OdinRasterError::OpFailed(msg.to_string())
}

pub fn unsupported_format<S: ToString> (msg: S)->OdinRasterError {
    OdinRasterError::UnsupportedFormat(msg.to_string())
}

pub fn unsupported_crs<S: ToString> (msg: S)->OdinRasterError {
    OdinRasterError::UnsupportedCrs(msg.to_string())
}
