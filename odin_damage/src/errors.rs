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
use thiserror::Error;
use odin_raster::OdinRasterError;

pub type Result<T> = std::result::Result<T,OdinDamageError>;

/// the pipeline stage in which a fatal error occurred
#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum AnalysisStage {
    Load,
    Detect,
    Classify,
    Report
}

impl fmt::Display for AnalysisStage {
    fn fmt (&self, f: &mut fmt::Formatter<'_>)->fmt::Result {
        let s = match self {
            AnalysisStage::Load => "load",
            AnalysisStage::Detect => "detect",
            AnalysisStage::Classify => "classify",
            AnalysisStage::Report => "report",
        };
        write!( f, "{}", s)
    }
}

#[derive(Error,Debug)]
pub enum OdinDamageError {

    // pass through for raster access errors
    #[error("raster error: {0}")]
    RasterError( #[from] OdinRasterError),

    #[error("IO error: {0}")]
    IOError( #[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerdeError( #[from] serde_json::Error),

    #[error("RON error: {0}")]
    RonError( #[from] ron::error::SpannedError),

    #[error("image error: {0}")]
    ImageError( #[from] image::ImageError),

    #[error("invalid config: {0}")]
    ConfigError(String),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("insufficient memory: {available} bytes available, {reserve} bytes reserved")]
    InsufficientMemory { available: u64, reserve: u64 },

    #[error("tile {row},{col} failed: {cause}")]
    TileFailed { row: usize, col: usize, cause: String },

    #[error("analysis failed in {stage} stage: {cause}")]
    StageFailed { stage: AnalysisStage, cause: String },

    // generic self-created error
    #[error("damage analysis operation failed: {0}")]
    OpFailed(String),
}

impl OdinDamageError {
    /// wrap into a `StageFailed` with additional context (unless this already is one)
    pub fn in_stage (self, stage: AnalysisStage, context: &str)->OdinDamageError {
        match self {
            e @ OdinDamageError::StageFailed{..} => e,
            e => OdinDamageError::StageFailed{ stage, cause: format!("{context}: {e}") }
        }
    }
}

pub fn op_failed<S: ToString> (msg: S)->OdinDamageError {
    OdinDamageError::OpFailed(msg.to_string())
}

pub fn config_error<S: ToString> (msg: S)->OdinDamageError {
    OdinDamageError::ConfigError(msg.to_string())
}

pub fn invalid_dimensions<S: ToString> (msg: S)->OdinDamageError {
    OdinDamageError::InvalidDimensions(msg.to_string())
}
