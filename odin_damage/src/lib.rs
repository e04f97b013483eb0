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
#![allow(unused)]

//! change detection and damage classification between co-registered pre- and post-event images.
//!
//! The analysis pipeline ([`DamageAnalyzer`]) loads both rasters under a memory budget and aligns
//! them on the post-event grid ([`loader`]), computes a normalized per-pixel change intensity and a
//! binary change mask ([`detect`]), groups changed pixels into connected regions that get a
//! severity level and pixel/geographic geometry ([`classify`]), and produces the damage report and
//! field catalog ([`report`]). Scenes that are too large to be analyzed in one piece are processed
//! in independent tiles by a bounded worker pool ([`tiling`]).

use serde::{Deserialize,Serialize};

pub mod errors;
pub use errors::{OdinDamageError,Result,AnalysisStage};

pub mod config;
pub use config::{DamageConfig,DamageThresholds,Connectivity};

pub mod memory;

pub mod loader;
pub use loader::{AlignedPair,AlignmentMetadata,load_and_align};

mod filters;

pub mod detect;
pub use detect::{ChangeResult,Strategy,detect_changes};

pub mod classify;
pub use classify::{Classification,DamageStatistics,Field,LevelStatistics,classify_damage};

pub mod tiling;
pub use tiling::{TileOrchestrator,TileOutcome,TileSpec,TiledAnalysis};

pub mod report;
pub use report::{DamageReport,FieldCatalog};

pub mod analyzer;
pub use analyzer::{DamageAnalyzer,DamageAnalysis,ArtifactPaths};

/// per region severity. The numeric value is what we store in damage label rasters
#[derive(Debug,Clone,Copy,PartialEq,Eq,PartialOrd,Ord,Hash,Serialize,Deserialize)]
#[serde(rename_all="lowercase")]
#[repr(u8)]
pub enum DamageLevel {
    None = 0,
    Minimal = 1,
    Moderate = 2,
    Severe = 3,
    Catastrophic = 4,
}

impl DamageLevel {
    /// all levels that denote actual damage, in ascending order
    pub const SEVERITIES: [DamageLevel;4] = [ DamageLevel::Minimal, DamageLevel::Moderate, DamageLevel::Severe, DamageLevel::Catastrophic ];

    pub fn index (&self)->u8 { *self as u8 }

    pub fn from_index (idx: u8)->Option<DamageLevel> {
        match idx {
            0 => Some(DamageLevel::None),
            1 => Some(DamageLevel::Minimal),
            2 => Some(DamageLevel::Moderate),
            3 => Some(DamageLevel::Severe),
            4 => Some(DamageLevel::Catastrophic),
            _ => None
        }
    }

    pub fn name (&self)->&'static str {
        match self {
            DamageLevel::None => "none",
            DamageLevel::Minimal => "minimal",
            DamageLevel::Moderate => "moderate",
            DamageLevel::Severe => "severe",
            DamageLevel::Catastrophic => "catastrophic",
        }
    }
}

impl std::fmt::Display for DamageLevel {
    fn fmt (&self, f: &mut std::fmt::Formatter<'_>)->std::fmt::Result {
        write!( f, "{}", self.name())
    }
}

/// progress observer that gets a percentage (0..100) and a status message
pub type ProgressCallback = Box<dyn Fn(f32,&str) + Send + Sync>;
