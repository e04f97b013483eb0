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

use std::path::PathBuf;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use odin_damage::{DamageAnalyzer, DamageConfig, DamageLevel};

#[derive(Parser, Debug)]
#[command(version, about, long_about = "assess damage between pre- and post-event images of the same area")]
pub struct Args {
    /// pre-event image (GeoTIFF)
    #[arg(long)]
    pub pre: PathBuf,

    /// post-event image (GeoTIFF), this defines the analysis grid
    #[arg(long)]
    pub post: PathBuf,

    /// RON config file, defaults are used if not set
    #[arg(short,long)]
    pub config: Option<PathBuf>,

    /// output directory for reports, rasters and overlay
    #[arg(short,long, default_value = "damage_output")]
    pub out: PathBuf,
}

fn main()->Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter( EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new("info")))  // use RUST_LOG to set max level
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DamageConfig::load( path)?,
        None => DamageConfig::default()
    };

    let mut analyzer = DamageAnalyzer::new( config)?;
    analyzer.add_progress_callback( Box::new( |pct,msg| println!("[{:3.0}%] {}", pct, msg)));

    let (analysis, paths) = analyzer.run_to_dir( &args.pre, &args.post, &args.out)?;

    let summary = &analysis.report.summary;
    println!("------- damage summary");
    println!("analysis method:      {}", analysis.method);
    println!("damage regions:       {}", summary.total_damage_regions);
    println!("damaged area:         {} km² ({}%)", summary.total_damaged_area_km2, summary.percentage_area_affected);
    println!("most common level:    {}", summary.most_common_damage_level);
    for level in DamageLevel::SEVERITIES {
        if let Some(lr) = analysis.report.damage_assessment.get( level) {
            println!("  {:<13} {:>6} regions {:>12} m²", level.name(), lr.region_count, lr.total_area_m2);
        }
    }
    if !analysis.failed_tiles().is_empty() {
        println!("WARNING: {} tiles failed and are reported as undamaged", analysis.failed_tiles().len());
    }
    println!("report written to {:?}", paths.report);

    Ok(())
}
