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

use std::sync::{Arc, Mutex};
use image::{Rgb, RgbImage};
use odin_raster::{Crs, GeoTiffSource, GeoTransform, MemRasterSource, RasterSource, save_geotiff_rgb8};
use odin_damage::{
    AlignmentMetadata, AnalysisStage, DamageAnalyzer, DamageConfig, DamageLevel, OdinDamageError, config::GIB
};

fn test_config ()->DamageConfig {
    DamageConfig { available_memory_bytes: Some(16 * GIB), ..DamageConfig::default() }
}

/// uniform dark scene and the same scene with a bright 50x50 block at (100,100)
fn block_pair ()->(RgbImage,RgbImage) {
    let pre = RgbImage::from_pixel( 512, 512, Rgb([40,40,40]));
    let mut post = pre.clone();
    for y in 100..150 { for x in 100..150 { post.put_pixel( x, y, Rgb([180,180,180])); } }
    (pre, post)
}

fn textured (w: u32, h: u32)->RgbImage {
    RgbImage::from_fn( w, h, |x,y| {
        let v = ((x*31 + y*17) ^ (x*y)) % 200 + 20;
        Rgb([ v as u8, (v/2) as u8, (255 - v) as u8 ])
    })
}

#[test]
fn test_single_block_scenario () {
    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let (pre, post) = block_pair();

    let analysis = analyzer.analyze_images( pre, post, AlignmentMetadata::ungeoreferenced( 512, 512)).unwrap();
    let fields = analysis.fields();
    println!("method: {}, fields: {:#?}", analysis.method, fields);

    assert_eq!( fields.len(), 1);
    let f = &fields[0];
    assert_eq!( f.field_id, 1);
    assert_eq!( f.level(), DamageLevel::Severe);
    assert!( (2300..=3700).contains( &f.area()));
    assert!( (f.geometry.centroid.x - 124.5).abs() < 1.5);
    assert!( (f.geometry.centroid.y - 124.5).abs() < 1.5);
    // precise classification carries shape metrics
    assert!( f.shape_analysis.is_some());

    let stats = &analysis.statistics;
    assert_eq!( stats.severe.count, 1);
    assert_eq!( stats.severe.total_area, f.area());
    assert_eq!( stats.minimal.count + stats.moderate.count + stats.catastrophic.count, 0);

    let labeled = analysis.labels.iter().filter( |&&v| v == DamageLevel::Severe.index()).count();
    assert_eq!( labeled, f.area());

    assert_eq!( analysis.report.summary.most_common_damage_level, DamageLevel::Severe);
    assert_eq!( analysis.report.summary.total_damage_regions, 1);
    assert!( !analysis.catalog.metadata.coordinate_system.has_geographic_coords);
}

#[test]
fn test_block_on_varied_backgrounds () {
    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let pairs: [([u8;3],[u8;3]); 5] = [
        ([40,40,40], [180,180,180]),
        ([30,60,30], [170,200,170]),
        ([20,20,60], [150,150,200]),
        ([60,90,60], [160,190,160]),
        ([100,100,100], [202,202,202]),
    ];

    for (bg, fg) in pairs {
        let pre = RgbImage::from_pixel( 512, 512, Rgb(bg));
        let mut post = pre.clone();
        for y in 100..150 { for x in 100..150 { post.put_pixel( x, y, Rgb(fg)); } }

        let analysis = analyzer.analyze_images( pre, post, AlignmentMetadata::ungeoreferenced( 512, 512)).unwrap();
        let fields = analysis.fields();
        println!("{:?} -> {:?}: {:?}", bg, fg,
            fields.iter().map( |f| (f.level(), f.area(), f.mean_intensity())).collect::<Vec<_>>());

        // one changed block is one damage region, whatever its severity
        assert_eq!( fields.len(), 1);
        let f = &fields[0];
        assert!( (2300..=3700).contains( &f.area()));
        assert!( f.level() >= DamageLevel::Moderate);
        assert!( (f.geometry.centroid.x - 124.5).abs() < 1.5);
        assert_eq!( analysis.statistics.total_regions(), 1);
    }
}

#[test]
fn test_identical_images () {
    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let img = textured( 200, 150);

    let analysis = analyzer.analyze_images( img.clone(), img, AlignmentMetadata::ungeoreferenced( 200, 150)).unwrap();
    assert!( analysis.fields().is_empty());
    assert!( analysis.labels.iter().all( |&v| v == 0));
    assert_eq!( analysis.statistics.total_regions(), 0);
    assert_eq!( analysis.statistics.total_damaged_area(), 0);
    assert_eq!( analysis.report.summary.most_common_damage_level, DamageLevel::None);
    assert!( analysis.catalog.metadata.field_statistics.is_none());
}

#[test]
fn test_deterministic () {
    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let pre = textured( 256, 192);
    let post = RgbImage::from_fn( 256, 192, |x,y| {
        if (30..70).contains( &x) && (20..50).contains( &y) { Rgb([250,240,230]) }
        else if (150..200).contains( &x) && (100..160).contains( &y) { Rgb([10,10,10]) }
        else { *pre.get_pixel( x, y) }
    });

    let md = AlignmentMetadata::ungeoreferenced( 256, 192);
    let a = analyzer.analyze_images( pre.clone(), post.clone(), md.clone()).unwrap();
    let b = analyzer.analyze_images( pre, post, md).unwrap();

    assert!( !a.fields().is_empty());
    assert_eq!( a.labels, b.labels);
    assert_eq!( a.change_map, b.change_map);
    assert_eq!( a.fields(), b.fields());
    assert_eq!( a.statistics, b.statistics);
}

#[test]
fn test_progress_callbacks () {
    let mut analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let seen: Arc<Mutex<Vec<f32>>> = Arc::new( Mutex::new( Vec::new()));

    analyzer.add_progress_callback( Box::new( |pct,_| if pct >= 20.0 { panic!("observer failure") }));
    let s = seen.clone();
    analyzer.add_progress_callback( Box::new( move |pct,msg| {
        println!("{pct:5.1}% {msg}");
        if let Ok(mut v) = s.lock() { v.push( pct) }
    }));

    let (pre, post) = block_pair();
    let analysis = analyzer.analyze_images( pre, post, AlignmentMetadata::ungeoreferenced( 512, 512));
    assert!( analysis.is_ok());

    let seen = seen.lock().unwrap();
    assert_eq!( seen.first(), Some(&0.0));
    assert_eq!( seen.last(), Some(&100.0));
    assert!( seen.contains( &10.0) && seen.contains( &20.0) && seen.contains( &85.0));
    assert!( seen.windows(2).all( |w| w[0] <= w[1]));
}

#[test]
fn test_insufficient_memory () {
    let config = DamageConfig { available_memory_bytes: Some(GIB), ..DamageConfig::default() };
    let analyzer = DamageAnalyzer::new( config).unwrap();
    let img = textured( 64, 64);
    let pre = MemRasterSource::new( "pre", img.clone(), None, None);
    let post = MemRasterSource::new( "post", img, None, None);

    match analyzer.analyze_sources( &pre, &post) {
        Err(OdinDamageError::StageFailed{ stage, cause }) => {
            assert_eq!( stage, AnalysisStage::Load);
            assert!( cause.contains("insufficient memory"));
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("analysis should have failed")
    }
}

#[test]
fn test_missing_file () {
    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("pre.tif");

    let res = analyzer.analyze_files( &missing, &missing);
    assert!( matches!( res, Err(OdinDamageError::StageFailed{ stage: AnalysisStage::Load, .. })));
}

#[test]
fn test_invalid_config () {
    let mut config = DamageConfig::default();
    config.thresholds.severe = 0.2;
    assert!( matches!( DamageAnalyzer::new( config), Err(OdinDamageError::ConfigError(_))));
}

#[test]
fn test_artifacts () {
    let dir = tempfile::tempdir().unwrap();
    let pre_path = dir.path().join("pre.tif");
    let post_path = dir.path().join("post.tif");
    let out_dir = dir.path().join("out");

    // 0.5m UTM 37N grid
    let gt = GeoTransform::north_up( 500000.0, 4100000.0, 0.5, 0.5);
    let (pre, post) = block_pair();
    save_geotiff_rgb8( &pre_path, &pre, Some((&gt, Some(&Crs::UtmNorth(37))))).unwrap();
    save_geotiff_rgb8( &post_path, &post, Some((&gt, Some(&Crs::UtmNorth(37))))).unwrap();

    let analyzer = DamageAnalyzer::new( test_config()).unwrap();
    let (analysis, paths) = analyzer.run_to_dir( &pre_path, &post_path, &out_dir).unwrap();

    for p in [&paths.report, &paths.field_catalog, &paths.labels, &paths.change_map, &paths.overlay] {
        assert!( p.is_file(), "missing artifact {:?}", p);
    }
    assert_eq!( analysis.metadata.resolution, 0.5);
    assert_eq!( analysis.metadata.crs, Some(Crs::UtmNorth(37)));

    let catalog: serde_json::Value = serde_json::from_str( &std::fs::read_to_string( &paths.field_catalog).unwrap()).unwrap();
    assert_eq!( catalog["metadata"]["total_fields"], 1);
    assert_eq!( catalog["metadata"]["coordinate_system"]["has_geographic_coords"], true);
    assert_eq!( catalog["metadata"]["coordinate_system"]["crs_original"], "EPSG:32637");

    let centroid = &catalog["fields"][0]["geometry"]["centroid"];
    let lon = centroid["longitude"].as_f64().unwrap();
    let lat = centroid["latitude"].as_f64().unwrap();
    assert!( (38.9..39.1).contains( &lon), "longitude {lon}");
    assert!( (36.5..37.5).contains( &lat), "latitude {lat}");

    let report: serde_json::Value = serde_json::from_str( &std::fs::read_to_string( &paths.report).unwrap()).unwrap();
    assert_eq!( report["summary"]["most_common_damage_level"], "severe");
    assert_eq!( report["analysis_metadata"]["resolution_m_per_pixel"], 0.5);

    let labels = GeoTiffSource::open( &paths.labels).unwrap();
    assert_eq!( (labels.meta().width, labels.meta().height), (512, 512));
    assert_eq!( labels.meta().transform, Some(gt));
}
