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
use odin_raster::{CoordinateMapper, Crs, GeoTransform};
use odin_damage::{
    AlignmentMetadata, DamageAnalyzer, DamageConfig, DamageLevel, TileOrchestrator, TileOutcome,
    config::GIB, errors::op_failed, tiling::analyze_tile
};

fn tiled_config ()->DamageConfig {
    DamageConfig {
        available_memory_bytes: Some(16 * GIB),
        tiling_pixel_threshold: 100_000,
        min_tile_size: 256,
        max_tile_size: 256,
        ..DamageConfig::default()
    }
}

/// dark uniform scene, post image has bright blocks in the upper left and lower right tile
fn two_block_pair ()->(RgbImage,RgbImage) {
    let pre = RgbImage::from_pixel( 512, 512, Rgb([40,40,40]));
    let mut post = pre.clone();
    for y in 100..150 { for x in 100..150 { post.put_pixel( x, y, Rgb([180,180,180])); } }
    for y in 350..390 { for x in 330..400 { post.put_pixel( x, y, Rgb([230,230,230])); } }
    (pre, post)
}

#[test]
fn test_tiled_matches_direct () {
    let (pre, post) = two_block_pair();
    let md = AlignmentMetadata::ungeoreferenced( 512, 512);

    let direct = DamageAnalyzer::new( DamageConfig{ available_memory_bytes: Some(16 * GIB), ..DamageConfig::default() }).unwrap()
        .analyze_images( pre.clone(), post.clone(), md.clone()).unwrap();
    let tiled = DamageAnalyzer::new( tiled_config()).unwrap()
        .analyze_images( pre, post, md).unwrap();

    assert!( direct.tiles.is_none());
    let tiles = tiled.tiles.as_ref().unwrap();
    assert_eq!( tiles.len(), 4);
    assert_eq!( tiled.method, "tiled");
    assert!( tiled.failed_tiles().is_empty());

    // blocks are far from tile seams
    assert_eq!( direct.fields().len(), 2);
    assert_eq!( tiled.fields().len(), 2);
    for level in DamageLevel::SEVERITIES {
        let (d, t) = (direct.statistics.get( level).unwrap(), tiled.statistics.get( level).unwrap());
        assert_eq!( d.total_area, t.total_area, "{level} area");
        assert_eq!( d.count, t.count, "{level} count");
    }
    assert_eq!( direct.labels, tiled.labels);

    // renumbered in tile order, geometry in full image coordinates
    let ids: Vec<usize> = tiled.fields().iter().map( |f| f.field_id).collect();
    assert_eq!( ids, vec![1,2]);
    assert!( tiled.fields()[1].geometry.bounds.min_x >= 256);
    assert!( (tiled.fields()[1].geometry.centroid.y - 369.5).abs() < 1.5);

    // upper right and lower left tiles are uniform
    let uniform = tiles.iter().filter( |(_,o)| *o == TileOutcome::SkippedUniform).count();
    assert_eq!( uniform, 2);
}

#[test]
fn test_tile_failures_are_contained () {
    let config = tiled_config();
    let (pre, post) = two_block_pair();
    let orchestrator = TileOrchestrator::new( &config, None, 16 * GIB).with_workers( 2);
    assert_eq!( orchestrator.tile_size(), 256);

    let res = orchestrator.process_with( &pre, &post, &|_,_| {}, |spec,a,b| {
        match (spec.row, spec.col) {
            (1,1) => Err( op_failed("simulated read error")),
            (0,1) => panic!("simulated worker crash"),
            _ => analyze_tile( spec, a, b, &config)
        }
    }).unwrap();

    let failed = res.failed_tiles();
    assert_eq!( failed.len(), 2);
    assert!( failed.iter().any( |(s,cause)| s.row == 1 && s.col == 1 && cause.contains("simulated read error")));
    assert!( failed.iter().any( |(s,_)| s.row == 0 && s.col == 1));

    // the failed lower right tile is an all zero placeholder
    assert!( res.labels.slice( ndarray::s![256..512, 256..512]).iter().all( |&v| v == 0));
    assert!( res.change_map.slice( ndarray::s![256..512, 256..512]).iter().all( |&v| v == 0.0));

    // the upper left block survived
    assert_eq!( res.fields.len(), 1);
    assert_eq!( res.fields[0].field_id, 1);
    assert_eq!( res.statistics.total_regions(), 1);
    assert_eq!( res.tiles.len(), 4);
}

#[test]
fn test_tile_geography () {
    let config = tiled_config();
    let (pre, post) = two_block_pair();

    let mut mapper = CoordinateMapper::geodetic();
    mapper.initialize( Some(GeoTransform::north_up( 36.0, 37.0, 0.0001, 0.0001)), Some(Crs::Wgs84));

    let res = TileOrchestrator::new( &config, Some(&mapper), 16 * GIB).process( &pre, &post, &|_,_| {}).unwrap();
    assert_eq!( res.fields.len(), 2);

    for f in &res.fields {
        let c = &f.geometry.centroid;
        let lon = c.longitude.unwrap();
        let lat = c.latitude.unwrap();
        assert!( (lon - (36.0 + (c.x + 0.5) * 0.0001)).abs() < 1e-9);
        assert!( (lat - (37.0 - (c.y + 0.5) * 0.0001)).abs() < 1e-9);
        assert!( f.geometry.bounds.geographic.is_some());
    }
}

#[test]
fn test_batch_progress () {
    let config = DamageConfig { tile_batch_size: Some(1), ..tiled_config() };
    let (pre, post) = two_block_pair();
    let seen: Arc<Mutex<Vec<f32>>> = Arc::new( Mutex::new( Vec::new()));

    let s = seen.clone();
    let progress = move |f: f32, _: &str| { if let Ok(mut v) = s.lock() { v.push(f) } };
    let res = TileOrchestrator::new( &config, None, 16 * GIB).process( &pre, &post, &progress).unwrap();
    assert_eq!( res.tiles.len(), 4);

    let seen = seen.lock().unwrap();
    assert_eq!( *seen, vec![0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn test_no_change_tile () {
    let config = tiled_config();
    let img = RgbImage::from_fn( 300, 300, |x,y| Rgb([ ((x*7 + y*13) % 256) as u8, ((x*y) % 256) as u8, 90 ]));

    let res = TileOrchestrator::new( &config, None, 16 * GIB).process( &img, &img, &|_,_| {}).unwrap();
    assert_eq!( res.tiles.len(), 4);
    assert!( res.tiles.iter().all( |(_,o)| *o == TileOutcome::SkippedNoChange));
    assert!( res.fields.is_empty());
    assert_eq!( res.statistics.total_damaged_area(), 0);
}

#[test]
fn test_seam_crossing_block () {
    let pre = RgbImage::from_pixel( 512, 512, Rgb([40,40,40]));
    let mut post = pre.clone();
    for y in 100..150 { for x in 230..280 { post.put_pixel( x, y, Rgb([180,180,180])); } }
    let md = AlignmentMetadata::ungeoreferenced( 512, 512);

    let direct = DamageAnalyzer::new( DamageConfig{ available_memory_bytes: Some(16 * GIB), ..DamageConfig::default() }).unwrap()
        .analyze_images( pre.clone(), post.clone(), md.clone()).unwrap();
    let tiled = DamageAnalyzer::new( tiled_config()).unwrap()
        .analyze_images( pre, post, md).unwrap();
    let fields = tiled.fields();
    println!("seam fields: {:?}", fields.iter().map( |f| (f.field_id, f.level(), f.area(), f.geometry.bounds.min_x, f.geometry.bounds.max_x)).collect::<Vec<_>>());

    assert_eq!( direct.fields().len(), 1);

    // the block is cut at x=256 into one field per tile
    assert_eq!( fields.len(), 2);
    assert_eq!( fields.iter().map( |f| f.field_id).collect::<Vec<_>>(), vec![1,2]);
    assert!( fields.iter().all( |f| f.level() == DamageLevel::Severe));
    assert!( fields[0].geometry.bounds.max_x < 256);
    assert!( fields[1].geometry.bounds.min_x >= 256);

    let severe = tiled.statistics.get( DamageLevel::Severe).unwrap();
    assert_eq!( severe.count, 2);
    assert_eq!( severe.total_area, fields[0].area() + fields[1].area());
    let labeled = tiled.labels.iter().filter( |&&v| v == DamageLevel::Severe.index()).count();
    assert_eq!( labeled, severe.total_area);
}
