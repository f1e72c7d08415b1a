use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use pageshot::area::extract_area;
use pageshot::compositor::{composite, encode_png, CapturedTile};
use pageshot::planner::plan;
use pageshot::{CapturePlan, SelectionArea, MAX_SINGLE_SHOT_HEIGHT, TILE_HEIGHT};

fn bench_plan(c: &mut Criterion) {
    c.bench_function("plan_tall_page", |b| {
        b.iter(|| plan(black_box(1280), black_box(200_000), MAX_SINGLE_SHOT_HEIGHT, TILE_HEIGHT))
    });
}

fn bench_composite(c: &mut Criterion) {
    let regions = match plan(64, 20_000, MAX_SINGLE_SHOT_HEIGHT, TILE_HEIGHT) {
        CapturePlan::Tiled { regions } => regions,
        CapturePlan::OneShot { .. } => unreachable!("20000px page must be tiled"),
    };
    let tiles: Vec<CapturedTile> = regions
        .iter()
        .enumerate()
        .map(|(i, region)| CapturedTile {
            region: *region,
            image: RgbaImage::from_pixel(64, region.height, Rgba([i as u8 * 60, 0, 0, 255])),
        })
        .collect();

    c.bench_function("composite_three_strips", |b| {
        b.iter(|| composite(black_box(&tiles), 64, 20_000, 1.0).unwrap())
    });

    let stitched = composite(&tiles, 64, 20_000, 1.0).unwrap();
    c.bench_function("encode_stitched_png", |b| b.iter(|| encode_png(black_box(&stitched)).unwrap()));
}

fn bench_extract_area(c: &mut Criterion) {
    let viewport = RgbaImage::from_pixel(2560, 1600, Rgba([10, 20, 30, 255]));
    let selection = SelectionArea::new(100.0, 100.0, 400.0, 300.0);
    c.bench_function("extract_area_dpr2", |b| {
        b.iter(|| extract_area(black_box(&viewport), &selection, 2.0).unwrap())
    });
}

criterion_group!(benches, bench_plan, bench_composite, bench_extract_area);
criterion_main!(benches);
