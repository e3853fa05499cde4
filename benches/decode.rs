extern crate criterion;
extern crate tiffcore;

use criterion::{
    black_box, measurement::Measurement, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use tiffcore::decoder::{read_contents, Decoder, ReadOptions};
use tiffcore::encoder::{encode, EncodeOptions};
use tiffcore::Raster;

fn synthetic(width: u32, height: u32, has_alpha: bool) -> Vec<u8> {
    let mut raster = Raster::new(width, height, has_alpha).unwrap();
    for y in 0..height {
        for x in 0..width {
            raster.put_pixel(x, y, [x as u8, y as u8, (x ^ y) as u8, 0xff]);
        }
    }
    let mut out = Vec::new();
    encode(&raster, &mut out, &EncodeOptions::default()).unwrap();
    out
}

fn decode_all(image: &[u8]) {
    let decoder = Decoder::new(black_box(image));
    for raster in decoder.decode_all_images().unwrap() {
        black_box(raster);
    }
}

fn resolve(image: &[u8]) {
    black_box(read_contents(black_box(image), &ReadOptions::default().with_image_data()).unwrap());
}

fn main() {
    struct BenchDef {
        data: Vec<u8>,
        id: &'static str,
        sample_size: usize,
    }

    fn run_bench_def<M: Measurement>(
        group: &mut BenchmarkGroup<M>,
        def: &BenchDef,
        run: fn(&[u8]),
    ) {
        group
            .sample_size(def.sample_size)
            .throughput(Throughput::Bytes(def.data.len() as u64))
            .bench_with_input(
                BenchmarkId::new(def.id, def.data.len()),
                &def.data[..],
                |b, input| b.iter(|| run(input)),
            );
    }

    let defs = [
        BenchDef {
            data: synthetic(64, 64, false),
            id: "rgb-64",
            sample_size: 500,
        },
        BenchDef {
            data: synthetic(1024, 768, false),
            id: "rgb-1024",
            sample_size: 20,
        },
        BenchDef {
            data: synthetic(1024, 768, true),
            id: "rgba-1024",
            sample_size: 20,
        },
    ];

    let mut c = Criterion::default().configure_from_args();

    let mut group = c.benchmark_group("tiff-decode");
    for def in &defs {
        run_bench_def(&mut group, def, decode_all);
    }
    group.finish();

    let mut group = c.benchmark_group("tiff-resolve");
    for def in &defs {
        run_bench_def(&mut group, def, resolve);
    }
    group.finish();
}
