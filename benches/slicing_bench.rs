use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resonant::layout::Layout;
use resonant::metadata::MetadataStore;
use resonant::slicer::{fragments, ExtractOptions, Slicer};
use resonant::transform::{Transform, TransformChain};

fn bench_transforms(c: &mut Criterion) {
    let data = vec![0xA5u8; 1024 * 1024];
    let chain = TransformChain::new(vec![Transform::Xor, Transform::Invert]);

    c.bench_function("invert_1mb", |b| b.iter(|| Transform::Invert.apply(black_box(&data))));
    c.bench_function("xor_1mb", |b| b.iter(|| Transform::Xor.apply(black_box(&data))));
    c.bench_function("chain_invert_1mb", |b| b.iter(|| chain.invert(black_box(&data))));
}

fn bench_fragment_grid(c: &mut Criterion) {
    let layout = Layout::default();
    let buf: Vec<u8> = (0..640u32).map(|i| (i * 7) as u8).collect();

    c.bench_function("fragment_grid_640b", |b| {
        b.iter(|| fragments(&layout, black_box(&buf)).map(|f| f.record(&layout)).count())
    });
}

fn bench_extract_to_disk(c: &mut Criterion) {
    let buf = vec![42u8; 640];

    c.bench_function("extract_640b_flush_each", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            let opts = ExtractOptions { output_dir: dir.path().to_owned(), metadata_path: None, flush_every: 1 };
            let slicer = Slicer::new(Layout::default(), opts).unwrap();
            slicer.extract_into(black_box(&buf), &mut MetadataStore::new()).unwrap();
        })
    });

    c.bench_function("extract_640b_flush_once", |b| {
        b.iter(|| {
            let dir = tempfile::tempdir().unwrap();
            let opts = ExtractOptions { output_dir: dir.path().to_owned(), metadata_path: None, flush_every: 0 };
            let slicer = Slicer::new(Layout::default(), opts).unwrap();
            slicer.extract_into(black_box(&buf), &mut MetadataStore::new()).unwrap();
        })
    });
}

criterion_group!(benches, bench_transforms, bench_fragment_grid, bench_extract_to_disk);
criterion_main!(benches);
