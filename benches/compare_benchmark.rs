use criterion::{Criterion, black_box, criterion_group, criterion_main};
use web_vision::{PixelCanvas, compare};

fn benchmark_compare(c: &mut Criterion) {
    let baseline = PixelCanvas::with_color(1280, 720, [240, 240, 240])
        .to_png()
        .unwrap();

    let mut drifted = PixelCanvas::with_color(1280, 720, [240, 240, 240]);
    drifted.draw_rect(100, 100, 64, 64, [255, 0, 0]);
    let actual = drifted.to_png().unwrap();

    c.bench_function("compare_1280x720", |b| {
        b.iter(|| {
            let outcome = compare(black_box(&baseline), black_box(&actual), 0.01).unwrap();
            assert!(!outcome.matches);
        })
    });
}

criterion_group!(benches, benchmark_compare);
criterion_main!(benches);
