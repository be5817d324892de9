use criterion::{black_box, criterion_group, criterion_main, Criterion};

use clipcast::{CaptionTrack, TranscriptSegment, VideoFormat};

fn caption_benchmarks(c: &mut Criterion) {
    let segments: Vec<TranscriptSegment> = (0..200)
        .map(|i| {
            TranscriptSegment::new(
                i as f64 * 2.0,
                i as f64 * 2.0 + 2.0,
                format!(
                    "segment {} with punctuation: commas, [brackets] and 'quotes' that all need escaping",
                    i
                ),
            )
        })
        .collect();

    c.bench_function("build_track_200_segments", |b| {
        b.iter(|| CaptionTrack::build(black_box(&segments), VideoFormat::TIKTOK))
    });

    let track = CaptionTrack::build(&segments, VideoFormat::TIKTOK);
    c.bench_function("serialize_filter_complex_200_stages", |b| {
        b.iter(|| track.filter_complex(black_box("font.ttf")))
    });
}

criterion_group!(benches, caption_benchmarks);
criterion_main!(benches);
