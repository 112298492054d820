use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use svop_core::{Banner, FrameView, GazePoint, InfoPanel, StimulusPoint, Verdict};
use svop_render::SkiaRenderer;
use svop_timing::HighPrecisionTimer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn harness() -> (SkiaRenderer, Vec<u8>, HighPrecisionTimer) {
    let mut r = SkiaRenderer::new(WIDTH, HEIGHT, None).expect("renderer");
    let ball = [255u8, 255, 255, 255].repeat(64 * 64);
    r.set_stimulus_image(&ball, 64, 64, 16).expect("stimulus");
    let fb = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    (r, fb, HighPrecisionTimer::new())
}

fn presenting(show_buttons: bool) -> FrameView {
    FrameView::Presenting {
        stimulus: StimulusPoint::new(3, 740, 360),
        gaze: Some(GazePoint { x: 700.0, y: 340.0 }),
        info: InfoPanel {
            stimulus: 3,
            total: 9,
            elapsed_s: 1.2,
            distance: Some(44.7),
        },
        show_buttons,
    }
}

pub fn bench_frames(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40);

    g.bench_function("presenting", |b| {
        b.iter_batched(
            || harness(),
            |(mut r, mut fb, mut t)| {
                black_box(r.render_frame(&presenting(false), &mut fb, &mut t).map(|s| s.total))
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("presenting_with_sidebar", |b| {
        b.iter_batched(
            || harness(),
            |(mut r, mut fb, mut t)| {
                black_box(r.render_frame(&presenting(true), &mut fb, &mut t).map(|s| s.total))
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("steady_state_presenting", |b| {
        let (mut r, mut fb, mut t) = harness();
        let view = presenting(false);
        b.iter(|| black_box(r.render_frame(&view, &mut fb, &mut t).map(|s| s.dirty_count)))
    });

    g.bench_function("verdict_banner", |b| {
        let (mut r, mut fb, mut t) = harness();
        let view = FrameView::Banner(Banner::Verdict(Verdict::Fail));
        b.iter(|| black_box(r.render_frame(&view, &mut fb, &mut t).map(|s| s.dirty_count)))
    });

    g.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
