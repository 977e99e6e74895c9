use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use voxbridge::constants::{KEY_LEN, STEREO_FRAME_SIZE};
use voxbridge::crypto::Cipher;
use voxbridge::ring::RingBuffer;
use voxbridge::rtp::RtpState;

pub fn seal_one_frame(c: &mut Criterion) {
    let pcm = utils::make_pcm_sine(STEREO_FRAME_SIZE, true);
    let cipher = Cipher::new(&[7u8; KEY_LEN]).unwrap();
    let mut state = RtpState::new(0xDEAD_BEEF);

    c.bench_function("packetize + seal one 20ms opus-sized frame", |b| {
        b.iter_batched(
            || black_box(state.next_header((STEREO_FRAME_SIZE / 2) as u32)),
            |header| {
                cipher.seal(black_box(&header), black_box(&pcm)).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn open_one_frame(c: &mut Criterion) {
    let pcm = utils::make_pcm_sine(STEREO_FRAME_SIZE, true);
    let cipher = Cipher::new(&[7u8; KEY_LEN]).unwrap();
    let mut state = RtpState::new(0xDEAD_BEEF);
    let header = state.next_header((STEREO_FRAME_SIZE / 2) as u32);
    let sealed = cipher.seal(&header, &pcm).unwrap();

    c.bench_function("decrypt one 20ms sealed frame", |b| {
        b.iter(|| {
            cipher.open(black_box(&header), black_box(&sealed)).unwrap();
        })
    });
}

pub fn ring_buffer_roundtrip(c: &mut Criterion) {
    let packet = utils::make_pcm_sine(STEREO_FRAME_SIZE, true);

    c.bench_function("ring buffer push+consume one packet", |b| {
        b.iter_batched_ref(
            || RingBuffer::new(16 * 1024),
            |ring| {
                ring.push(black_box(&packet));
                let view = ring.pop_view();
                ring.consume(view.len());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, seal_one_frame, open_one_frame, ring_buffer_roundtrip);
criterion_main!(benches);
