use dosmix::synth::prerender::{PrerenderRing, Streams, STREAM_COUNT};

fn frame(value: f32) -> [f32; STREAM_COUNT] {
    std::array::from_fn(|channel| value + channel as f32 / 10.0)
}

fn buffers(len: usize) -> [Vec<f32>; STREAM_COUNT] {
    std::array::from_fn(|_| vec![0.0; len])
}

#[test]
fn ring_keeps_one_slot_free() {
    let mut ring = PrerenderRing::with_capacity(4);
    assert!(ring.is_empty());
    assert!(ring.push(frame(1.0)));
    assert!(ring.push(frame(2.0)));
    assert!(ring.push(frame(3.0)));
    assert!(ring.is_full());
    assert!(!ring.push(frame(4.0)));
    assert_eq!(ring.len(), 3);
}

#[test]
fn drain_copies_oldest_frames_into_every_stream() {
    let mut ring = PrerenderRing::with_capacity(8);
    for i in 1..=3 {
        ring.push(frame(i as f32));
    }
    let mut out = buffers(5);
    let copied = {
        let mut streams = Streams::from_buffers(&mut out, 5);
        ring.drain_into(&mut streams, 5)
    };
    assert_eq!(copied, 3);
    assert!(ring.is_empty());
    assert_eq!(out[0], vec![1.0, 2.0, 3.0, 0.0, 0.0]);
    assert_eq!(out[5][..3], [1.5, 2.5, 3.5]);
}

#[test]
fn partial_drain_leaves_the_rest_queued() {
    let mut ring = PrerenderRing::with_capacity(8);
    for i in 1..=4 {
        ring.push(frame(i as f32));
    }
    let mut out = buffers(2);
    {
        let mut streams = Streams::from_buffers(&mut out, 2);
        assert_eq!(ring.drain_into(&mut streams, 2), 2);
    }
    assert_eq!(out[0], vec![1.0, 2.0]);
    assert_eq!(ring.len(), 2);
}

#[test]
fn wrapped_frames_come_out_in_order() {
    let mut ring = PrerenderRing::with_capacity(4);
    let mut scratch = buffers(4);
    ring.push(frame(1.0));
    ring.push(frame(2.0));
    {
        let mut streams = Streams::from_buffers(&mut scratch, 1);
        ring.drain_into(&mut streams, 1);
    }
    // Write index now wraps past the end of the storage.
    ring.push(frame(3.0));
    ring.push(frame(4.0));
    assert!(ring.is_full());

    let mut out = buffers(4);
    let copied = {
        let mut streams = Streams::from_buffers(&mut out, 4);
        ring.drain_into(&mut streams, 4)
    };
    assert_eq!(copied, 3);
    assert_eq!(out[0][..3], [2.0, 3.0, 4.0]);
    assert!(ring.is_empty());
}

#[test]
fn absent_streams_are_left_alone() {
    let mut ring = PrerenderRing::with_capacity(4);
    ring.push(frame(1.0));
    let mut left = vec![0.0f32; 1];
    let mut streams = Streams {
        reverb_wet_left: Some(&mut left),
        ..Streams::default()
    };
    assert_eq!(ring.drain_into(&mut streams, 1), 1);
    assert_eq!(left, vec![frame(1.0)[4]]);
}

#[test]
fn window_offsets_every_present_stream() {
    let mut out = buffers(6);
    {
        let mut streams = Streams::from_buffers(&mut out, 6);
        let mut window = streams.window(2, 3);
        if let Some(stream) = window.non_reverb_right.as_deref_mut() {
            stream.fill(1.0);
        }
        assert_eq!(window.reverb_dry_left.as_deref().map(<[f32]>::len), Some(3));
    }
    assert_eq!(out[1], vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);

    let mut streams = Streams::from_buffers(&mut out, 6);
    streams.clear();
    drop(streams);
    assert!(out.iter().all(|stream| stream.iter().all(|&v| v == 0.0)));
}
