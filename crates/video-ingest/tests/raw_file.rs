use std::{
    fs::File,
    io::{BufReader, BufWriter},
};

use frame_pipeline::{Outcome, Pipeline, PipelineConfig, from_fn};
use video_ingest::{Frame, FrameSize, RawFrameReader, RawFrameWriter};

fn write_clip(path: &std::path::Path, size: FrameSize, frames: u8) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut writer = RawFrameWriter::new(file, size);
    for n in 0..frames {
        let mut frame = Frame::black(size);
        frame.data.fill(n);
        writer.write_frame(&frame).unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn raw_file_flows_through_pipeline_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.bgr");
    let size = FrameSize::new(16, 8);
    write_clip(&input, size, 40);

    let reader = RawFrameReader::new(BufReader::new(File::open(&input).unwrap()), size);
    let invert = |_worker: usize| -> anyhow::Result<_> {
        Ok(from_fn(|mut frame: Frame| {
            frame.data.iter_mut().for_each(|b| *b = 255 - *b);
            Ok(frame)
        }))
    };

    let mut out: Vec<Outcome<Frame>> = Vec::new();
    let report = Pipeline::new(PipelineConfig::new(4))
        .run(reader, invert, &mut out)
        .unwrap();

    assert_eq!(report.frames, 40);
    for (n, outcome) in out.iter().enumerate() {
        let frame = outcome.as_ref().unwrap();
        assert_eq!(frame.size(), size);
        assert!(frame.data.iter().all(|&b| b == 255 - n as u8));
    }
}

#[test]
fn truncated_raw_file_ends_run_early() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("cut.bgr");
    let size = FrameSize::new(4, 4);
    write_clip(&input, size, 3);
    // Chop the last frame in half.
    let file = std::fs::OpenOptions::new().write(true).open(&input).unwrap();
    file.set_len((size.width * size.height * 3 * 2 + 10) as u64).unwrap();

    let reader = RawFrameReader::new(File::open(&input).unwrap(), size);
    let identity = |_worker: usize| -> anyhow::Result<_> { Ok(from_fn(|f: Frame| Ok(f))) };
    let mut out: Vec<Outcome<Frame>> = Vec::new();
    let report = Pipeline::new(PipelineConfig::new(2))
        .run(reader, identity, &mut out)
        .unwrap();

    assert_eq!(report.frames, 2);
    assert!(matches!(report.end, frame_pipeline::EndReason::Truncated(_)));
}
