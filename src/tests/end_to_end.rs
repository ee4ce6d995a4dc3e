use std::path::Path;

use crate::frame::{FILLER, Frame};
use crate::memory::MemoryPlatform;
use crate::mode::{AccessMode, FileLayout};
use crate::platform::OsPlatform;
use crate::profile::{self, Profile};
use crate::report::{self, ReportOptions};
use crate::timing;
use crate::{histogram, tester};

fn small_profile() -> Profile {
    Profile::custom(2 * 4096 + 100, 0)
}

#[test]
fn test_write_then_read_reverse() {
    super::try_init_logging();

    let platform = MemoryPlatform::new();
    let target = Path::new("/bench");
    let frame = Frame::generate(&platform, profile::get_by_name("SD-24bit")).unwrap();
    assert_eq!(frame.size(), 1_040_384);

    let written = crate::builder()
        .with_frames(5)
        .try_run_write(&platform, &frame, target)
        .unwrap();

    let frame_read = tester::frame_for_read(&platform, target, 0).unwrap();
    assert_eq!(frame_read.profile().name, "SD-24bit");

    let read = crate::builder()
        .with_frames(5)
        .with_access_mode(AccessMode::Reverse)
        .try_run_read(&platform, &frame_read, target)
        .unwrap();

    assert_eq!(written.frames_completed, 5);
    assert_eq!(read.frames_completed, 5);
    assert_eq!(written.bytes_transferred, read.bytes_transferred);
    assert_eq!(written.completions.len(), 5);
    assert_eq!(read.completions.len(), 5);
}

#[rstest::rstest]
fn test_multi_threaded_round_trip(
    #[values(1, 3, 4)] threads: usize,
    #[values(AccessMode::Sequential, AccessMode::Reverse, AccessMode::Random)] access: AccessMode,
    #[values(FileLayout::Multiple, FileLayout::Single)] layout: FileLayout,
) {
    let platform = MemoryPlatform::new();
    let target = Path::new("/bench/target");
    let frame = Frame::generate(&platform, small_profile()).unwrap();
    let builder = crate::builder()
        .with_threads(threads)
        .with_frames(10)
        .with_access_mode(access)
        .with_layout(layout);

    let written = builder.try_run_write(&platform, &frame, target).unwrap();
    assert_eq!(written.frames_completed, 10);
    assert_eq!(written.bytes_transferred, 10 * frame.size() as u64);

    match layout {
        FileLayout::Multiple => {
            let paths = platform.file_paths();
            assert_eq!(paths.len(), 10);
            for (idx, path) in paths.iter().enumerate() {
                assert_eq!(path, &layout.frame_path(target, idx));
                let contents = platform.file_contents(path).unwrap();
                assert_eq!(contents.len(), frame.size());
                assert!(contents.iter().all(|b| *b == FILLER));
            }
        },
        FileLayout::Single => {
            let contents = platform.file_contents(target).unwrap();
            assert_eq!(contents.len(), 10 * frame.size());
            assert!(contents.iter().all(|b| *b == FILLER));
        },
    }

    let read = builder.try_run_read(&platform, &frame, target).unwrap();
    assert_eq!(read.frames_completed, 10);
    assert_eq!(read.bytes_transferred, written.bytes_transferred);

    // Only the template frame remains, the per worker read buffers are released.
    assert_eq!(platform.live_allocations(), 1);
}

#[test]
fn test_start_frame_offset() {
    let platform = MemoryPlatform::new();
    let target = Path::new("/bench");
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let result = crate::builder()
        .with_threads(2)
        .with_frames(5)
        .with_start_frame(100)
        .try_run_write(&platform, &frame, target)
        .unwrap();
    assert_eq!(result.frames_completed, 5);

    let expected: Vec<_> = (100..105)
        .map(|idx| FileLayout::Multiple.frame_path(target, idx))
        .collect();
    assert_eq!(platform.file_paths(), expected);
}

#[test]
fn test_seeded_random_runs_visit_same_frames() {
    let platform = MemoryPlatform::new();
    let frame = Frame::generate(&platform, small_profile()).unwrap();
    let builder = crate::builder()
        .with_threads(2)
        .with_frames(16)
        .with_access_mode(AccessMode::Random)
        .with_shuffle_seed(1234);

    let first = builder
        .try_run_write(&platform, &frame, Path::new("/first"))
        .unwrap();
    let second = builder
        .try_run_write(&platform, &frame, Path::new("/second"))
        .unwrap();

    assert_eq!(first.frames_completed, 16);
    assert_eq!(second.frames_completed, 16);
    assert_eq!(platform.file_paths().len(), 32);
}

#[rstest::rstest]
#[case::single_thread(1)]
#[case::two_threads(2)]
fn test_frame_rate_limit(#[case] threads: usize) {
    let platform = MemoryPlatform::new();
    let target = Path::new("/bench");
    let frame = Frame::generate(&platform, small_profile()).unwrap();
    let builder = crate::builder()
        .with_threads(threads)
        .with_frames(5)
        .with_fps(40);

    let start = timing::now_ns();
    let written = builder.try_run_write(&platform, &frame, target).unwrap();
    let frame_read = tester::frame_for_read(&platform, target, 0).unwrap();
    let read = builder.try_run_read(&platform, &frame_read, target).unwrap();
    let wall = timing::elapsed_ns(start);

    assert_eq!(written.frames_completed, 5);
    assert_eq!(read.frames_completed, 5);
    assert!(
        written.elapsed_ns + read.elapsed_ns >= 250 * timing::MS_IN_NS,
        "write: {}, read: {}",
        written.elapsed_ns,
        read.elapsed_ns,
    );
    assert!(wall >= 250 * timing::MS_IN_NS, "wall: {wall}");
}

#[test]
fn test_frame_rate_limit_below_thread_count() {
    let platform = MemoryPlatform::new();
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let result = crate::builder()
        .with_threads(4)
        .with_frames(4)
        .with_fps(2)
        .try_run_write(&platform, &frame, Path::new("/bench"))
        .unwrap();

    // 4 frames at 2 fps must take about 2 seconds, whichever worker runs them.
    assert_eq!(result.frames_completed, 4);
    assert!(
        result.elapsed_ns >= 1_900 * timing::MS_IN_NS,
        "elapsed: {}",
        result.elapsed_ns
    );
}

#[test]
fn test_elapsed_is_wall_time() {
    let platform = MemoryPlatform::new();
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let start = timing::now_ns();
    let result = crate::builder()
        .with_threads(4)
        .with_frames(8)
        .with_fps(40)
        .try_run_write(&platform, &frame, Path::new("/bench"))
        .unwrap();
    let wall = timing::elapsed_ns(start);

    assert!(result.elapsed_ns <= wall);
    assert!(result.io_time_ns <= result.elapsed_ns * 4);
}

#[test]
fn test_empty_frame_run() {
    let platform = MemoryPlatform::new();
    let frame = Frame::generate(&platform, profile::EMPTY).unwrap();

    let result = crate::builder()
        .with_threads(2)
        .with_frames(6)
        .try_run_write(&platform, &frame, Path::new("/bench"))
        .unwrap();
    assert_eq!(result.frames_completed, 6);
    assert_eq!(result.bytes_transferred, 0);

    let frame_read = tester::frame_for_read(&platform, Path::new("/bench"), 0).unwrap();
    assert!(frame_read.is_empty());
    assert_eq!(frame_read.profile(), &profile::EMPTY);
}

#[test]
fn test_reports_from_run() {
    let platform = MemoryPlatform::new();
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let result = crate::builder()
        .with_threads(2)
        .with_frames(20)
        .try_run_write(&platform, &frame, Path::new("/bench"))
        .unwrap();

    let options = ReportOptions {
        times: true,
        frame_times: true,
    };
    let mut output = Vec::new();
    report::write_results(&mut output, "write", &options, &result).unwrap();
    report::write_csv_header(&mut output, &options).unwrap();
    report::write_results_csv(&mut output, "write", frame.profile().name, 2, &options, &result)
        .unwrap();
    histogram::write_histogram(&mut output, &result).unwrap();

    let output = String::from_utf8(output).unwrap();
    assert!(output.starts_with("Results write:\n frames: 20\n"));
    assert!(output.contains("\"write\",\"custom\",2,20,"));
    assert!(output.contains("Completion times:\n"));
    assert_eq!(output.matches("frame,start,open,io,close,frame").count(), 2);
}

#[rstest::rstest]
#[case::sequential(AccessMode::Sequential)]
#[case::random(AccessMode::Random)]
fn test_os_platform_round_trip(#[case] access: AccessMode) {
    super::try_init_logging();

    let platform = OsPlatform::new();
    let dir = tempfile::tempdir().unwrap();
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let builder = crate::builder()
        .with_threads(2)
        .with_frames(6)
        .with_access_mode(access);

    let written = builder.try_run_write(&platform, &frame, dir.path()).unwrap();
    assert_eq!(written.frames_completed, 6);
    for idx in 0..6 {
        let path = FileLayout::Multiple.frame_path(dir.path(), idx);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), frame.size() as u64);
    }

    let frame_read = tester::frame_for_read(&platform, dir.path(), 0).unwrap();
    assert_eq!(frame_read.size(), frame.size());

    let read = builder
        .with_access_mode(AccessMode::Reverse)
        .try_run_read(&platform, &frame_read, dir.path())
        .unwrap();
    assert_eq!(read.frames_completed, 6);
    assert_eq!(read.bytes_transferred, written.bytes_transferred);
}

#[test]
fn test_os_platform_single_file() {
    let platform = OsPlatform::new();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("frames.bin");
    let frame = Frame::generate(&platform, small_profile()).unwrap();

    let builder = crate::builder()
        .with_threads(3)
        .with_frames(9)
        .with_layout(FileLayout::Single);

    let written = builder.try_run_write(&platform, &frame, &target).unwrap();
    assert_eq!(written.frames_completed, 9);
    assert_eq!(
        std::fs::metadata(&target).unwrap().len(),
        9 * frame.size() as u64
    );

    let read = builder.try_run_read(&platform, &frame, &target).unwrap();
    assert_eq!(read.frames_completed, 9);
}
