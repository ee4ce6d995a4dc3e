use std::io;
use std::path::Path;

use framebench::report::{self, ReportOptions};
use framebench::{AccessMode, Frame, OsPlatform, histogram, profile, tester};

#[cfg_attr(test, test)]
fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    // Direct IO is attempted first, file systems like tmpfs which reject it
    // transparently fall back to buffered IO.
    let platform = OsPlatform::new();
    let dir = tempfile::tempdir()?;

    let profile = profile::get_by_name("SD-24bit");
    println!(
        "generating a {} frame of {} bytes",
        profile.name,
        profile::size_of(&profile)
    );
    let frame = Frame::generate(&platform, profile)?;

    let builder = framebench::builder().with_threads(2).with_frames(16);

    println!("writing frames to {}", dir.path().display());
    let written = builder.try_run_write(&platform, &frame, dir.path())?;
    drop(frame);

    // A read run sizes its frame after the first frame file it finds.
    let frame = tester::frame_for_read(&platform, dir.path(), 0)?;
    println!("detected profile {} for reading", frame.profile().name);

    let read = builder
        .with_access_mode(AccessMode::Random)
        .try_run_read(&platform, &frame, dir.path())?;

    assert_eq!(written.frames_completed, 16);
    assert_eq!(read.bytes_transferred, written.bytes_transferred);

    let options = ReportOptions {
        times: true,
        frame_times: false,
    };
    let mut stdout = io::stdout().lock();
    report::write_results(&mut stdout, "write", &options, &written)?;
    report::write_results(&mut stdout, "read", &options, &read)?;
    histogram::write_histogram(&mut stdout, &read)?;

    report::write_csv_header(&mut stdout, &options)?;
    for (case, result) in [("write", &written), ("read", &read)] {
        report::write_results_csv(&mut stdout, case, frame.profile().name, 2, &options, result)?;
    }

    print_files(dir.path())?;

    Ok(())
}

fn print_files(dir: &Path) -> io::Result<()> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(".tst") {
            count += 1;
        }
    }
    println!("{count} frame files left in {}", dir.display());
    Ok(())
}
