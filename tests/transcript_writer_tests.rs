// Integration tests for the session transcript writer
//
// These tests verify the file format contract (header, line format,
// footer) and that concurrent writers never interleave lines.

use anyhow::Result;
use meet_scribe::transcript::TranscriptWriter;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn body_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .filter(|line| line.starts_with("- [") && line.contains("] [Mic"))
        .collect()
}

#[test]
fn test_header_lines_and_footer_format() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = TranscriptWriter::create(
        dir.path(),
        &[
            "Mic1 (USB Microphone)".to_string(),
            "Mic2 (Webcam)".to_string(),
        ],
    )?;

    writer.append("Mic1", "bom dia a todos")?;
    writer.append("Mic2", "vamos começar")?;
    writer.finalize()?;

    assert_eq!(writer.lines_written(), 2);

    let content = fs::read_to_string(writer.path())?;
    let lines: Vec<&str> = content.lines().collect();

    assert_eq!(lines[0], "# Meeting Transcript");
    assert!(lines[1].starts_with("- Started: "));
    assert_eq!(lines[2], "- Devices: Mic1 (USB Microphone), Mic2 (Webcam)");
    assert_eq!(lines[3], "");

    // - [HH:MM:SS] [Mic{n}] {text}
    assert!(lines[4].starts_with("- ["));
    assert!(lines[4].contains("] [Mic1] bom dia a todos"));
    assert!(lines[5].contains("] [Mic2] vamos começar"));

    assert!(content.contains("\n- Ended: "));
    assert!(content.contains("\n- Duration: 00:00:0"));

    Ok(())
}

#[test]
fn test_transcript_filename_shape() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = TranscriptWriter::create(dir.path(), &["Mic1 (Test)".to_string()])?;

    let name = writer.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("_transcript.md"));

    Ok(())
}

#[test]
fn test_concurrent_writers_never_interleave_lines() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = Arc::new(TranscriptWriter::create(
        dir.path(),
        &["Mic1 (A)".to_string(), "Mic2 (B)".to_string()],
    )?);

    let threads = 8;
    let lines_per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                let label = format!("Mic{}", t % 2 + 1);
                for j in 0..lines_per_thread {
                    writer.append(&label, &format!("worker {} line {}", t, j)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    writer.finalize()?;

    let content = fs::read_to_string(writer.path())?;
    let body = body_lines(&content);

    // Exactly one well-formed line per append, nothing torn or merged
    assert_eq!(body.len(), threads * lines_per_thread);
    for t in 0..threads {
        for j in 0..lines_per_thread {
            let needle = format!("worker {} line {}", t, j);
            let count = body.iter().filter(|line| line.ends_with(&needle)).count();
            assert_eq!(count, 1, "expected exactly one line for {:?}", needle);
        }
    }

    Ok(())
}

#[test]
fn test_embedded_newlines_are_flattened() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = TranscriptWriter::create(dir.path(), &["Mic1 (Test)".to_string()])?;

    writer.append("Mic1", "first\nsecond\rthird")?;
    writer.finalize()?;

    let content = fs::read_to_string(writer.path())?;
    let body = body_lines(&content);

    assert_eq!(body.len(), 1);
    assert!(body[0].ends_with("first second third"));

    Ok(())
}

#[test]
fn test_append_after_finalize_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = TranscriptWriter::create(dir.path(), &["Mic1 (Test)".to_string()])?;

    writer.finalize()?;
    assert!(writer.append("Mic1", "too late").is_err());

    // A second finalize is a harmless no-op
    writer.finalize()?;

    Ok(())
}

#[test]
fn test_file_without_footer_is_still_valid() -> Result<()> {
    let dir = TempDir::new()?;
    let path = {
        let writer = TranscriptWriter::create(dir.path(), &["Mic1 (Test)".to_string()])?;
        writer.append("Mic1", "still here")?;
        writer.path().to_path_buf()
        // Dropped without finalize, as if the process died
    };

    let content = fs::read_to_string(path)?;
    assert!(content.starts_with("# Meeting Transcript"));
    assert_eq!(body_lines(&content).len(), 1);
    assert!(!content.contains("- Ended: "));

    Ok(())
}

#[test]
fn test_creates_missing_output_directory() -> Result<()> {
    let dir = TempDir::new()?;
    let nested = dir.path().join("meet_audio").join("transcript");

    let writer = TranscriptWriter::create(&nested, &["Mic1 (Test)".to_string()])?;

    assert!(writer.path().exists());
    assert!(writer.path().starts_with(&nested));

    Ok(())
}
