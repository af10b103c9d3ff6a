//! End-to-end tests on real recording files

use std::path::{Path, PathBuf};

use stripdb::storage::{CompressionType, RecordingWriter};
use stripdb::{
    extract_mean, Archive, ArchiveConfig, Catalog, Channel, DataType, Detector, HkGroup,
    QueryError, TagRecord, TimeRange, TimeSeries,
};
use tempfile::tempdir;

const BASE: f64 = 59558.0; // 2021-12-10
const MINUTE: f64 = 1.0 / 1440.0;

fn q1() -> Channel {
    Channel::science("R0", DataType::Dem, Detector::Q1)
}

fn vd1() -> Channel {
    Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK")
}

/// A file with one sample per minute in `[start, start + minutes)`
fn write_file(path: &Path, start_minute: u32, minutes: u32, tags: &[TagRecord]) -> PathBuf {
    let times: Vec<f64> = (0..minutes)
        .map(|m| BASE + f64::from(start_minute + m) * MINUTE)
        .collect();
    let values: Vec<f64> = (0..minutes).map(|m| f64::from(start_minute + m)).collect();

    let mut writer = RecordingWriter::new(CompressionType::Lz4)
        .channel(&q1(), TimeSeries::new(times.clone(), values.clone()).unwrap())
        .channel(
            &vd1(),
            TimeSeries::new(times, values.iter().map(|v| v * 10.0).collect()).unwrap(),
        );
    for tag in tags {
        writer = writer.tag(tag.clone());
    }
    writer.write(path).unwrap();
    path.to_path_buf()
}

/// Three files: minutes [0, 60), [60, 120) and, after a gap, [180, 240)
fn create_archive(dir: &Path) {
    let at = |minute: f64| BASE + minute * MINUTE;

    write_file(
        &dir.join("2021_12_10/00-00-00.rec.lz4"),
        0,
        60,
        &[
            TagRecord::new(1, "TURNON", at(5.0), at(10.0)),
            TagRecord::new(2, "BIAS_SWEEP", at(50.0), -1.0).comments("VD1 sweep", ""),
        ],
    );
    write_file(
        &dir.join("2021_12_10/01-00-00.rec.lz4"),
        60,
        60,
        &[TagRecord::new(2, "BIAS_SWEEP", at(50.0), at(70.0)).comments("VD1 sweep", "done")],
    );
    write_file(
        &dir.join("2021_12_10/03-00-00.rec"),
        180,
        60,
        &[TagRecord::new(3, "STABILITY", at(185.0), at(230.0))],
    );
}

fn open(dir: &Path) -> Archive {
    Archive::open(&ArchiveConfig::for_dir(dir)).unwrap()
}

#[test]
fn test_build_and_query() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    let mut archive = open(dir.path());

    assert_eq!(archive.report().indexed, 3);
    assert_eq!(archive.files().len(), 3);
    assert_eq!(archive.catalog().tag_count().unwrap(), 3);

    let sweep = archive.tag(2).unwrap().unwrap();
    assert!(sweep.is_closed());
    assert_eq!(sweep.end_comment, "done");

    // Across the first file boundary
    let series = archive.load(&sweep, &q1()).unwrap().unwrap();
    let expected: Vec<f64> = (50..=70).map(f64::from).collect();
    assert_eq!(series.values, expected);

    // Across the gap
    let window = (BASE + 100.0 * MINUTE, BASE + 200.0 * MINUTE);
    let series = archive.load(window, &vd1()).unwrap().unwrap();
    assert_eq!(series.len(), 20 + 21);
    assert!(series.times.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(series.values.first(), Some(&1000.0));
    assert_eq!(series.values.last(), Some(&2000.0));

    // Inside the gap
    let gap = (BASE + 125.0 * MINUTE, BASE + 175.0 * MINUTE);
    assert!(archive.load(gap, &q1()).unwrap().is_none());
    assert!(archive.files_in_range(gap).unwrap().is_empty());
}

#[test]
fn test_tags_by_date() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    let archive = open(dir.path());

    let ids: Vec<i64> = archive
        .tags(("2021-12-10 00:00:00", "2021-12-10 01:05:00"))
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let all = archive.tags(("2021-12-10", "2021-12-11")).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].start <= w[1].start));
}

#[test]
fn test_reopen_does_not_rescan() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    let first = open(dir.path());
    let files = first.files().to_vec();
    first.close().unwrap();

    let archive = open(dir.path());
    assert_eq!(archive.report().indexed, 0);
    assert_eq!(archive.report().reused, 3);
    assert_eq!(archive.files(), files.as_slice());
}

#[test]
fn test_start_from_scratch() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    open(dir.path()).close().unwrap();

    assert!(Catalog::remove(dir.path(), "index.db").unwrap());
    let archive = open(dir.path());
    assert_eq!(archive.report().indexed, 3);
}

#[test]
fn test_unclosed_file_is_indexed_from_samples() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("live.rec");
    let times: Vec<f64> = (0..10).map(|m| BASE + f64::from(m) * MINUTE).collect();
    RecordingWriter::new(CompressionType::None)
        .channel(&vd1(), TimeSeries::new(times, vec![1.0; 10]).unwrap())
        .unclosed()
        .write(&path)
        .unwrap();

    let archive = open(dir.path());
    assert_eq!(archive.files().len(), 1);
    assert_eq!(archive.files()[0].start(), BASE);
    assert_eq!(archive.files()[0].end(), BASE + 9.0 * MINUTE);
}

#[test]
fn test_corrupt_file_does_not_break_archive() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    std::fs::write(dir.path().join("2021_12_10/02-00-00.rec.lz4"), vec![0u8; 200]).unwrap();

    let mut archive = open(dir.path());
    assert_eq!(archive.report().skipped, 1);
    assert_eq!(archive.files().len(), 3);
    assert!(archive
        .load((BASE, BASE + 240.0 * MINUTE), &q1())
        .unwrap()
        .is_some());
}

#[test]
fn test_missing_channel() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    let mut archive = open(dir.path());

    let q2 = Channel::science("R0", DataType::Dem, Detector::Q2);
    let result = archive.load((BASE, BASE + 240.0 * MINUTE), &q2);
    assert!(matches!(result, Err(QueryError::ChannelNotFound { .. })));
}

#[test]
fn test_mean_over_tag() {
    let dir = tempdir().unwrap();
    create_archive(dir.path());
    let mut archive = open(dir.path());

    let turnon = archive.tag(1).unwrap().unwrap();
    let series = archive.load(&turnon, &vd1()).unwrap().unwrap();
    let range = TimeRange::try_from(&turnon).unwrap();
    // Minutes 5 to 10, times ten
    assert_eq!(extract_mean(&series, &range), Some(75.0));
}
