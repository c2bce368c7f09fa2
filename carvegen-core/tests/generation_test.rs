use std::fs;
use std::path::Path;

use carvegen_core::config::Definitions;
use carvegen_core::content::sha256_hex;
use carvegen_core::controller::PipelineController;
use carvegen_core::harvest::FileHarvester;
use carvegen_core::sampler::{DiskImageSampler, IMAGE_DIR, IMAGE_FILE, TRUTH_MAP_FILE};
use serde_json::json;

struct Record {
    index: usize,
    size: usize,
    offset: usize,
    filename: String,
    sha256: String,
}

fn read_truth_map(image_dir: &Path) -> Vec<Record> {
    let raw = fs::read_to_string(image_dir.join(TRUTH_MAP_FILE)).expect("truth map readable");
    let mut lines = raw.lines();
    assert_eq!(
        lines.next(),
        Some("Number,\tSize,\tChunk Offset,\tFile,\tSHA-256 Hash")
    );
    assert_eq!(lines.next(), Some(""));
    lines
        .map(|line| {
            let fields: Vec<&str> = line.split(",\t").collect();
            assert_eq!(fields.len(), 5, "malformed record: {line}");
            Record {
                index: fields[0].parse().unwrap(),
                size: fields[1].strip_suffix(" B").unwrap().parse().unwrap(),
                offset: fields[2].parse().unwrap(),
                filename: fields[3].to_string(),
                sha256: fields[4].to_string(),
            }
        })
        .collect()
}

fn assert_records_extractable(image: &[u8], records: &[Record]) {
    for record in records {
        let carved = &image[record.offset..record.offset + record.size];
        assert_eq!(
            sha256_hex(carved),
            record.sha256,
            "bytes at offset {} do not match the recorded digest of {}_{}",
            record.offset,
            record.filename,
            record.index
        );
    }
}

fn assert_no_overlap(records: &[Record], image_size: usize) {
    let mut intervals: Vec<(usize, usize)> = records
        .iter()
        .map(|r| (r.offset, r.offset + r.size))
        .collect();
    intervals.sort();
    for window in intervals.windows(2) {
        assert!(
            window[0].1 <= window[1].0,
            "placed intervals overlap: {:?}",
            window
        );
    }
    if let Some(last) = intervals.last() {
        assert!(last.1 <= image_size);
    }
}

fn jpeg_file(len: usize, fill: u8) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0];
    bytes.resize(len, fill);
    bytes
}

fn elf_file(len: usize, fill: u8) -> Vec<u8> {
    let mut bytes = vec![0x7f, b'E', b'L', b'F', 0x02, 0x01, 0x01, 0x00];
    bytes.resize(len, fill);
    bytes
}

fn run_pipelines(source: &Path, contents: &Path, defs: &Definitions) {
    let controller = PipelineController::new(
        FileHarvester::new(source),
        defs.harvester.clone(),
        defs.pipelines.clone(),
        contents,
    )
    .expect("controller construction");
    controller.run().expect("processing phase");
}

#[test]
fn jpeg_corpus_round_trips_through_image_and_truth_map() {
    let source = tempfile::tempdir().unwrap();
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(source.path().join("holiday.jpg"), jpeg_file(2500, 0x21)).unwrap();

    let defs: Definitions = serde_json::from_value(json!({
        "harvester": ["JPEG"],
        "pipelines": [
            { "stages": [
                { "FileJPEG": [] },
                { "HeaderJPEG": [] },
                { "Split": [1000] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]}
        ],
        "sampler": { "size": [1], "merge": [false] }
    }))
    .unwrap();
    run_pipelines(source.path(), contents.path(), &defs);

    // 2500 bytes minus the 100-byte header: 1000 + 1000 + 400.
    let sizes: Vec<usize> = (1..=3)
        .map(|i| {
            fs::read(contents.path().join(format!("holiday.jpg_{i}")))
                .unwrap()
                .len()
        })
        .collect();
    assert_eq!(sizes, vec![1000, 1000, 400]);
    assert!(!contents.path().join("holiday.jpg_4").exists());

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), false).unwrap();
    sampler.generate_image().unwrap();
    sampler.fill_truth_map().unwrap();

    let image_dir = out.path().join(IMAGE_DIR);
    let image = fs::read(image_dir.join(IMAGE_FILE)).unwrap();
    assert_eq!(image.len(), 1_000_000);

    let records = read_truth_map(&image_dir);
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().map(|r| r.size).sum::<usize>(), 2400);
    assert!(records.windows(2).all(|w| w[0].offset < w[1].offset));
    assert_no_overlap(&records, image.len());
    assert_records_extractable(&image, &records);
}

#[test]
fn merge_mode_keeps_each_file_contiguous() {
    let source = tempfile::tempdir().unwrap();
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(source.path().join("one.jpg"), jpeg_file(300, 0x41)).unwrap();
    fs::write(source.path().join("two.jpg"), jpeg_file(300, 0x42)).unwrap();

    let defs: Definitions = serde_json::from_value(json!({
        "harvester": ["JPEG"],
        "pipelines": [
            { "stages": [
                { "FileJPEG": [] },
                { "Split": [100] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]}
        ],
        "sampler": { "size": [1], "merge": [true] }
    }))
    .unwrap();
    run_pipelines(source.path(), contents.path(), &defs);

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), true).unwrap();
    sampler.generate_image().unwrap();
    sampler.fill_truth_map().unwrap();

    let image_dir = out.path().join(IMAGE_DIR);
    let image = fs::read(image_dir.join(IMAGE_FILE)).unwrap();
    let records = read_truth_map(&image_dir);
    assert_eq!(records.len(), 6);
    assert_no_overlap(&records, image.len());
    assert_records_extractable(&image, &records);

    // Within each file, consecutive chunks must sit back to back.
    for name in ["one.jpg", "two.jpg"] {
        let mut chunks: Vec<&Record> =
            records.iter().filter(|r| r.filename == name).collect();
        chunks.sort_by_key(|r| r.index);
        assert_eq!(chunks.len(), 3);
        for window in chunks.windows(2) {
            assert_eq!(window[1].offset, window[0].offset + window[0].size);
        }
    }
}

#[test]
fn noise_stage_stamps_zeroes_through_the_carved_bytes() {
    let source = tempfile::tempdir().unwrap();
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(source.path().join("noisy.jpg"), jpeg_file(1000, 0x5a)).unwrap();

    let defs: Definitions = serde_json::from_value(json!({
        "harvester": ["JPEG"],
        "pipelines": [
            { "stages": [
                { "FileJPEG": [] },
                { "Noise": [10] },
                { "Split": [500] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]}
        ],
        "sampler": { "size": [1], "merge": [true] }
    }))
    .unwrap();
    run_pipelines(source.path(), contents.path(), &defs);

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), true).unwrap();
    sampler.generate_image().unwrap();
    sampler.fill_truth_map().unwrap();

    let image_dir = out.path().join(IMAGE_DIR);
    let image = fs::read(image_dir.join(IMAGE_FILE)).unwrap();
    let mut records = read_truth_map(&image_dir);
    records.sort_by_key(|r| r.index);
    assert_eq!(records.iter().map(|r| r.size).collect::<Vec<_>>(), vec![500, 500]);
    assert_records_extractable(&image, &records);

    let mut carved = Vec::new();
    for record in &records {
        carved.extend_from_slice(&image[record.offset..record.offset + record.size]);
    }
    for (i, byte) in carved.iter().enumerate() {
        if i % 10 == 9 {
            assert_eq!(*byte, 0, "byte {i} should have been stamped");
        }
    }
}

#[test]
fn mixed_corpus_feeds_parallel_typed_pipelines() {
    let source = tempfile::tempdir().unwrap();
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(source.path().join("photo.jpg"), jpeg_file(450, 0x21)).unwrap();
    fs::write(source.path().join("binary"), elf_file(350, 0x22)).unwrap();

    let defs: Definitions = serde_json::from_value(json!({
        "harvester": ["JPEG", "ELF"],
        "pipelines": [
            { "stages": [
                { "FileJPEG": [] },
                { "Split": [200] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]},
            { "stages": [
                { "FileELF": [] },
                { "Split": [128] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]}
        ],
        "sampler": { "size": [1], "merge": [false] }
    }))
    .unwrap();
    run_pipelines(source.path(), contents.path(), &defs);

    // Each file's artifacts follow the chunk size of its own pipeline.
    assert_eq!(
        fs::read(contents.path().join("photo.jpg_1")).unwrap().len(),
        200
    );
    assert_eq!(fs::read(contents.path().join("binary_1")).unwrap().len(), 128);

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), false).unwrap();
    sampler.generate_image().unwrap();
    sampler.fill_truth_map().unwrap();

    let image_dir = out.path().join(IMAGE_DIR);
    let image = fs::read(image_dir.join(IMAGE_FILE)).unwrap();
    let records = read_truth_map(&image_dir);
    // 450 / 200 -> 3 chunks, 350 / 128 -> 3 chunks.
    assert_eq!(records.len(), 6);
    assert_eq!(records.iter().filter(|r| r.filename == "photo.jpg").count(), 3);
    assert_eq!(records.iter().filter(|r| r.filename == "binary").count(), 3);
    assert_no_overlap(&records, image.len());
    assert_records_extractable(&image, &records);
}

#[test]
fn oversized_corpus_refuses_without_leaving_output() {
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::create_dir_all(contents.path().join("SHA-256 hashes")).unwrap();
    let chunk = vec![0u8; 2_000_000];
    fs::write(contents.path().join("huge.bin_1"), &chunk).unwrap();
    fs::write(
        contents.path().join("SHA-256 hashes").join("huge.bin.txt"),
        format!("{}\n", sha256_hex(&chunk)),
    )
    .unwrap();

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), false).unwrap();
    let err = sampler.generate_image().unwrap_err();
    assert!(err.to_string().contains("2.0"), "got: {err}");
    assert!(!out.path().join(IMAGE_DIR).exists());
}

#[test]
fn empty_corpus_yields_noise_image_and_bare_truth_map() {
    let source = tempfile::tempdir().unwrap();
    let contents = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let defs: Definitions = serde_json::from_value(json!({
        "harvester": ["JPEG"],
        "pipelines": [
            { "stages": [
                { "FileJPEG": [] },
                { "Split": [1000] },
                { "SaveHashes": [] },
                { "DiskImage": [] }
            ]}
        ],
        "sampler": { "size": [1], "merge": [false] }
    }))
    .unwrap();
    run_pipelines(source.path(), contents.path(), &defs);

    let mut sampler = DiskImageSampler::new(1, contents.path(), out.path(), false).unwrap();
    sampler.generate_image().unwrap();
    sampler.fill_truth_map().unwrap();

    let image_dir = out.path().join(IMAGE_DIR);
    assert_eq!(fs::read(image_dir.join(IMAGE_FILE)).unwrap().len(), 1_000_000);
    assert!(read_truth_map(&image_dir).is_empty());
}
