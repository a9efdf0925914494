use std::fs;
use std::io::Read;
use std::sync::Arc;

use tempfile::{TempDir, tempdir};

use super::*;
use crate::bundle::{BundleReader, BundleStream, PixelFormat};
use crate::codec::{DecodedImage, RawFrame};

/// Decoder for text fixtures: one `width height fill duration` line per
/// frame, or `fail` to simulate a broken source.
struct FixtureDecoder;

impl Decoder for FixtureDecoder {
    fn supports(&self, path: &Path) -> bool {
        path.extension().is_some_and(|e| e == "png" || e == "gif")
    }

    fn decode(&self, path: &Path) -> Result<DecodedImage, CodecError> {
        let text = fs::read_to_string(path).map_err(|e| CodecError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut frames = Vec::new();
        for line in text.lines() {
            let fields: Vec<u32> = line
                .split_whitespace()
                .map(|f| f.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| CodecError::Decode {
                    path: path.display().to_string(),
                    reason: format!("bad fixture line {line:?}"),
                })?;
            let [width, height, fill, duration] = fields[..] else {
                return Err(CodecError::Decode {
                    path: path.display().to_string(),
                    reason: "expected four fields".into(),
                });
            };
            let pixels = vec![fill as u8; (width * height * 4) as usize];
            frames.push(RawFrame::rgba(width, height, pixels).with_duration(duration));
        }
        Ok(DecodedImage {
            frames,
            loop_count: 0,
        })
    }
}

/// Pretends every input compresses to exactly half its size.
struct HalvingCompressor;

impl ByteCompressor for HalvingCompressor {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(input[..input.len() / 2].to_vec())
    }

    fn decompress(&self, _: &[u8], _: usize) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Decompress("not invertible".into()))
    }
}

fn fixture_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn packer(config: PackerConfig) -> Packer {
    Packer::new(config)
        .unwrap()
        .with_decoder(Box::new(FixtureDecoder))
}

fn read_entry(reader: &Arc<BundleReader>, path: &str) -> Vec<u8> {
    let entry = reader.entry(path).unwrap().clone();
    let mut stream = BundleStream::new(reader.clone(), entry);
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_duplicate_images_share_payload() {
    let src = fixture_dir(&[("a.png", "64 64 9 0"), ("b.png", "64 64 9 0")]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("dupes.xbt");

    let packer = packer(PackerConfig {
        dedup: true,
        ..Default::default()
    })
    .with_compressor(Box::new(HalvingCompressor));
    let stats = packer.build(src.path(), &bundle).unwrap();

    assert_eq!(stats.entries, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.payload_bytes, 8192);

    let reader = BundleReader::open(&bundle).unwrap();
    let a = reader.entry("a.png").unwrap();
    let b = reader.entry("b.png").unwrap();
    assert_eq!(a.frames[0].unpacked_size, 16384);
    assert_eq!(a.frames[0].packed_size, 8192);
    assert_eq!(a.frames, b.frames);

    let header = crate::bundle::header_size(reader.entries());
    assert_eq!(fs::metadata(&bundle).unwrap().len(), header + 8192);
}

#[test]
fn test_duplicate_keeps_own_durations() {
    let src = fixture_dir(&[
        ("a.gif", "1 1 1 10\n1 1 2 10"),
        ("b.gif", "1 1 1 500\n1 1 2 900"),
    ]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("timing.xbt");

    let stats = packer(PackerConfig {
        dedup: true,
        ..Default::default()
    })
    .build(src.path(), &bundle)
    .unwrap();
    assert_eq!(stats.duplicates, 1);

    let reader = Arc::new(BundleReader::open(&bundle).unwrap());
    let a = reader.entry("a.gif").unwrap().clone();
    let b = reader.entry("b.gif").unwrap().clone();
    let durations = |e: &Entry| e.frames.iter().map(|f| f.duration).collect::<Vec<_>>();
    assert_eq!(durations(&a), [10, 10]);
    assert_eq!(durations(&b), [500, 900]);
    for (fa, fb) in a.frames.iter().zip(&b.frames) {
        assert_eq!(fa.offset, fb.offset);
        assert_eq!(fa.packed_size, fb.packed_size);
    }

    let expected = [1u8, 1, 1, 1, 2, 2, 2, 2];
    assert_eq!(read_entry(&reader, "a.gif"), expected);
    assert_eq!(read_entry(&reader, "b.gif"), expected);
}

#[test]
fn test_without_dedup_payload_is_stored_twice() {
    let src = fixture_dir(&[("a.png", "8 8 1 0"), ("b.png", "8 8 1 0")]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("plain.xbt");

    let stats = packer(PackerConfig {
        compress: false,
        ..Default::default()
    })
    .build(src.path(), &bundle)
    .unwrap();
    assert_eq!(stats.duplicates, 0);
    assert_eq!(stats.payload_bytes, 2 * 8 * 8 * 4);

    let reader = BundleReader::open(&bundle).unwrap();
    let a = reader.entry("a.png").unwrap().frames[0];
    let b = reader.entry("b.png").unwrap().frames[0];
    assert_ne!(a.offset, b.offset);
    assert_eq!(a.packed_size, a.unpacked_size);
}

#[test]
fn test_roundtrip_through_stream() {
    let src = fixture_dir(&[
        ("ui/Button.png", "4 4 200 0"),
        ("anim/spin.gif", "2 2 10 40\n2 2 20 80\n2 2 30 120"),
        ("ui/same.png", "4 4 200 0"),
    ]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("skin.xbt");

    let stats = packer(PackerConfig {
        dedup: true,
        ..Default::default()
    })
    .build(src.path(), &bundle)
    .unwrap();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.frames, 5);

    let reader = Arc::new(BundleReader::open(&bundle).unwrap());
    let paths: Vec<&str> = reader.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["anim/spin.gif", "ui/button.png", "ui/same.png"]);

    let spin = reader.entry("anim/spin.gif").unwrap();
    let durations: Vec<u32> = spin.frames.iter().map(|f| f.duration).collect();
    assert_eq!(durations, [40, 80, 120]);
    assert_eq!(spin.frames[0].format.base(), Some(PixelFormat::A8R8G8B8));
    assert!(!spin.frames[0].format.is_opaque());

    let mut expected = vec![10u8; 16];
    expected.extend(vec![20u8; 16]);
    expected.extend(vec![30u8; 16]);
    assert_eq!(read_entry(&reader, "anim/spin.gif"), expected);
    assert_eq!(read_entry(&reader, "UI/BUTTON.PNG"), vec![200u8; 64]);
    assert_eq!(read_entry(&reader, "ui/same.png"), vec![200u8; 64]);

    for entry in reader.entries() {
        for frame in &entry.frames {
            assert!(frame.packed_size <= frame.unpacked_size);
        }
    }
}

#[test]
fn test_family_substitution_priority() {
    let src = fixture_dir(&[
        ("button.png", "2 2 1 0"),
        ("button.dxt.png", "2 2 2 0"),
        ("button.astc.png", "2 2 3 0"),
        ("icon.dxt.png", "2 2 4 0"),
        ("logo.etc.png", "2 2 5 0"),
    ]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("families.xbt");

    let config = PackerConfig {
        compress: false,
        families: vec![TextureFamily::new("dxt", 10), TextureFamily::new("astc", 30)],
        ..Default::default()
    };
    packer(config).build(src.path(), &bundle).unwrap();

    let reader = Arc::new(BundleReader::open(&bundle).unwrap());
    let paths: Vec<&str> = reader.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["button.png", "icon.png", "logo.etc.png"]);

    // astc outranks dxt, which outranks the plain source.
    assert_eq!(read_entry(&reader, "button.png"), vec![3u8; 16]);
    // A variant without a canonical source still lands on the canonical path.
    assert_eq!(read_entry(&reader, "icon.png"), vec![4u8; 16]);
}

#[test]
fn test_later_higher_priority_replaces_source() {
    let src = fixture_dir(&[
        ("a.dxt.png", "1 1 1 0"),
        ("a.etc.png", "1 1 2 0"),
        ("b.png", "1 1 3 0"),
        ("b.zz.png", "1 1 4 0"),
    ]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("replace.xbt");

    let config = PackerConfig {
        families: vec![
            TextureFamily::new("dxt", 10),
            TextureFamily::new("etc", 20),
            TextureFamily::new("zz", 5),
        ],
        ..Default::default()
    };
    let stats = packer(config).build(src.path(), &bundle).unwrap();
    assert_eq!(stats.entries, 2);

    let reader = Arc::new(BundleReader::open(&bundle).unwrap());
    let paths: Vec<&str> = reader.entries().iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["a.png", "b.png"]);

    // Both winners are visited after the source they replace.
    assert_eq!(read_entry(&reader, "a.png"), vec![2u8; 4]);
    assert_eq!(read_entry(&reader, "b.png"), vec![4u8; 4]);
}

#[test]
fn test_equal_priority_keeps_first() {
    let src = fixture_dir(&[("tile.aa.png", "1 1 7 0"), ("tile.bb.png", "1 1 8 0")]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("tie.xbt");

    let config = PackerConfig {
        families: vec![TextureFamily::new("bb", 5), TextureFamily::new("aa", 5)],
        ..Default::default()
    };
    packer(config).build(src.path(), &bundle).unwrap();

    let reader = Arc::new(BundleReader::open(&bundle).unwrap());
    assert_eq!(reader.entries().len(), 1);
    assert_eq!(read_entry(&reader, "tile.png"), vec![7u8; 4]);
}

#[test]
fn test_bad_assets_are_skipped() {
    let src = fixture_dir(&[
        ("broken.png", "fail"),
        ("empty.png", ""),
        ("long.gif", "1 1 1 10\n1 1 2 10\n1 1 3 10"),
        ("good.png", "2 2 5 0"),
        ("notes.txt", "ignored"),
    ]);
    let out = tempdir().unwrap();
    let bundle = out.path().join("skips.xbt");

    let stats = packer(PackerConfig {
        max_animation_frames: 2,
        ..Default::default()
    })
    .build(src.path(), &bundle)
    .unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.skipped, 3);

    let reader = BundleReader::open(&bundle).unwrap();
    assert_eq!(reader.entries().len(), 1);
    assert!(reader.entry("good.png").is_some());
}

#[test]
fn test_empty_input_writes_empty_bundle() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let bundle = out.path().join("empty.xbt");

    let stats = packer(PackerConfig::default())
        .build(src.path(), &bundle)
        .unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(fs::metadata(&bundle).unwrap().len(), 9);
    assert!(BundleReader::open(&bundle).unwrap().entries().is_empty());
}

#[test]
fn test_unwritable_output_is_fatal() {
    let src = fixture_dir(&[("a.png", "1 1 1 0")]);
    let bundle = src.path().join("missing-dir").join("out.xbt");

    let result = packer(PackerConfig::default()).build(src.path(), &bundle);
    assert!(matches!(result, Err(BuildError::Bundle(_))));
    assert!(!bundle.exists());
}

#[test]
fn test_missing_input_is_fatal() {
    let out = tempdir().unwrap();
    let result = packer(PackerConfig::default())
        .build(&out.path().join("nope"), &out.path().join("x.xbt"));
    assert!(matches!(result, Err(BuildError::Walk(_))));
}

#[test]
fn test_collect_sources_relative_paths() {
    let src = fixture_dir(&[("b/c.png", ""), ("a.png", ""), ("b/a.gif", "")]);
    let sources = packer(PackerConfig::default())
        .collect_sources(src.path())
        .unwrap();
    let relative: Vec<&str> = sources.iter().map(|(r, _)| r.as_str()).collect();
    assert_eq!(relative, ["a.png", "b/a.gif", "b/c.png"]);
    assert!(sources.iter().all(|(_, p)| p.starts_with(src.path())));
}
