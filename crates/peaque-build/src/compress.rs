//! Pre-compression of the asset directory.
//!
//! Every file gains `.gz` and `.br` siblings whose mtime matches the
//! source file, so a rerun skips everything that is already current.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use peaque_fs::FileSystem;

use crate::BuildResult;

const COMPRESSED_SUFFIXES: [&str; 2] = ["gz", "br"];

/// Compress every file under `dir`, writing `<f>.gz` and `<f>.br`
/// siblings. Sibling write failures are transient: logged, skipped, and
/// the pass continues.
pub fn precompress_dir(fs: &dyn FileSystem, dir: &Path) -> BuildResult<usize> {
    let mut written = 0;
    for file in peaque_fs::walk_files(fs, dir)? {
        let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("");
        if COMPRESSED_SUFFIXES.contains(&extension) {
            continue;
        }
        let stat = fs.stat(&file)?;
        let mut contents: Option<Vec<u8>> = None;

        for suffix in COMPRESSED_SUFFIXES {
            let sibling = sibling_path(&file, suffix);
            // mtime equal to the source means the sibling is current.
            if let Ok(existing) = fs.stat(&sibling) {
                if existing.modified == stat.modified {
                    continue;
                }
            }
            let bytes = match &contents {
                Some(bytes) => bytes,
                None => {
                    contents = Some(fs.read(&file)?);
                    contents.as_ref().expect("just set")
                }
            };
            let compressed = match suffix {
                "gz" => gzip(bytes),
                _ => brotli_bytes(bytes),
            };
            let compressed = match compressed {
                Ok(compressed) => compressed,
                Err(err) => {
                    warn!(path = %file.display(), suffix, %err, "compression failed, skipping sibling");
                    continue;
                }
            };
            if let Err(err) = fs.write(&sibling, &compressed) {
                warn!(path = %sibling.display(), %err, "failed to write compressed sibling");
                continue;
            }
            if let Err(err) = fs.set_file_times(&sibling, stat.modified, stat.modified) {
                warn!(path = %sibling.display(), %err, "failed to stamp compressed sibling");
            }
            written += 1;
        }
    }
    Ok(written)
}

fn sibling_path(file: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(format!(".{suffix}"));
    std::path::PathBuf::from(name)
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn brotli_bytes(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 9, 22);
        writer.write_all(bytes)?;
    }
    Ok(out)
}
