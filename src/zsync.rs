//! zsync control file generation.
//!
//! A `.zsync` file lets update clients download only the blocks of a new
//! AppImage that differ from what they already have. It holds a short text
//! header followed by one record per block:
//! - the trailing `rsum_bytes` of the block's rolling checksum (`a`, `b`,
//!   big-endian 16-bit each)
//! - the first `checksum_bytes` of the block's MD4
//!
//! The last block is zero-padded to the block size before hashing. Hash
//! lengths follow the zsyncmake heuristics so the output is interchangeable
//! with files produced by the reference tool.

use anyhow::{Context, Result};
use md4::Md4;
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

/// Suffix appended to the artifact file name.
pub const ZSYNC_SUFFIX: &str = ".zsync";

/// Format version written in the header.
pub const ZSYNC_VERSION: &str = "0.6.2";

/// Files at least this large get the bigger default block size.
const LARGE_FILE_THRESHOLD: u64 = 100_000_000;

const MD4_LEN: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct ZsyncOptions {
    /// Block size in bytes; 0 picks one from the file size.
    pub block_size: u64,
    /// `URL:` header; defaults to the artifact file name.
    pub url: Option<String>,
}

/// Per-record byte counts, as in the `Hash-Lengths:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashLengths {
    pub seq_matches: u8,
    pub rsum_bytes: u8,
    pub checksum_bytes: u8,
}

#[derive(Debug, Clone)]
pub struct ZsyncSummary {
    pub path: PathBuf,
    pub length: u64,
    pub block_size: u64,
    pub blocks: u64,
    pub hash_lengths: HashLengths,
    pub sha1: String,
}

/// `<artifact>.zsync` next to the artifact.
pub fn zsync_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(ZSYNC_SUFFIX);
    PathBuf::from(name)
}

pub fn default_block_size(len: u64) -> u64 {
    if len < LARGE_FILE_THRESHOLD {
        2048
    } else {
        4096
    }
}

/// zsyncmake's choice of hash lengths for a file of `len` bytes.
pub fn hash_lengths(len: u64, block_size: u64) -> HashLengths {
    let seq_matches: u8 = if len > block_size { 2 } else { 1 };
    let seq = f64::from(seq_matches);
    let len_f = len as f64;
    let bs_f = block_size as f64;
    let blocks_f = (1 + len / block_size) as f64;

    let rsum = (((len_f.ln() + bs_f.ln()) / 2f64.ln() - 8.6) / seq / 8.0).ceil();
    let rsum_bytes = rsum.clamp(2.0, 4.0) as u8;

    let checksum = ((20.0 + (len_f.ln() + blocks_f.ln()) / 2f64.ln()) / seq / 8.0).ceil();
    let floor = ((7.9 + (20.0 + blocks_f.ln() / 2f64.ln())) / 8.0) as u8;
    let checksum_bytes = (checksum.max(0.0) as u8).max(floor).min(MD4_LEN as u8);

    HashLengths {
        seq_matches,
        rsum_bytes,
        checksum_bytes,
    }
}

/// Rolling checksum of one (padded) block.
pub fn rsum(block: &[u8]) -> (u16, u16) {
    let mut a: u16 = 0;
    let mut b: u16 = 0;
    let mut weight = block.len();
    for &byte in block {
        a = a.wrapping_add(u16::from(byte));
        b = b.wrapping_add((weight as u16).wrapping_mul(u16::from(byte)));
        weight -= 1;
    }
    (a, b)
}

/// Write the zsync file for `artifact` to `output`.
pub fn make_zsync(artifact: &Path, output: &Path, options: &ZsyncOptions) -> Result<ZsyncSummary> {
    let metadata = fs::metadata(artifact)
        .with_context(|| format!("reading metadata of {}", artifact.display()))?;
    let length = metadata.len();
    let block_size = match options.block_size {
        0 => default_block_size(length),
        n => n,
    };
    let mtime = OffsetDateTime::from(
        metadata
            .modified()
            .with_context(|| format!("reading mtime of {}", artifact.display()))?,
    );

    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", artifact.display()))?;
    let url = options.url.clone().unwrap_or_else(|| file_name.clone());

    let mut reader = BufReader::new(
        File::open(artifact).with_context(|| format!("opening {}", artifact.display()))?,
    );
    let mut sha1 = Sha1::new();
    let mut records: Vec<([u8; 4], [u8; MD4_LEN])> = Vec::new();
    let mut block = vec![0u8; block_size as usize];

    loop {
        let n = read_block(&mut reader, &mut block)
            .with_context(|| format!("reading {}", artifact.display()))?;
        if n == 0 {
            break;
        }
        sha1.update(&block[..n]);
        block[n..].fill(0);

        let (a, b) = rsum(&block);
        let mut weak = [0u8; 4];
        weak[..2].copy_from_slice(&a.to_be_bytes());
        weak[2..].copy_from_slice(&b.to_be_bytes());
        let mut strong = [0u8; MD4_LEN];
        strong.copy_from_slice(&Md4::digest(&block));
        records.push((weak, strong));

        if n < block.len() {
            break;
        }
    }

    let sha1 = format!("{:x}", sha1.finalize());
    let lengths = hash_lengths(length, block_size);

    let mut out = BufWriter::new(
        File::create(output).with_context(|| format!("creating {}", output.display()))?,
    );
    write!(
        out,
        "zsync: {}\nFilename: {}\nMTime: {}\nBlocksize: {}\nLength: {}\nHash-Lengths: {},{},{}\nURL: {}\nSHA-1: {}\n\n",
        ZSYNC_VERSION,
        file_name,
        mtime.format(&Rfc2822)?,
        block_size,
        length,
        lengths.seq_matches,
        lengths.rsum_bytes,
        lengths.checksum_bytes,
        url,
        sha1
    )?;
    for (weak, strong) in &records {
        out.write_all(&weak[4 - lengths.rsum_bytes as usize..])?;
        out.write_all(&strong[..lengths.checksum_bytes as usize])?;
    }
    out.flush()
        .with_context(|| format!("writing {}", output.display()))?;

    Ok(ZsyncSummary {
        path: output.to_path_buf(),
        length,
        block_size,
        blocks: records.len() as u64,
        hash_lengths: lengths,
        sha1,
    })
}

/// Fill `buf` as far as the reader allows; returns the byte count.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
