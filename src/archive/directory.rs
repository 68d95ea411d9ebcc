//! Reads the record count straight from an archive's end-of-central-directory.
//!
//! `ZipArchive` keys entries by name, so an archive that repeats a name shows
//! up with fewer entries than it really holds. Comparing against the raw
//! count exposes that before anything is rewritten.

use std::io::{self, Read, Seek, SeekFrom};

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_LEN: u64 = 22;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: u64 = 20;
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
const ZIP64_EOCD_LEN: usize = 56;
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

/// Total number of central directory records `reader` declares.
///
/// Returns `Ok(None)` when no end-of-central-directory record can be found;
/// the archive reader reports that case with a proper error of its own.
/// Leaves the stream position unspecified.
pub(super) fn central_directory_records<R: Read + Seek>(
    reader: &mut R,
) -> io::Result<Option<u64>> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < EOCD_LEN {
        return Ok(None);
    }

    let tail_len = file_len.min(EOCD_LEN + MAX_COMMENT_LEN);
    let tail_start = file_len - tail_len;
    reader.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; tail_len as usize];
    reader.read_exact(&mut tail)?;

    let Some(eocd) = find_eocd(&tail) else {
        return Ok(None);
    };
    let total = u16::from_le_bytes([tail[eocd + 10], tail[eocd + 11]]);
    if total != u16::MAX {
        return Ok(Some(u64::from(total)));
    }

    // 0xFFFF means the real count lives in the zip64 record
    let eocd_offset = tail_start + eocd as u64;
    match zip64_records(reader, eocd_offset)? {
        Some(count) => Ok(Some(count)),
        None => Ok(Some(u64::from(total))),
    }
}

/// Offset of the last end-of-central-directory record in `tail`.
///
/// Prefers a record whose comment length runs exactly to the end of the
/// file, so a signature inside a comment is not mistaken for the record.
fn find_eocd(tail: &[u8]) -> Option<usize> {
    let last_start = tail.len().checked_sub(EOCD_LEN as usize)?;
    let mut fallback = None;

    for start in (0..=last_start).rev() {
        if read_u32(tail, start) != Some(EOCD_SIGNATURE) {
            continue;
        }
        let comment_len = u16::from_le_bytes([tail[start + 20], tail[start + 21]]) as usize;
        if start + EOCD_LEN as usize + comment_len == tail.len() {
            return Some(start);
        }
        fallback.get_or_insert(start);
    }
    fallback
}

fn zip64_records<R: Read + Seek>(reader: &mut R, eocd_offset: u64) -> io::Result<Option<u64>> {
    let Some(locator_offset) = eocd_offset.checked_sub(ZIP64_LOCATOR_LEN) else {
        return Ok(None);
    };
    reader.seek(SeekFrom::Start(locator_offset))?;
    let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
    reader.read_exact(&mut locator)?;
    if read_u32(&locator, 0) != Some(ZIP64_LOCATOR_SIGNATURE) {
        return Ok(None);
    }
    let Some(record_offset) = read_u64(&locator, 8) else {
        return Ok(None);
    };

    reader.seek(SeekFrom::Start(record_offset))?;
    let mut record = [0u8; ZIP64_EOCD_LEN];
    if let Err(e) = reader.read_exact(&mut record) {
        return match e.kind() {
            io::ErrorKind::UnexpectedEof => Ok(None),
            _ => Err(e),
        };
    }
    if read_u32(&record, 0) != Some(ZIP64_EOCD_SIGNATURE) {
        return Ok(None);
    }
    Ok(read_u64(&record, 32))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(buf: &[u8], at: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn archive(names: &[&str], comment: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(name.as_bytes()).unwrap();
        }
        writer.set_comment(comment);
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_counts_records() {
        let bytes = archive(&["one", "two", "three"], "");
        let count = central_directory_records(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(count, Some(3));
    }

    #[test]
    fn test_comment_with_signature_is_skipped() {
        // Comment carries a fake end record claiming 9 entries
        let fake = "PK\u{5}\u{6}\0\0\0\0\u{9}\0\u{9}\0";
        let bytes = archive(&["only"], fake);
        let count = central_directory_records(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(count, Some(1));
    }

    #[test]
    fn test_not_an_archive() {
        let mut short = Cursor::new(b"PK\x03\x04".to_vec());
        assert_eq!(central_directory_records(&mut short).unwrap(), None);

        let mut plain = Cursor::new(vec![b'x'; 4096]);
        assert_eq!(central_directory_records(&mut plain).unwrap(), None);
    }

    #[test]
    fn test_empty_archive() {
        let bytes = archive(&[], "");
        let count = central_directory_records(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(count, Some(0));
    }
}
