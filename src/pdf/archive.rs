//! Zip packaging of multi-file results

use crate::error::Result;
use crate::pdf::library::{ArchiveEntry, ArchiveWriter};
use std::io::{Cursor, Write};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// zip-backed [`ArchiveWriter`] using deflate
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl ArchiveWriter for ZipArchiver {
    fn package(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            let options =
                FileOptions::<'_, ()>::default().compression_method(CompressionMethod::Deflated);
            for entry in entries {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&entry.data)?;
            }
            zip.finish()?;
        }
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_entries_keep_names_and_order() {
        let entries = vec![
            ArchiveEntry {
                name: "page-1.pdf".to_string(),
                data: b"first".to_vec(),
            },
            ArchiveEntry {
                name: "page-2.pdf".to_string(),
                data: b"second".to_vec(),
            },
        ];
        let bytes = ZipArchiver.package(&entries).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 2);

        let mut second = String::new();
        archive
            .by_name("page-2.pdf")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert_eq!(second, "second");

        assert_eq!(archive.by_index(0).unwrap().name(), "page-1.pdf");
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = ZipArchiver.package(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
