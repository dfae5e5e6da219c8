//! PDF merge and split over raw bytes.
//!
//! Neither operation parses PDF structure. Merge concatenates the inputs
//! byte-for-byte in input order; split is a placeholder that emits one
//! artifact per requested range, each carrying the full source bytes and
//! reporting an even share of the source size. Callers that need real page
//! extraction must not rely on split output.

use crate::artifact::Artifact;
use crate::config::MERGE_LIMIT;
use crate::error::FileKitError;
use crate::intake::FileDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Name of the merged output.
pub const MERGED_NAME: &str = "merged_document.pdf";

const PDF_MIME: &str = "application/pdf";

/// A 1-indexed, inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Result<Self, FileKitError> {
        if start < 1 {
            return Err(FileKitError::Validation(format!(
                "pages are 1-indexed, minimum is 1 (got {start})"
            )));
        }
        if start > end {
            return Err(FileKitError::Validation(format!(
                "invalid page range '{start}-{end}': start must be <= end"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a comma separated list such as `1-3,5,7-9`.
    pub fn parse_list(s: &str) -> Result<Vec<PageRange>, FileKitError> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse::<PageRange>)
            .collect()
    }
}

impl FromStr for PageRange {
    type Err = FileKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |p: &str| {
            p.trim().parse::<usize>().map_err(|_| {
                FileKitError::Validation(format!("invalid page number '{}'", p.trim()))
            })
        };
        match s.split_once('-') {
            Some((start, end)) => PageRange::new(parse(start)?, parse(end)?),
            None => {
                let page = parse(s)?;
                PageRange::new(page, page)
            }
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Concatenate every input's bytes, in input order, into one document.
///
/// Fails with [`FileKitError::AggregateLimit`] before reading anything when
/// the combined declared size exceeds [`MERGE_LIMIT`].
pub async fn merge_pdfs<F: AsRef<FileDescriptor>>(files: &[F]) -> Result<Artifact, FileKitError> {
    if files.is_empty() {
        return Err(FileKitError::Validation("nothing to merge".into()));
    }
    let total: u64 = files.iter().map(|f| f.as_ref().byte_size()).sum();
    if total > MERGE_LIMIT {
        warn!("Merge rejected: {} bytes > {} limit", total, MERGE_LIMIT);
        return Err(FileKitError::AggregateLimit {
            total,
            limit: MERGE_LIMIT,
        });
    }

    let mut merged = Vec::with_capacity(total as usize);
    for file in files {
        let bytes = file.as_ref().load().await?;
        merged.extend_from_slice(&bytes);
    }
    // Sources may have grown since intake measured them.
    if merged.len() as u64 > MERGE_LIMIT {
        return Err(FileKitError::AggregateLimit {
            total: merged.len() as u64,
            limit: MERGE_LIMIT,
        });
    }

    info!("Merged {} files → {} bytes", files.len(), merged.len());
    Ok(Artifact::new(MERGED_NAME, PDF_MIME, merged))
}

/// Produce one artifact per range.
///
/// Placeholder behaviour: every artifact carries the complete source bytes
/// and reports `floor(source_size / ranges.len())` as its size.
pub async fn split_pdf(
    file: &FileDescriptor,
    ranges: &[PageRange],
) -> Result<Vec<Artifact>, FileKitError> {
    if ranges.is_empty() {
        return Err(FileKitError::Validation(
            "split needs at least one page range".into(),
        ));
    }
    let bytes = file.load().await?;
    let share = file.byte_size() / ranges.len() as u64;

    let artifacts = ranges
        .iter()
        .enumerate()
        .map(|(i, range)| {
            debug!("Split segment {} covers pages {}", i + 1, range);
            Artifact::with_reported_size(
                format!("split_{}_{}", i + 1, file.name()),
                PDF_MIME,
                bytes.clone(),
                share,
            )
        })
        .collect();
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobRegistry;
    use crate::config::{AcceptedTypes, OverflowPolicy, MIB};
    use crate::intake::{select, IntakePolicy, RawInput};

    async fn descriptors(inputs: Vec<RawInput>) -> Vec<FileDescriptor> {
        let policy = IntakePolicy {
            accepted_types: AcceptedTypes::Any,
            max_files: 100,
            max_file_size: u64::MAX,
            overflow: OverflowPolicy::Truncate,
        };
        select(inputs, &policy, &BlobRegistry::new())
            .await
            .unwrap()
            .accepted
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(
            PageRange::parse_list("1-3, 5 ,7-9").unwrap(),
            vec![
                PageRange { start: 1, end: 3 },
                PageRange { start: 5, end: 5 },
                PageRange { start: 7, end: 9 },
            ]
        );
        assert!("0-2".parse::<PageRange>().is_err());
        assert!("5-2".parse::<PageRange>().is_err());
        assert!("x".parse::<PageRange>().is_err());
        assert_eq!(PageRange::new(2, 4).unwrap().to_string(), "2-4");
    }

    #[tokio::test]
    async fn merge_concatenates_in_order() {
        let files = descriptors(vec![
            RawInput::from_bytes("a.pdf", PDF_MIME, b"%PDF-a".to_vec()),
            RawInput::from_bytes("b.pdf", PDF_MIME, b"%PDF-bb".to_vec()),
        ])
        .await;
        let out = merge_pdfs(&files).await.unwrap();
        assert_eq!(out.name, MERGED_NAME);
        assert_eq!(out.mime_type, PDF_MIME);
        assert_eq!(out.byte_size, 13);
        assert_eq!(out.payload(), b"%PDF-a%PDF-bb");
    }

    #[tokio::test]
    async fn merge_over_cap_is_aggregate_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = Vec::new();
        for (name, size) in [("a.pdf", 30 * MIB), ("b.pdf", 25 * MIB)] {
            let path = dir.path().join(name);
            let f = std::fs::File::create(&path).unwrap();
            f.set_len(size).unwrap();
            inputs.push(RawInput::from_path(&path));
        }
        let files = descriptors(inputs).await;
        let err = merge_pdfs(&files).await.unwrap_err();
        assert_eq!(
            err,
            FileKitError::AggregateLimit {
                total: 55 * MIB,
                limit: MERGE_LIMIT
            }
        );
    }

    #[tokio::test]
    async fn merge_of_nothing_is_invalid() {
        let files: Vec<FileDescriptor> = Vec::new();
        assert!(matches!(
            merge_pdfs(&files).await,
            Err(FileKitError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn split_emits_one_placeholder_per_range() {
        let files = descriptors(vec![RawInput::from_bytes(
            "doc.pdf",
            PDF_MIME,
            vec![7u8; 10],
        )])
        .await;
        let ranges = PageRange::parse_list("1-2,3,4-6").unwrap();
        let out = split_pdf(&files[0], &ranges).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name, "split_1_doc.pdf");
        assert_eq!(out[2].name, "split_3_doc.pdf");
        for a in &out {
            assert_eq!(a.byte_size, 3);
            assert_eq!(a.payload().len(), 10);
        }
    }

    #[tokio::test]
    async fn split_without_ranges_is_invalid() {
        let files = descriptors(vec![RawInput::from_bytes("d.pdf", PDF_MIME, vec![1u8])]).await;
        let err = split_pdf(&files[0], &[]).await.unwrap_err();
        assert!(matches!(err, FileKitError::Validation(_)));
    }
}
