//! End-to-end extraction through the plain-text backend.

use std::io::Write;

use citecheck_core::TextFileBackend;
use citecheck_parsing::{
    CitationExtractor, ParsingConfigBuilder, ParsingError, SegmentationStrategy, extract_citations,
};

fn write_doc(pages: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", pages.join("\u{0C}")).unwrap();
    file
}

const BODY: &str = "Ranking Citations\n\n1 Introduction\nWe build on prior work [1, 2].\n\
    The bibliography follows the conclusion.\n";

#[test]
fn ieee_bibliography_across_pages() {
    let file = write_doc(&[
        BODY,
        "5 Conclusion\nDone.\n\nReferences\n\
         [1] J. Smith, A. Doe, 'Learning to Rank,' NeurIPS, 2015.\n\
         [2] K. He, X. Zhang, S. Ren, and J. Sun, \u{201C}Deep Residual Learning for Image Recog-\nnition,\u{201D} in Proc. CVPR, 2016, pp. 770\u{2013}778.\n",
        "[3] A. Vaswani et al., \"Attention Is All You Need,\" in Advances in NeurIPS, 2017.\n\
         Appendix A\nExtra proofs that are not references at all, 2020.\n",
    ]);

    let citations = extract_citations(file.path(), &TextFileBackend).unwrap();
    assert_eq!(citations.len(), 3);

    let first = &citations[0];
    assert_eq!(first.authors, vec!["smith", "doe"]);
    assert_eq!(first.title.as_deref(), Some("learning to rank"));
    assert_eq!(first.year, Some(2015));

    let second = &citations[1];
    assert_eq!(second.authors, vec!["he", "zhang", "ren", "sun"]);
    assert_eq!(
        second.title.as_deref(),
        Some("deep residual learning for image recognition")
    );
    assert_eq!(second.year, Some(2016));

    let third = &citations[2];
    assert_eq!(third.authors, vec!["vaswani"]);
    assert_eq!(third.title.as_deref(), Some("attention is all you need"));
    assert_eq!(third.year, Some(2017));
}

#[test]
fn entries_know_their_pages() {
    let file = write_doc(&[
        "References\n[1] J. Smith, A. Doe, 'Learning to Rank,' NeurIPS, 2015.\n",
        "[2] A. Roe, \"Sparse Coding for Vision,\" in Proc. CVPR, 2012.\n",
    ]);
    let pages = citecheck_core::PdfBackend::extract_page_texts(&TextFileBackend, file.path()).unwrap();
    let extractor = CitationExtractor::new();
    let (strategy, entries) = extractor.segment_with_strategy(&pages).unwrap();
    assert_eq!(strategy, SegmentationStrategy::Marker);
    assert_eq!(entries.iter().map(|e| e.page).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(entries.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn author_year_bibliography() {
    let file = write_doc(&[
        "Body text.\nBibliography\n\
         Smith, J., Doe, A. (2015). Learning to rank. Journal of\nRanking, 3(2), 1\u{2013}9.\n\
         Roe, B., and Poe, C. (2018). Sparse models for vision. Vision\nLetters, 7(1), 20\u{2013}31.\n",
    ]);
    let citations = extract_citations(file.path(), &TextFileBackend).unwrap();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].authors, vec!["smith", "doe"]);
    assert_eq!(citations[0].title.as_deref(), Some("learning to rank"));
    assert_eq!(citations[1].authors, vec!["roe", "poe"]);
    assert_eq!(citations[1].title.as_deref(), Some("sparse models for vision"));
    assert_eq!(citations[1].year, Some(2018));
}

#[test]
fn custom_header() {
    let file = write_doc(&[
        "Texto.\nBibliografía\n\
         [1] J. Smith, A. Doe, 'Learning to Rank,' NeurIPS, 2015.\n\
         [2] A. Roe, \"Sparse Coding for Vision,\" in Proc. CVPR, 2012.\n",
    ]);
    let config = ParsingConfigBuilder::new()
        .set_section_headers(vec!["Bibliografía".into()])
        .build()
        .unwrap();
    let citations = CitationExtractor::with_config(config)
        .extract_from_path(file.path(), &TextFileBackend)
        .unwrap();
    assert_eq!(citations.len(), 2);
}

#[test]
fn document_without_bibliography() {
    let file = write_doc(&["A single paragraph that says nothing about prior work."]);
    let err = extract_citations(file.path(), &TextFileBackend).unwrap_err();
    assert!(matches!(err, ParsingError::NoEntries));
}

#[test]
fn unreadable_document() {
    let err = extract_citations(std::path::Path::new("/no/such/paper.txt"), &TextFileBackend)
        .unwrap_err();
    assert!(matches!(err, ParsingError::Backend(_)));
}
