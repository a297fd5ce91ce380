use std::fs;

use remarkup::inspect::{alignment_spot_check, word_elements};
use remarkup::{DocumentError, DocumentOutcome, LengthWindow, PastTenseMarker, RunConfig, Tables, VariantChoice};

#[path = "integration/mod.rs"]
mod test_utils;
use test_utils::{shipped_config_dir, tei_document, text_only, TestFixture};

const HEADER: &str = "<teiHeader><fileDesc><title>A Sermon</title></fileDesc></teiHeader>";

/// Markup survives untouched and words are wrapped when nothing is normalized
#[test]
fn test_markup_restored_without_normalization() {
    let fixture = TestFixture::new();
    let source = fixture.create_corpus_file(
        "A00001.xml",
        &tei_document("A Sermon", r#"<p n="1">Goe <hi rend="it">vnto</hi> them</p>"#),
    );
    let pipeline = fixture.pipeline(fixture.run_config());

    let outcome = pipeline.process_file(&source).expect("Processing should succeed");
    assert_eq!(
        outcome,
        DocumentOutcome::Written {
            output: fixture.output_for("A00001.xml"),
            tokens: 3
        }
    );

    let expected = format!(
        r#"<TEI.2>{HEADER}<body> <p n="1"> <w>Goe</w> <hi rend="it"> <w>vnto</w> </hi> <w>them</w> </p> </body></TEI.2>"#
    );
    assert_eq!(fixture.read_output("A00001.xml"), expected);
}

/// Normalized spellings land in attributes while the element text keeps the original
#[test]
fn test_normalized_attributes() {
    let fixture = TestFixture::new();
    let source = fixture.create_corpus_file(
        "A00002.xml",
        &tei_document("A Sermon", r#"<p>Goe <hi rend="it">vnto</hi> them</p>"#),
    );
    let config = RunConfig {
        normalize: true,
        ..fixture.run_config()
    };
    let pipeline = fixture.pipeline(config);
    pipeline.process_file(&source).expect("Processing should succeed");

    let output = fixture.read_output("A00002.xml");
    assert!(output.contains(r#"<w Original="Goe" Normalized="go">Goe</w>"#), "{output}");
    assert!(output.contains(r#"<hi rend="it"> <w Original="vnto" Normalized="unto">vnto</w> </hi>"#), "{output}");
    assert!(output.contains(r#"<w Original="them" Normalized="them">them</w>"#), "{output}");
    assert_eq!(text_only(&output), "A Sermon Goe vnto them");
}

/// Marked past tense is resolved in the normalized text, and the original keeps its plain ending
#[test]
fn test_past_tense_marker_round_trip() {
    let fixture = TestFixture::new();
    let source = fixture.create_corpus_file("A00003.xml", &tei_document("Verse", "<l>He lov'd her and prais'd her</l>"));
    let config = RunConfig {
        normalize: true,
        apply_prep_rules: true,
        ..fixture.run_config()
    };
    let pipeline = fixture.pipeline(config);
    pipeline.process_file(&source).expect("Processing should succeed");

    let output = fixture.read_output("A00003.xml");
    assert!(output.contains(r#"<w Original="lov'd" Normalized="loved">lov'd</w>"#), "{output}");
    assert!(output.contains(r#"<w Original="prais'd" Normalized="praised">prais'd</w>"#), "{output}");
    assert!(!output.contains(PastTenseMarker::default().as_str()));
}

/// The body window is inclusive at the upper end and counted in characters
#[test]
fn test_length_gate_boundary() {
    let fixture = TestFixture::new();
    let inner = "<p>ſo it was</p>";
    let body_len = format!("<body>{inner}</body>").chars().count();
    let source = fixture.create_corpus_file("A00004.xml", &tei_document("Short", inner));

    let at_limit = RunConfig {
        length_window: LengthWindow::new(0, Some(body_len)),
        ..fixture.run_config()
    };
    assert!(fixture.pipeline(at_limit).process_file(&source).is_ok());

    let below_limit = RunConfig {
        length_window: LengthWindow::new(0, Some(body_len - 1)),
        overwrite: true,
        ..fixture.run_config()
    };
    let err = fixture.pipeline(below_limit).process_file(&source).unwrap_err();
    assert!(matches!(err, DocumentError::LengthGate { length, .. } if length == body_len));
    assert_eq!(err.kind(), "length_gate");

    let too_short = RunConfig {
        length_window: LengthWindow::new(body_len + 1, None),
        overwrite: true,
        ..fixture.run_config()
    };
    assert!(fixture.pipeline(too_short).process_file(&source).is_err());
}

/// An existing output is left alone unless overwriting
#[test]
fn test_existing_output_skipped_unless_overwrite() {
    let fixture = TestFixture::new();
    let source = fixture.create_corpus_file("A00005.xml", &tei_document("T", "<p>vpon the hill</p>"));
    fs::create_dir_all(&fixture.dest_dir).unwrap();
    fs::write(fixture.output_for("A00005.xml"), "stale").unwrap();

    let outcome = fixture.pipeline(fixture.run_config()).process_file(&source).unwrap();
    assert!(matches!(outcome, DocumentOutcome::AlreadyExists { .. }));
    assert_eq!(fixture.read_output("A00005.xml"), "stale");

    let overwrite = RunConfig {
        overwrite: true,
        ..fixture.run_config()
    };
    let outcome = fixture.pipeline(overwrite).process_file(&source).unwrap();
    assert!(matches!(outcome, DocumentOutcome::Written { tokens: 3, .. }));
    assert!(fixture.read_output("A00005.xml").contains("<w>vpon</w>"));
    assert!(!fixture.dest_dir.join("A00005.xml.partial").exists());
}

/// A missing body skips the document; a missing header only empties the header
#[test]
fn test_missing_regions() {
    let fixture = TestFixture::new();
    let no_body = fixture.create_corpus_file("A00006.xml", "<TEI.2><teiHeader>h</teiHeader><text>x</text></TEI.2>");
    let no_header = fixture.create_corpus_file("A00007.xml", "<TEI.2><body><p>word</p></body></TEI.2>");
    let pipeline = fixture.pipeline(fixture.run_config());

    let err = pipeline.process_file(&no_body).unwrap_err();
    assert!(matches!(err, DocumentError::RegionMissing(ref tag) if tag == "body"));
    assert!(!fixture.output_for("A00006.xml").exists());

    pipeline.process_file(&no_header).unwrap();
    assert_eq!(
        fixture.read_output("A00007.xml"),
        "<TEI.2><body> <p> <w>word</w> </p> </body></TEI.2>"
    );
}

/// A single split token is repaired by dropping the extra normalized token
#[test]
fn test_single_token_drift_is_repaired() {
    let fixture = TestFixture::new();
    let config_dir = fixture.config_dir_with_rules("vpon\tup on\n");
    let source = fixture.create_corpus_file("A00008.xml", &tei_document("T", "<p>Goe vpon</p>"));
    let config = RunConfig {
        normalize: true,
        ..fixture.run_config()
    };

    let pipeline = fixture.pipeline_with_tables(config, &config_dir);
    pipeline.process_file(&source).expect("Drift of one token should be repaired");

    let output = fixture.read_output("A00008.xml");
    assert!(output.contains(r#"<w Original="vpon" Normalized="up">vpon</w> </p>"#), "{output}");
    assert!(!fixture.log_dir.join("A00008.xml.txt").exists());
}

/// An unrepairable drift writes a misalignment log and produces no output
#[test]
fn test_unrepairable_drift_is_logged_and_skipped() {
    let fixture = TestFixture::new();
    let config_dir = fixture.config_dir_with_rules("vpon\tup on it\n");
    let source = fixture.create_corpus_file("A00009.xml", &tei_document("T", "<p>Goe vpon</p>"));
    let config = RunConfig {
        normalize: true,
        ..fixture.run_config()
    };

    let pipeline = fixture.pipeline_with_tables(config, &config_dir);
    let err = pipeline.process_file(&source).unwrap_err();
    match &err {
        DocumentError::Alignment(report) => {
            assert!(report.total_gap > 0);
            assert_eq!((report.tokenized_len, report.normalized_len), (6, 8));
            assert!(!report.misaligned_indices.is_empty());
        }
        other => panic!("expected an alignment error, got {other}"),
    }
    assert_eq!(err.kind(), "alignment");
    assert!(!fixture.output_for("A00009.xml").exists());

    let log = fs::read_to_string(fixture.log_dir.join("A00009.xml.txt")).expect("Log should be written");
    assert!(log.contains("tokenized token numbers: 6, normalized token numbers: 8"), "{log}");
    assert!(log.contains("vpon"));
}

/// A log directory that cannot be created does not turn a misalignment into an I/O failure
#[test]
fn test_unwritable_log_dir_still_reports_alignment() {
    let fixture = TestFixture::new();
    let config_dir = fixture.config_dir_with_rules("vpon\tup on it\n");
    let source = fixture.create_corpus_file("A00010.xml", &tei_document("T", "<p>Goe vpon</p>"));
    let blocked = fixture.temp_dir.path().join("not_a_dir");
    fs::write(&blocked, "occupied").unwrap();
    let config = RunConfig {
        normalize: true,
        log_dir: blocked.clone(),
        ..fixture.run_config()
    };

    let err = fixture.pipeline_with_tables(config, &config_dir).process_file(&source).unwrap_err();
    assert!(matches!(err, DocumentError::Alignment(_)), "got {err}");
    assert_eq!(err.kind(), "alignment");
    assert!(blocked.is_file());
}

/// Rebuilt documents pass their own alignment spot check
#[test]
fn test_rebuilt_document_passes_spot_check() {
    let fixture = TestFixture::new();
    let body = "<p>I haue ſeen it vpon the hill</p><p>and he loveth her</p>";
    let source = fixture.create_corpus_file("A00010.xml", &tei_document("T", body));
    let config = RunConfig {
        normalize: true,
        alignment_check: true,
        ..fixture.run_config()
    };
    fixture.pipeline(config).process_file(&source).unwrap();

    let output = fixture.read_output("A00010.xml");
    let words = word_elements(&output, "w");
    assert_eq!(words.len(), 11);
    assert_eq!(words[2].get("Normalized"), Some("seen"));
    assert_eq!(words[9].get("Normalized"), Some("loves"));

    let tables = Tables::load(&shipped_config_dir()).unwrap();
    let normalizer = tables.normalizer(PastTenseMarker::default(), VariantChoice::First).unwrap();
    let check = alignment_spot_check(&output, "w", &normalizer, 10, 0.1);
    assert_eq!(check.potential_errors, 0);
    assert!(!check.needs_manual_check());
}
