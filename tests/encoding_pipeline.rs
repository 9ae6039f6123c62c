//! End-to-end tests for record encoding.
//!
//! Run with: cargo test --test encoding_pipeline

mod common;

use std::sync::Arc;

use codelm_forge::encoding::{
    split_signature, Assembled, BatchEncoder, SequenceAssembler, SignatureExtractor, Variant,
    VocabRemap,
};
use codelm_forge::export::{write_batch, write_columns_jsonl, write_columns_parquet, ExportFormat};
use codelm_forge::records::{read_jsonl, write_jsonl, Record};
use codelm_forge::tokenizer::{SpecialTokenIds, SpecialTokenNames, TokenizerAdapter};

use common::VocabTokenizer;

fn assembler(max: usize) -> (Arc<VocabTokenizer>, SequenceAssembler) {
    let tok = Arc::new(VocabTokenizer::new());
    let special = SpecialTokenIds::resolve(tok.as_ref(), &SpecialTokenNames::default())
        .expect("default markers resolve");
    (tok.clone(), SequenceAssembler::new(tok, special, max))
}

fn corpus() -> Vec<Record> {
    vec![
        Record::new("empty", "", "", ""),
        Record::new("short", "add two numbers", "", "return a + b"),
        Record::new(
            "with-sig",
            "compute the mean\nof a list",
            "",
            "def mean(xs): <NEW_LINE> <INDENT> return sum ( xs ) / len ( xs )",
        ),
        Record::new(
            "long",
            "one two three four five six seven eight nine ten",
            "",
            "a b c d e f g h i j k l m n o p q r s t u v w x y z",
        ),
        Record::new(
            "class",
            "a point",
            "",
            "class Point: <NEW_LINE> <INDENT> x = 0 <NEW_LINE> y = 0",
        ),
    ]
}

#[test]
fn test_parallel_arrays_always_align() {
    for max in [3, 8, 16, 64] {
        let (_, asm) = assembler(max);
        for variant in [Variant::Simple, Variant::SignatureAware] {
            for record in corpus() {
                if let Assembled::Emitted(ex) = asm.assemble(variant, &record).unwrap() {
                    assert_eq!(ex.input_ids.len(), ex.length);
                    assert_eq!(ex.code_mask.len(), ex.length);
                    assert_eq!(ex.docstr_mask.len(), ex.length);
                    assert_eq!(ex.special_tokens_mask.len(), ex.length);
                    assert!(ex.prefix_lm_token_idx <= ex.length);
                }
            }
        }
    }
}

#[test]
fn test_simple_prefix_is_docstring_length_plus_one() {
    let (tok, asm) = assembler(1024);
    for record in corpus() {
        let doc_len = tok.encode(&record.docstring).unwrap().len();
        match asm.assemble(Variant::Simple, &record).unwrap() {
            Assembled::Emitted(ex) => assert_eq!(ex.prefix_lm_token_idx, 1 + doc_len),
            Assembled::Rejected { length } => panic!("{} rejected at {length}", record.id),
        }
    }
}

#[test]
fn test_length_policies_bound_output() {
    let max = 12;
    let (_, asm) = assembler(max);
    let records = corpus();

    let reject = BatchEncoder::new(asm.clone(), Variant::Simple)
        .encode_batch(&records)
        .unwrap();
    assert!(reject.columns.length.iter().all(|&l| l <= max));
    assert_eq!(reject.rows() + reject.dropped.len(), records.len());
    assert!(reject.dropped.iter().any(|d| d.id == "long"));

    let truncate = BatchEncoder::new(asm, Variant::SignatureAware)
        .encode_batch(&records)
        .unwrap();
    assert_eq!(truncate.rows(), records.len());
    assert!(truncate.dropped.is_empty());
    assert!(truncate.columns.length.iter().all(|&l| l <= max));
    let ids: Vec<&str> = truncate.ids.iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["empty", "short", "with-sig", "long", "class"]);
}

#[test]
fn test_signature_split_consumes_marker() {
    let split = split_signature("def f(x): <NEW_LINE> <INDENT>pass");
    assert!(split.signature.starts_with("def f(x)"));
    assert_eq!(split.code, "pass");

    let plain = "x = 1 <NEW_LINE> y = 2";
    let split = split_signature(plain);
    assert_eq!(split.signature, "");
    assert_eq!(split.code, plain);
}

#[test]
fn test_remap_preserves_length_and_unmapped_ids() {
    let remap: VocabRemap = [(5, 50), (7, 70)].into_iter().collect();
    let ids = vec![1, 5, 2, 7, 5, 9];
    let out = remap.apply(&ids);
    assert_eq!(out.len(), ids.len());
    assert_eq!(out, vec![1, 50, 2, 70, 50, 9]);
    assert!(remap.apply(&[]).is_empty());
}

#[test]
fn test_remap_leaves_docstring_untouched() {
    let (tok, asm) = assembler(64);
    let shared = tok.encode("value").unwrap()[0];
    let remap: VocabRemap = [(shared, 42)].into_iter().collect();
    let asm = asm.with_remap(Some(Arc::new(remap)));

    let record = Record::new("r", "value", "", "value");
    let Assembled::Emitted(ex) = asm.assemble(Variant::Simple, &record).unwrap() else {
        panic!("expected an emitted example");
    };
    assert_eq!(ex.input_ids[1], shared);
    assert_eq!(ex.input_ids[3], 42);
}

#[test]
fn test_extract_then_encode_then_export() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.jsonl");
    write_jsonl(
        &raw,
        &[
            Record::new("1", "square a number", "", "def sq(x):\n    return x * x"),
            Record::new("2", "no header here", "", "print(1)"),
        ],
    )
    .unwrap();

    let mut records: Vec<Record> = read_jsonl(&raw).unwrap();
    let report = SignatureExtractor::default().extract_all(&mut records);
    assert_eq!(report.total, 2);
    assert_eq!(report.extracted, 1);
    assert_eq!(records[0].signature, "def sq(x):");
    assert_eq!(records[0].code, "return x * x");
    assert!(records[1].signature.is_empty());

    let (_, asm) = assembler(64);
    let output = BatchEncoder::new(asm, Variant::Simple)
        .encode_chunked(&records, 1, true)
        .unwrap();
    assert_eq!(output.rows(), 2);

    let jsonl = dir.path().join("out").join("encoded.jsonl");
    write_columns_jsonl(&jsonl, &output).unwrap();
    let lines = std::fs::read_to_string(&jsonl).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let parquet = dir.path().join("out").join("encoded.parquet");
    write_columns_parquet(&parquet, &output).unwrap();
    assert!(std::fs::metadata(&parquet).unwrap().len() > 0);
}

#[test]
fn test_all_records_dropped_still_writes_parquet() {
    let (_, asm) = assembler(4);
    let records = vec![Record::new("too-long", "a b", "", "c d")];
    let output = BatchEncoder::new(asm, Variant::Simple)
        .encode_batch(&records)
        .unwrap();
    assert_eq!(output.rows(), 0);
    assert_eq!(output.dropped.len(), 1);
    assert_eq!(output.dropped[0].length, 7);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    write_batch(&path, &output, ExportFormat::Parquet).unwrap();
    assert!(path.exists());

    let jsonl = dir.path().join("empty.jsonl");
    write_batch(&jsonl, &output, ExportFormat::Jsonl).unwrap();
    assert_eq!(std::fs::read_to_string(&jsonl).unwrap(), "");
}
