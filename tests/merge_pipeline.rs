use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use easyarg_rs::{
    run_merge, AlignmentInput, AnnotationCategory, ClassifierFormat, Delimiter, HitSlot,
    MergeConfig, MergeError, MergeInputs, MergeWarning, SourceFormat, TaxonomyInput,
    TaxonomySlot,
};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn tabular(path: PathBuf) -> Option<AlignmentInput> {
    Some(AlignmentInput {
        path,
        format: SourceFormat::Tabular,
    })
}

#[test]
fn higher_scoring_arg_record_wins() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write(
        dir.path(),
        "arg.tsv",
        "query_id\treference_id\tscore\tidentity\tcoverage\tstart\tend\n\
         q1\tARO:3000873|blaTEM-1\t0.9\t0.98\t0.99\t100\t961\n\
         q1\tARO:3002244|blaCTX-M-15\t0.95\t0.97\t0.95\t100\t976\n",
    );
    let mut config = MergeConfig::default();
    config.arg.thresholds.min_score = 0.8;

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        ..Default::default()
    };
    let results = run_merge(&inputs, &config).unwrap();

    assert_eq!(results.merged.len(), 1);
    let hit = results.merged[0].arg.hit().unwrap();
    assert_eq!(hit.reference_id, "ARO:3002244|blaCTX-M-15");
    assert_eq!(hit.score, 0.95);
}

#[test]
fn plasmid_only_query_gets_markers_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write(dir.path(), "arg.tsv", "q1\tblaTEM-1\t1500\t0.99\t1.0\t0\t861\n");
    let plasmid = write(dir.path(), "plasmid.tsv", "q2\tNZ_CP012345.1\t4000\t0.93\t0.8\t10\t4010\n");

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        plasmid: tabular(plasmid),
        mge: tabular(dir.path().join("absent.tsv")),
        ..Default::default()
    };
    let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

    let q2 = results.merged.iter().find(|r| r.query_id == "q2").unwrap();
    assert_eq!(q2.arg, HitSlot::NoHit);
    assert_eq!(q2.mge, HitSlot::NoHit);
    assert_eq!(q2.taxonomy, TaxonomySlot::Unclassified);
    assert_eq!(q2.plasmid.hit().unwrap().reference_id, "NZ_CP012345.1");

    let table = results.get_merged_table();
    assert!(table.contains("q2\tno hit\tno hit\tNZ_CP012345.1\t4000\tno hit\tno hit\tunclassified"));
}

#[test]
fn missing_category_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write(
        dir.path(),
        "arg.tsv",
        "q1\tblaTEM-1\t1500\t0.99\t1.0\t0\t861\nq2\tmecA\t1900\t0.97\t0.95\t5\t2010\n",
    );
    let missing_mge = dir.path().join("mge.psl");

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        mge: Some(AlignmentInput {
            path: missing_mge.clone(),
            format: SourceFormat::Psl,
        }),
        ..Default::default()
    };
    let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

    assert_eq!(results.merged.len(), 2);
    assert!(results.merged.iter().all(|r| r.mge == HitSlot::NoHit));
    assert!(results.warnings.contains(&MergeWarning::MissingCategoryInput {
        category: AnnotationCategory::Mge,
        file: Some(missing_mge),
    }));
}

#[test]
fn tied_taxonomy_keeps_first_lineage_and_warns() {
    let dir = tempfile::tempdir().unwrap();
    let taxonomy = write(
        dir.path(),
        "taxonomy.tsv",
        "query_id\tlineage\tconfidence\n\
         q3\tBacteria;Pseudomonadota;Escherichia\t0.99\n\
         q3\tBacteria;Pseudomonadota;Klebsiella\t0.99\n",
    );

    let inputs = MergeInputs {
        sample: "S1".into(),
        taxonomy: Some(TaxonomyInput {
            path: taxonomy,
            format: ClassifierFormat::Tabular,
            taxdb: None,
        }),
        ..Default::default()
    };
    let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

    assert_eq!(results.merged.len(), 1);
    let assignment = results.merged[0].taxonomy.assignment().unwrap();
    assert_eq!(assignment.lineage_string(), "Bacteria;Pseudomonadota;Escherichia");

    let ambiguous: Vec<&MergeWarning> = results
        .warnings
        .iter()
        .filter(|w| matches!(w, MergeWarning::AmbiguousTaxonomy { .. }))
        .collect();
    assert_eq!(ambiguous.len(), 1);
    match ambiguous[0] {
        MergeWarning::AmbiguousTaxonomy { query_id, confidence, .. } => {
            assert_eq!(query_id, "q3");
            assert_eq!(*confidence, 0.99);
        }
        _ => unreachable!(),
    }
}

#[test]
fn every_observed_query_appears_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    // q4 fails the ARG identity threshold but is still observed
    let arg = write(
        dir.path(),
        "arg.tsv",
        "q4\tblaOXA-48\t800\t0.5\t0.95\t0\t798\nq1\tblaTEM-1\t1500\t0.99\t1.0\t0\t861\n",
    );
    let mge = write(dir.path(), "mge.tsv", "q2\tIS26\t700\t0.9\t0.9\t0\t820\n");
    let taxonomy = write(
        dir.path(),
        "taxonomy.tsv",
        "q5\tBacteria;Bacillota\t0.8\nq1\tBacteria;Pseudomonadota\t0.9\n",
    );

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        mge: tabular(mge),
        taxonomy: Some(TaxonomyInput {
            path: taxonomy,
            format: ClassifierFormat::Tabular,
            taxdb: None,
        }),
        ..Default::default()
    };
    let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

    let ids: Vec<&str> = results.merged.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q4", "q5"]);
    let unique: BTreeSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());

    let q4 = &results.merged[2];
    assert_eq!(q4.arg, HitSlot::NoHit);
    assert!(!q4.has_any_hit());
    assert!(results.merged[3].taxonomy.is_classified());
}

#[test]
fn corrupt_category_file_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write(dir.path(), "arg.tsv", "q1\tblaTEM-1\t1500\t0.99\t1.0\t0\t861\n");
    let plasmid = write(
        dir.path(),
        "plasmid.tsv",
        "q2\tNZ_CP1\tnot-a-number\t0.9\t0.9\t0\t10\n\
         q3\tNZ_CP2\t100\n\
         q4\tNZ_CP3\t4000\t0.93\t0.8\t10\t4010\n",
    );

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        plasmid: tabular(plasmid.clone()),
        ..Default::default()
    };
    match run_merge(&inputs, &MergeConfig::default()) {
        Err(MergeError::CorruptInputFile {
            file,
            malformed,
            total,
            ..
        }) => {
            assert_eq!(file, plasmid);
            assert_eq!(malformed, 2);
            assert_eq!(total, 3);
        }
        other => panic!("expected a corrupt input error, got {other:?}"),
    }
}

#[test]
fn isolated_malformed_line_is_skipped_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::new();
    for i in 0..19 {
        body.push_str(&format!("q{i:02}\tblaTEM-1\t1500\t0.99\t1.0\t0\t861\n"));
    }
    body.push_str("q99\tblaTEM-1\tNaN-ish\t0.99\t1.0\t0\t861\n");
    let arg = write(dir.path(), "arg.tsv", &body);

    let inputs = MergeInputs {
        sample: "S1".into(),
        arg: tabular(arg),
        ..Default::default()
    };
    let results = run_merge(&inputs, &MergeConfig::default()).unwrap();

    assert_eq!(results.merged.len(), 19);
    assert!(results
        .warnings
        .iter()
        .any(|w| matches!(w, MergeWarning::SkippedMalformed { line: 20, .. })));
}

#[test]
fn aligner_and_centrifuge_outputs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let arg = write(
        dir.path(),
        "S7_ARG.paf",
        "read1\t5000\t100\t961\t+\tblaTEM-1\t861\t0\t861\t850\t900\t60\tAS:i:1600\n\
         read2\t4200\t0\t500\t+\tmecA\t2007\t0\t500\t480\t500\t60\tAS:i:900\n",
    );
    let plasmid = write(
        dir.path(),
        "S7_plsdb.paf",
        "read1\t5000\t0\t5000\t+\tNZ_CP012345.1\t6000\t500\t5500\t4800\t5000\t60\n",
    );
    let mge = write(
        dir.path(),
        "S7_MGE.psl",
        "95\t5\t0\t0\t0\t0\t0\t0\t+\tmobileOG_000123\t100\t0\t100\tread3\t3000\t300\t600\t1\t100,\t0,\t300,\n",
    );
    let centrifuge = write(
        dir.path(),
        "S7_centrifuge_result.tsv",
        "readID\tseqID\ttaxID\tscore\t2ndBestScore\thitLength\tqueryLength\tnumMatches\n\
         read1\tNZ_CP012345.1\t562\t900\t0\t4800\t5000\t1\n\
         read2\tunclassified\t0\t0\t0\t0\t4200\t1\n\
         read3\tNC_000913.3\t561\t400\t380\t3000\t3000\t2\n",
    );
    let taxdb = write(
        dir.path(),
        "taxDB",
        "1\t1\troot\tno rank\n\
         2\t1\tBacteria\tsuperkingdom\n\
         561\t2\tEscherichia\tgenus\n\
         562\t561\tEscherichia coli\tspecies\n",
    );

    let inputs = MergeInputs {
        sample: "S7".into(),
        arg: Some(AlignmentInput {
            path: arg,
            format: SourceFormat::Paf,
        }),
        plasmid: Some(AlignmentInput {
            path: plasmid,
            format: SourceFormat::Paf,
        }),
        mge: Some(AlignmentInput {
            path: mge,
            format: SourceFormat::Psl,
        }),
        taxonomy: Some(TaxonomyInput {
            path: centrifuge,
            format: ClassifierFormat::Centrifuge,
            taxdb: Some(taxdb),
        }),
    };
    let mut config = MergeConfig::default();
    config.delimiter = Delimiter::Comma;
    let results = run_merge(&inputs, &config).unwrap();

    let ids: Vec<&str> = results.merged.iter().map(|r| r.query_id.as_str()).collect();
    assert_eq!(ids, vec!["read1", "read2", "read3"]);

    let read1 = &results.merged[0];
    let arg_hit = read1.arg.hit().unwrap();
    assert_eq!(arg_hit.reference_id, "blaTEM-1");
    assert_eq!(arg_hit.score, 1600.0);
    assert_eq!(read1.plasmid.hit().unwrap().reference_id, "NZ_CP012345.1");
    assert_eq!(
        read1.taxonomy.assignment().unwrap().lineage,
        vec!["Bacteria", "Escherichia", "Escherichia coli"]
    );

    // mecA covers a quarter of the gene and misses the coverage threshold
    let read2 = &results.merged[1];
    assert!(!read2.has_any_hit());
    assert_eq!(read2.taxonomy, TaxonomySlot::Unclassified);

    let read3 = &results.merged[2];
    let mge_hit = read3.mge.hit().unwrap();
    assert_eq!(mge_hit.reference_id, "mobileOG_000123");
    assert_eq!((mge_hit.start, mge_hit.end), (300, 600));
    let tax = read3.taxonomy.assignment().unwrap();
    assert_eq!(tax.lineage_string(), "Bacteria;Escherichia");
    assert_eq!(tax.confidence, 0.5);

    assert_eq!(results.summary.sample.total_queries, 3);
    assert_eq!(results.summary.sample.classified, 2);
    assert_eq!(results.summary.sample.annotated, 2);

    let out = dir.path().join("out");
    let written = results.write_outputs(&out).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["S7_merged.csv", "S7_gene_counts.tsv", "S7_taxon_counts.tsv", "S7_summary.tsv"]
    );
    let merged = fs::read_to_string(out.join("S7_merged.csv")).unwrap();
    assert_eq!(merged.lines().count(), 4);
    assert!(merged.lines().nth(2).unwrap().starts_with("read2,no hit,no hit,"));
}
