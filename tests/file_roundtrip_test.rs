use anyhow::Result;
use rec_quality::app::classify_use_case::ClassifyUseCase;
use rec_quality::config::Config;
use rec_quality::infra::{
    FileOverrideSource, FileRecordSource, FileReviewBatchAdapter, FileScoredOutputAdapter,
};
use rec_quality::pipeline::{Pipeline, ReviewExporter};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SAMPLE: &str = include_str!("resources/collector_sample.jsonl");

fn use_case(input: &Path, output: &Path, config: &Config) -> Result<ClassifyUseCase> {
    Ok(ClassifyUseCase::new(
        Pipeline::from_config(config)?,
        ReviewExporter::from_config(&config.review),
        Box::new(FileRecordSource::new(input, config.fields.id_field.clone())?),
        Box::new(FileScoredOutputAdapter::new(output)),
    ))
}

fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<Value>(l))
        .collect::<Result<_, _>>()?)
}

#[tokio::test]
async fn test_jsonl_in_jsonl_out_with_review_batch() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("collected.jsonl");
    let output = dir.path().join("out/classified.jsonl");
    let review = dir.path().join("out/review.jsonl");
    fs::write(&input, SAMPLE)?;

    let config = Config::default();
    let report = use_case(&input, &output, &config)?
        .with_review_batch(Box::new(FileReviewBatchAdapter::new(review.to_str().unwrap())?))
        .run()
        .await?;

    assert_eq!(report.total_records, 6);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].line, 5);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.decisions["Keep"], 2);
    assert_eq!(report.decisions["Remove"], 2);
    assert_eq!(report.decisions["Needs editing"], 2);

    let rows = read_jsonl(&output)?;
    assert_eq!(rows.len(), 6);
    let ids: Vec<_> = rows.iter().map(|r| r["record_id"].as_str().unwrap_or_default()).collect();
    assert_eq!(ids, vec!["hel-001", "hel-002", "hel-003", "hel-004", "hel-006", "row-7"]);

    // Original fields survive next to the classification columns
    assert_eq!(rows[0]["opening_date"], "2023-04-01T18:00");
    assert_eq!(rows[0]["decision"], "Keep");
    assert_eq!(rows[3]["decision"], "Remove");
    assert!(rows[3]["reasons"][0].as_str().unwrap_or_default().contains("duplicate"));
    assert_eq!(rows[4]["decision"], "Needs editing");
    assert_eq!(rows[5]["decision"], "Keep");

    let items = read_jsonl(&review)?;
    let review_ids: Vec<_> = items.iter().map(|i| i["record_id"].as_str().unwrap_or_default()).collect();
    assert_eq!(review_ids, vec!["hel-002", "hel-003", "hel-004", "hel-006"]);
    assert_eq!(report.exported, 4);
    assert_eq!(items[0]["config_fingerprint"], config.fingerprint());
    Ok(())
}

#[tokio::test]
async fn test_csv_output_and_override_merge() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("collected.jsonl");
    let output = dir.path().join("classified.csv");
    let overrides = dir.path().join("overrides.jsonl");
    fs::write(&input, SAMPLE)?;
    fs::write(
        &overrides,
        concat!(
            "{\"record_id\": \"hel-006\", \"decision\": \"Remove\", \"reason\": \"chain outlet\", \"reviewer\": \"ops\"}\n",
            "{\"record_id\": \"hel-404\", \"decision\": \"Keep\", \"reason\": \"gone\"}\n",
        ),
    )?;

    let config = Config::default();
    let report = use_case(&input, &output, &config)?
        .with_overrides(Box::new(FileOverrideSource::new(&overrides)))
        .run()
        .await?;

    let merge = report.merge.expect("merge report");
    assert_eq!(merge.applied, 1);
    assert_eq!(merge.rejected.len(), 1);
    assert_eq!(merge.rejected[0].subject(), "hel-404");

    let mut reader = csv::Reader::from_path(&output)?;
    let headers = reader.headers()?.clone();
    let header_list: Vec<_> = headers.iter().collect();
    let mut sorted = header_list.clone();
    sorted.sort();
    assert_eq!(header_list, sorted);

    let column = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 6);

    let chain = &rows[4];
    assert_eq!(&chain[column("record_id")], "hel-006");
    assert_eq!(&chain[column("decision")], "Remove");
    assert_eq!(&chain[column("decision_source")], "external_review");
    assert_eq!(&chain[column("reasons")], "external review: chain outlet");

    let missing = &rows[2];
    assert_eq!(&missing[column("decision_source")], "rules");
    assert_eq!(&missing[column("reasons")], "missing required field: address");
    Ok(())
}

#[tokio::test]
async fn test_wrongly_typed_override_is_rejected_alone() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("collected.jsonl");
    let output = dir.path().join("classified.jsonl");
    let overrides = dir.path().join("overrides.json");
    fs::write(&input, SAMPLE)?;
    fs::write(
        &overrides,
        r#"{"hel-003": {"decision": 3, "reason": "x"}, "hel-006": {"decision": "Keep", "reason": "local franchise"}}"#,
    )?;

    let config = Config::default();
    let report = use_case(&input, &output, &config)?
        .with_overrides(Box::new(FileOverrideSource::new(&overrides)))
        .run()
        .await?;

    let merge = report.merge.expect("merge report");
    assert_eq!(merge.applied, 1);
    assert_eq!(merge.rejected.len(), 1);
    assert_eq!(merge.rejected[0].subject(), "hel-003");
    assert_eq!(report.rows_written, 6);

    let rows = read_jsonl(&output)?;
    assert_eq!(rows[2]["decision_source"], "rules");
    assert_eq!(rows[4]["decision"], "Keep");
    assert_eq!(rows[4]["decision_source"], "external_review");
    Ok(())
}
