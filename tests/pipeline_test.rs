use async_trait::async_trait;
use chrono::NaiveDate;
use qcr_engine::analysis::{
    Analysis, DateWindow, TopIssueAnalysis, TopModelAnalysis, WeeklyAnalysis,
};
use qcr_engine::artifacts::{ArtifactWriter, ChartRequestRenderer};
use qcr_engine::config::{PipelineConfig, StoreConfig};
use qcr_engine::error::{LlmError, QcrError};
use qcr_engine::llm::TextGenerator;
use qcr_engine::pipeline::{analyse, prepare, PipelineOptions, Publisher};
use qcr_engine::store::IngestionGateway;
use qcr_engine::summary::{Summarizer, SummarySource};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SHEET: &str = "\
日期,服务单号,审核原因,MTM,分类,问题描述
2025-03-03,5001,7天无理由,21A0,不想要了,
2025-03-03,5002,7天无理由,21A0,外观不满意,
2025-03-04,5003,7天无理由,82X1,不想要了,
2025-03-04,5004,质量维修,21A0,无法开机,开机黑屏
2025-03-05,5005,质量维修,21A0,屏幕闪烁,
2025-03-05,5006,15天质量换新,82X1,无法开机,按电源无反应
2025-03-06,5007,180天只换不修,99ZZ,键盘失灵,部分按键无效
2025-03-20,5008,质量维修,82X1,电池鼓包,电池鼓包
";

const MTM_TABLE: &str = "\
MTM,机型名称
21A0,ThinkBook 14
82X1,Yoga Pro 14s
";

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    config: PipelineConfig,
    data_file: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let data_file = root.join("returns.csv");
    fs::write(&data_file, SHEET).unwrap();
    fs::write(root.join("mtm.csv"), MTM_TABLE).unwrap();

    let mut config = PipelineConfig::default();
    config.store = StoreConfig {
        db_path: root.join("store").join("qcr.db"),
        table_name: "qcr_data".to_string(),
    };
    config.output.mapping_file = root.join("mtm.csv");
    config.output.output_dir = root.join("output");

    Fixture {
        _dir: dir,
        root,
        config,
        data_file,
    }
}

/// Answers every prompt and keeps a copy of it.
struct PromptLog(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl TextGenerator for PromptLog {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.0.lock().unwrap().push(prompt.to_string());
        Ok("summary".to_string())
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_second_run_sees_first_run_records() {
    let fx = fixture();
    let gateway = IngestionGateway::connect(&fx.config.store);
    let options = PipelineOptions::new(&fx.data_file, &fx.config);

    let first = prepare(&fx.config, &options, Some(&gateway)).unwrap();
    assert_eq!(first.records.len(), 8);
    assert_eq!(first.new_records, 8);
    assert_eq!(first.persist.as_ref().map(|p| p.written), Some(8));

    // Unmapped 99ZZ keeps its raw identifier
    assert_eq!(first.resolution.mapped, 7);
    assert_eq!(first.resolution.unmapped, 1);

    let second = prepare(&fx.config, &options, Some(&gateway)).unwrap();
    assert_eq!(second.records.len(), 8);
    assert_eq!(second.new_records, 0);
    assert_eq!(second.persist.as_ref().map(|p| p.written), Some(0));
}

#[test]
fn test_new_only_and_filter_unmapped() {
    let fx = fixture();
    let gateway = IngestionGateway::connect(&fx.config.store);
    let mut options = PipelineOptions::new(&fx.data_file, &fx.config);
    options.new_only = true;
    options.filter_unmapped = true;

    let first = prepare(&fx.config, &options, Some(&gateway)).unwrap();
    assert_eq!(first.records.len(), 7);
    assert!(first.records.iter().all(|r| r.is_mapped()));

    let second = prepare(&fx.config, &options, Some(&gateway)).unwrap();
    assert!(second.records.is_empty());
}

#[test]
fn test_missing_mapping_table_is_not_fatal() {
    let mut fx = fixture();
    fx.config.output.mapping_file = fx.root.join("absent.csv");
    let options = PipelineOptions::new(&fx.data_file, &fx.config);

    let prepared = prepare(&fx.config, &options, None).unwrap();
    assert_eq!(prepared.resolution.mapped, 0);
    assert!(prepared.records.iter().all(|r| r.model_name() == r.record().mtm));
}

#[test]
fn test_sheet_without_category_column_is_rejected() {
    let fx = fixture();
    let bad = fx.root.join("bad.csv");
    fs::write(&bad, "日期,服务单号,审核原因\n2025-03-03,1,7天无理由\n").unwrap();
    let options = PipelineOptions::new(&bad, &fx.config);

    let err = prepare(&fx.config, &options, None).unwrap_err();
    assert!(matches!(err, QcrError::Schema(_)));
}

#[test]
fn test_orchestrators_over_prepared_batch() {
    let fx = fixture();
    let options = PipelineOptions::new(&fx.data_file, &fx.config);
    let prepared = prepare(&fx.config, &options, None).unwrap();

    let window = DateWindow::new(
        NaiveDate::from_ymd_opt(2025, 3, 3),
        NaiveDate::from_ymd_opt(2025, 3, 7),
    );
    let weekly = analyse(&WeeklyAnalysis::new(&fx.config.analysis, window), &prepared).unwrap();
    assert_eq!(weekly.total_records, 7);

    let fast = weekly.cohort("fast-return").unwrap();
    assert_eq!(fast.by_model.rows[0].label, "ThinkBook 14");
    assert_eq!(fast.by_model.rows[0].percentage, 66.7);

    let quality = weekly.cohort("quality-issue").unwrap();
    assert_eq!(quality.population, 4);
    assert_eq!(quality.filtered_population, 3);

    let issues = TopIssueAnalysis::new(2).run(&prepared.records).unwrap();
    assert_eq!(issues.breakdowns[0].category, "不想要了");
    assert_eq!(issues.breakdowns[0].count, 2);
    assert_eq!(issues.breakdowns[0].percentage, 25.0);

    let models = TopModelAnalysis::new(1, &fx.config.analysis)
        .run(&prepared.records)
        .unwrap();
    assert_eq!(models.profiles[0].summary.model_name, "ThinkBook 14");
    assert_eq!(models.profiles[0].summary.distinct_categories, 4);
}

#[tokio::test]
async fn test_weekly_publish_writes_artifacts() {
    let fx = fixture();
    let options = PipelineOptions::new(&fx.data_file, &fx.config);
    let prepared = prepare(&fx.config, &options, None).unwrap();
    let report = analyse(
        &WeeklyAnalysis::new(&fx.config.analysis, DateWindow::unbounded()),
        &prepared,
    )
    .unwrap();

    let out_dir = fx.config.output.output_dir.join("weekly");
    let summarizer = Summarizer::disabled(&fx.config.llm);
    let renderer = ChartRequestRenderer;
    let publisher = Publisher {
        writer: ArtifactWriter::new(&out_dir),
        renderer: &renderer,
        summarizer: &summarizer,
        style: fx.config.output.charts,
        batch_name: "test".to_string(),
    };

    let manifest = publisher.weekly(&prepared, &report).await;
    assert!(manifest.skipped.is_empty());

    let names = file_names(&out_dir);
    for expected in [
        "audit_reasons.csv",
        "fast-return_models.csv",
        "quality-issue_model_categories.csv",
        "weekly_payload.json",
        "weekly_report.txt",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }

    let payload_text = fs::read_to_string(out_dir.join("weekly_payload.json")).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&payload_text).unwrap();
    assert_eq!(payload["analysis"], "weekly");
    assert_eq!(payload["report"]["total_records"], 8);
    let summaries = payload["summaries"].as_array().unwrap();
    assert!(!summaries.is_empty());
    assert!(summaries
        .iter()
        .all(|s| s["source"] == serde_json::json!(SummarySource::Fallback)));
}

#[tokio::test]
async fn test_top_issue_publish_prompts_per_issue_and_overview() {
    let fx = fixture();
    let options = PipelineOptions::new(&fx.data_file, &fx.config);
    let prepared = prepare(&fx.config, &options, None).unwrap();
    let report = analyse(&TopIssueAnalysis::new(2), &prepared).unwrap();

    let prompts = Arc::new(Mutex::new(Vec::new()));
    let summarizer = Summarizer::new(Box::new(PromptLog(prompts.clone())), &fx.config.llm);
    let renderer = ChartRequestRenderer;
    let publisher = Publisher {
        writer: ArtifactWriter::new(fx.config.output.output_dir.join("top_issue")),
        renderer: &renderer,
        summarizer: &summarizer,
        style: fx.config.output.charts,
        batch_name: "test".to_string(),
    };
    let manifest = publisher.top_issue(&prepared, &report).await;
    assert!(manifest.skipped.is_empty());

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("ranks the top return issues"));
    assert!(prompts[0].contains("category\tcount\tshare\tcumulative"));
    assert!(prompts[1].contains("Issue: 不想要了"));
    assert!(prompts[1].contains("Affected units: 2 (25.00% of all returns)"));
    assert!(prompts[1].contains("model_name\tcount\tshare"));
    assert!(prompts[2].contains("Issue: 无法开机"));
}

#[tokio::test]
async fn test_weekly_record_dumps_follow_filtered_cohorts() {
    let fx = fixture();
    let options = PipelineOptions::new(&fx.data_file, &fx.config);
    let prepared = prepare(&fx.config, &options, None).unwrap();
    let analysis = WeeklyAnalysis::new(&fx.config.analysis, DateWindow::unbounded());
    let report = analyse(&analysis, &prepared).unwrap();

    let out_dir = fx.config.output.output_dir.join("weekly");
    let summarizer = Summarizer::disabled(&fx.config.llm);
    let renderer = ChartRequestRenderer;
    let mut publisher = Publisher {
        writer: ArtifactWriter::new(&out_dir),
        renderer: &renderer,
        summarizer: &summarizer,
        style: fx.config.output.charts,
        batch_name: "test".to_string(),
    };
    publisher.weekly_records(&analysis.partition(&prepared.records));
    publisher.weekly(&prepared, &report).await;

    let names = file_names(&out_dir);
    assert!(names.contains(&"ThinkBook 14_fast-return_records.csv".to_string()));
    assert!(names.contains(&"Yoga Pro 14s_quality-issue_records.csv".to_string()));

    // 5005 has no description, so ThinkBook 14 keeps one quality record
    let dump = fs::read_to_string(out_dir.join("ThinkBook 14_quality-issue_records.csv")).unwrap();
    assert_eq!(dump.lines().count(), 2);
    assert!(dump.contains("5004"));
    assert!(!dump.contains("5005"));
}
