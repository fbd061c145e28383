use std::fs;

use planned_inference::analysis::{AnalysisConfig, Mode, run_analysis};
use planned_inference::report::{JSON_REPORT_FILE, TEXT_REPORT_FILE};
use planned_inference::{ModelDims, ProfilerConfig};

fn quick_config(mode: Mode) -> AnalysisConfig {
    AnalysisConfig {
        input: "0.5, 1.2, -0.3".to_string(),
        batch_size: 4,
        mode,
        dims: ModelDims::new(16, 64, 8),
        profiler: ProfilerConfig {
            warmup_iterations: 1,
            measured_iterations: 3,
        },
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_save_writes_json_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("reports");
    let report = run_analysis(&quick_config(Mode::Both)).unwrap();

    let (json_path, text_path) = report.save(&target).unwrap();
    assert_eq!(json_path, target.join(JSON_REPORT_FILE));
    assert_eq!(text_path, target.join(TEXT_REPORT_FILE));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(json["mode"], "both");
    assert_eq!(json["batch_size"], 4);
    assert_eq!(json["dims"]["hidden_dim"], 64);
    assert_eq!(json["input_preview"], "0.5, 1.2, -0.3...");
    assert_eq!(json["optimized"]["allocation_events"], 0);
    assert_eq!(json["baseline"]["allocation_events"], 9);
    assert_eq!(json["plan"]["buffer_count"], 2);
    assert_eq!(json["comparison"]["verification"]["passed"], true);

    let text = fs::read_to_string(text_path).unwrap();
    assert!(text.starts_with("ML EXECUTION ANALYSIS REPORT"));
    assert!(text.contains("COMPARISON SUMMARY"));
    assert!(text.contains("Correctness: PASS"));
}

#[test]
fn test_optimized_only_report() {
    let report = run_analysis(&quick_config(Mode::Optimized)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert!(json.get("baseline").is_none());
    assert!(json.get("comparison").is_none());
    assert_eq!(json["plan"]["step_count"], 2);

    let text = report.render_text();
    assert!(text.contains("OPTIMIZED EXECUTION"));
    assert!(!text.contains("BASELINE EXECUTION"));
}

#[test]
fn test_unfused_plan_is_reported() {
    let mut config = quick_config(Mode::Both);
    config.planner.fuse_elementwise = false;
    let report = run_analysis(&config).unwrap();

    let plan = report.plan.as_ref().unwrap();
    assert_eq!(plan.step_count, 3);
    assert_eq!(plan.fused_pairs, 0);
    let comparison = report.comparison.as_ref().unwrap();
    assert!(comparison.verification.passed);
    assert_eq!(comparison.memory_reduction_percent, 0.0);
}
