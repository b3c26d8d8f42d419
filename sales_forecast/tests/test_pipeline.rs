use approx::assert_relative_eq;
use chrono::{Datelike, Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sales_forecast::artifacts::{ModelBundle, BUNDLE_FILE_NAME};
use sales_forecast::config::{ModelFamily, PipelineConfig};
use sales_forecast::error::ForecastError;
use sales_forecast::models::{FittedModel, TrainedForecastModel};
use sales_forecast::pipeline;
use sales_forecast::reconcile::{check_coherence, COHERENCE_TOLERANCE};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const ZERO_SHOP: i64 = 2;
const ZERO_ITEM: i64 = 20;

#[derive(Debug, Deserialize)]
struct PredictionRow {
    shop_id: i64,
    item_id: i64,
    ds: String,
    forecast: f64,
    base_forecast: f64,
}

/// Two stores with two items each over 2013-01-01..=2015-12-31.
/// Item 20 of store 2 only ever records zero sales.
fn write_raw_sales(path: &Path) {
    let mut rng = StdRng::seed_from_u64(42);
    let start = NaiveDate::from_ymd_opt(2013, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2015, 12, 31).unwrap();

    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "date,date_block_num,shop_id,item_id,item_price,item_cnt_day").unwrap();

    let mut day = start;
    while day <= end {
        let block = (day.year() - 2013) as i64 * 12 + day.month0() as i64;
        let weekly = 1.0 + (day.weekday().num_days_from_monday() % 7) as f64 * 0.3;
        for (shop, item) in [(1, 10), (1, 20), (2, 10), (ZERO_SHOP, ZERO_ITEM)] {
            let count = if (shop, item) == (ZERO_SHOP, ZERO_ITEM) {
                if day.day() != 1 {
                    continue;
                }
                0.0
            } else if day.day() == 1 || day == end || rng.gen_bool(0.6) {
                (rng.gen_range(1..=4) as f64 * weekly).round()
            } else {
                continue;
            };
            writeln!(
                file,
                "{},{},{},{},{:.2},{:.1}",
                day.format("%d.%m.%Y"),
                block,
                shop,
                item,
                99.0,
                count
            )
            .unwrap();
        }
        day = day.checked_add_days(Days::new(1)).unwrap();
    }
}

fn config_in(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        raw_path: dir.path().join("raw.csv"),
        prepared_path: dir.path().join("prep.csv"),
        model_dir: dir.path().join("model"),
        output_dir: dir.path().join("out"),
        ..PipelineConfig::default()
    }
}

#[test]
fn test_end_to_end_two_stores_two_items() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    write_raw_sales(&config.raw_path);

    let prepared = pipeline::prepare(&config).unwrap();
    assert_eq!(prepared.leaves, 4);
    assert_eq!(prepared.start, NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());
    assert_eq!(prepared.end, NaiveDate::from_ymd_opt(2015, 12, 31).unwrap());

    let trained = pipeline::train(&config).unwrap();
    assert_eq!(trained.series, 7);
    assert_eq!(trained.leaves, 4);

    let bundle = ModelBundle::load(&config.model_dir).unwrap();
    let tags = bundle.hierarchy.tags();
    assert_eq!(tags.get("total").unwrap().len(), 1);
    assert_eq!(tags.get("total/shop_id").unwrap().len(), 2);
    assert_eq!(tags.get("total/shop_id/item_id").unwrap().len(), 4);

    let forecast = pipeline::forecast_bundle(&bundle, &config).unwrap();
    let reconciled = &forecast.reconciled;
    assert_eq!(reconciled.horizon(), 30);
    assert_eq!(reconciled.dates()[0], NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
    check_coherence(reconciled, &bundle.hierarchy, COHERENCE_TOLERANCE).unwrap();

    let total = reconciled.get("Total").unwrap();
    let store_1 = reconciled.get("Total/1").unwrap();
    let store_2 = reconciled.get("Total/2").unwrap();
    for step in 0..30 {
        assert_relative_eq!(total[step], store_1[step] + store_2[step], max_relative = 1e-6, epsilon = 1e-9);
        let items_1 = reconciled.get("Total/1/10").unwrap()[step] + reconciled.get("Total/1/20").unwrap()[step];
        assert_relative_eq!(store_1[step], items_1, max_relative = 1e-6, epsilon = 1e-9);
    }
    assert!(reconciled.values().iter().all(|v| v.is_finite() && *v >= 0.0));

    let inferred = pipeline::infer(&config).unwrap();
    assert_eq!(inferred.rows, 4 * 30);
    let name = inferred.predictions_path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("predictions_") && name.ends_with(".csv"));

    let mut reader = csv::Reader::from_path(&inferred.predictions_path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["shop_id", "item_id", "ds", "forecast", "base_forecast"]
    );
    let rows: Vec<PredictionRow> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 120);
    assert_eq!(rows[0].ds, "2016-01-01");
    assert!(rows.iter().all(|r| r.forecast >= 0.0 && r.base_forecast.is_finite()));

    let leaves: BTreeSet<(i64, i64)> = rows.iter().map(|r| (r.shop_id, r.item_id)).collect();
    assert_eq!(
        leaves,
        BTreeSet::from([(1, 10), (1, 20), (2, 10), (ZERO_SHOP, ZERO_ITEM)])
    );
    for (shop_id, item_id) in leaves {
        let id = format!("Total/{}/{}", shop_id, item_id);
        let base = forecast.base.get(&id).unwrap();
        let exported: Vec<f64> = rows
            .iter()
            .filter(|r| (r.shop_id, r.item_id) == (shop_id, item_id))
            .map(|r| r.base_forecast)
            .collect();
        assert_eq!(exported.len(), 30);
        assert_relative_eq!(exported[0], base[0], epsilon = 1e-9);
    }
}

#[test]
fn test_simple_smoothing_family_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        model: ModelFamily::Ses,
        ses_alpha: 0.2,
        horizon: 7,
        ..config_in(&dir)
    };
    write_raw_sales(&config.raw_path);

    let summary = pipeline::run(&config).unwrap();
    assert_eq!(summary.prepare.leaves, 4);
    assert!(summary.train.model_name.contains("alpha=0.2"));
    assert_eq!(summary.infer.rows, 4 * 7);

    let bundle = ModelBundle::load(&config.model_dir).unwrap();
    assert!(bundle
        .models
        .iter()
        .all(|m| matches!(m.model, FittedModel::Smoothing { .. } | FittedModel::Constant { .. })));
}

#[test]
fn test_constant_zero_leaf_forecasts_zeros() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    write_raw_sales(&config.raw_path);

    pipeline::prepare(&config).unwrap();
    let completed = sales_forecast::DataLoader::load_prepared(&config.prepared_path).unwrap();
    let bundle = pipeline::train_in_memory(&completed, &config).unwrap();

    let id = format!("Total/{}/{}", ZERO_SHOP, ZERO_ITEM);
    let index = bundle.hierarchy.index_of(&id).unwrap();
    assert_eq!(bundle.models[index].model, FittedModel::Constant { value: 0.0 });
    assert!(bundle.failures.iter().all(|f| f.series_id != id));

    let history = &bundle.hierarchy.series()[index].values;
    let values = bundle.models[index].model.forecast(history, 30).unwrap().into_values();
    assert_eq!(values, vec![0.0; 30]);

    let forecast = pipeline::forecast_bundle(&bundle, &config).unwrap();
    assert!(forecast.base.get(&id).unwrap().iter().all(|v| *v == 0.0));
    assert!(forecast.reconciled.get(&id).unwrap().iter().all(|v| *v >= 0.0));
}

#[test]
fn test_missing_columns_fail_before_writing() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    fs::write(
        &config.raw_path,
        "date,date_block_num,shop_id,item_id\n01.01.2013,0,1,10\n",
    )
    .unwrap();

    match pipeline::prepare(&config) {
        Err(ForecastError::MissingColumns { columns, .. }) => {
            assert_eq!(columns, vec!["item_cnt_day".to_string()]);
        }
        other => panic!("expected missing columns, got {:?}", other),
    }
    assert!(!config.prepared_path.exists());
}

#[test]
fn test_no_qualifying_series_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    fs::write(
        &config.raw_path,
        "date,date_block_num,shop_id,item_id,item_price,item_cnt_day\n01.01.2013,0,1,10,5.0,1.0\n",
    )
    .unwrap();

    assert!(matches!(
        pipeline::prepare(&config),
        Err(ForecastError::NoQualifyingSeries(_))
    ));
}

#[test]
fn test_infer_without_bundle_is_an_artifact_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    assert!(matches!(
        pipeline::infer(&config),
        Err(ForecastError::ArtifactMismatch(_))
    ));
}

#[test]
fn test_tampered_bundle_is_an_artifact_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        season_length: 7,
        ..config_in(&dir)
    };
    write_raw_sales(&config.raw_path);
    pipeline::prepare(&config).unwrap();
    pipeline::train(&config).unwrap();

    let path = config.model_dir.join(BUNDLE_FILE_NAME);
    let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    json["models"].as_array_mut().unwrap().pop();
    fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    assert!(matches!(
        pipeline::infer(&config),
        Err(ForecastError::ArtifactMismatch(_))
    ));
    assert!(!config.output_dir.exists());
}
