use chrono::{Datelike, Days, NaiveDate};
use sales_forecast::completer::{CompleterConfig, SeriesCompleter};
use sales_forecast::data::SalesEvent;
use sales_forecast::forecaster::{forecast_all, LevelForecaster};
use sales_forecast::hierarchy::HierarchyBuilder;
use sales_forecast::logging::init_logging;
use sales_forecast::models::{AutoEts, TrainedForecastModel};
use sales_forecast::reconcile::{check_coherence, BottomUp, MinTrace, MinTraceMethod, Reconciler, COHERENCE_TOLERANCE};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);

    println!("Sales Forecast: Synthetic Hierarchy Example");
    println!("===========================================\n");

    let events = create_sample_sales();
    println!("Created {} sales records\n", events.len());

    // One year of history, so every month must be active
    let completed = SeriesCompleter::new(CompleterConfig {
        min_months: 12,
        ..CompleterConfig::default()
    })
    .complete(&events)?;
    println!(
        "Completed {} leaf series over {} days ({} to {})",
        completed.leaves().len(),
        completed.days(),
        completed.start(),
        completed.end()
    );

    let hierarchy = HierarchyBuilder::default().build(&completed)?;
    for tag in hierarchy.tags().levels() {
        println!("  {:<24} {} series", tag.name, tag.series_ids.len());
    }
    println!();

    let forecaster = LevelForecaster::new(AutoEts::new(7)?);
    let outcome = forecaster.fit_all(&hierarchy);
    for model in &outcome.models {
        println!("  {:<16} {}", model.series_id, model.model.name());
    }
    println!("  {} fits fell back to the naive model\n", outcome.failures.len());

    let base = forecast_all(&outcome.models, &hierarchy, 14)?;
    let reconcilers: Vec<Box<dyn Reconciler>> = vec![
        Box::new(MinTrace::default()),
        Box::new(MinTrace::new(MinTraceMethod::WlsStruct, true)),
        Box::new(BottomUp),
    ];

    println!("{:<44} {:>12} {:>12}", "Reconciler", "Total day 1", "Total day 14");
    for reconciler in reconcilers {
        let reconciled = reconciler.reconcile(&base, &hierarchy)?;
        check_coherence(&reconciled, &hierarchy, COHERENCE_TOLERANCE)?;
        let total = reconciled.get("Total").ok_or("missing Total")?;
        println!(
            "{:<44} {:>12.2} {:>12.2}",
            reconciler.name(),
            total[0],
            total[total.len() - 1]
        );
    }

    Ok(())
}

/// Three stores, two items each, one year of sales with a weekly pattern
fn create_sample_sales() -> Vec<SalesEvent> {
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
    let mut events = Vec::new();

    for offset in 0..365u64 {
        let date = start + Days::new(offset);
        let weekday = date.weekday().num_days_from_monday() as f64;
        let block = date.month0() as i64;

        for shop_id in 1..=3i64 {
            for item_id in [100i64, 200] {
                let level = (shop_id * 2 + item_id / 100) as f64;
                let count = (level + (weekday / 7.0 * std::f64::consts::TAU).sin() * level / 2.0).round();
                // Sparse: item 200 only sells every other day
                if item_id == 200 && offset % 2 == 1 {
                    continue;
                }
                events.push(SalesEvent {
                    shop_id,
                    item_id,
                    date,
                    date_block_num: block,
                    item_cnt_day: count.max(0.0),
                });
            }
        }
    }

    events
}
