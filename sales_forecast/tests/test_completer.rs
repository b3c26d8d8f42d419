use chrono::{Datelike, Months, NaiveDate};
use pretty_assertions::assert_eq;
use rstest::rstest;
use sales_forecast::completer::{CompleterConfig, SeriesCompleter};
use sales_forecast::config::{MonthActivity, MonthBasis};
use sales_forecast::data::{DataLoader, LeafKey, SalesEvent};
use sales_forecast::error::ForecastError;
use std::io::Write;
use tempfile::NamedTempFile;

/// One sale on the 15th of each of the first `months` months from January 2013
fn monthly_sales(shop_id: i64, item_id: i64, months: u32) -> Vec<SalesEvent> {
    let first = NaiveDate::from_ymd_opt(2013, 1, 15).unwrap();
    (0..months)
        .map(|m| {
            let date = first.checked_add_months(Months::new(m)).unwrap();
            SalesEvent {
                shop_id,
                item_id,
                date,
                date_block_num: ((date.year() - 2013) * 12) as i64 + date.month0() as i64,
                item_cnt_day: 1.0,
            }
        })
        .collect()
}

#[rstest]
#[case(33, false)]
#[case(34, true)]
#[case(36, true)]
fn test_history_threshold(#[case] months: u32, #[case] kept: bool) {
    let mut events = monthly_sales(1, 10, 36);
    events.extend(monthly_sales(1, 11, months));

    let completed = SeriesCompleter::default().complete(&events).unwrap();
    assert_eq!(completed.leaf(LeafKey::new(1, 11)).is_some(), kept);
    assert!(completed.leaf(LeafKey::new(1, 10)).is_some());
}

#[rstest]
#[case(MonthBasis::CalendarMonth)]
#[case(MonthBasis::DateBlock)]
fn test_threshold_holds_for_every_month_basis(#[case] month_basis: MonthBasis) {
    let completer = SeriesCompleter::new(CompleterConfig {
        month_basis,
        ..CompleterConfig::default()
    });

    assert!(matches!(
        completer.complete(&monthly_sales(3, 30, 33)),
        Err(ForecastError::NoQualifyingSeries(_))
    ));
    assert_eq!(completer.complete(&monthly_sales(3, 30, 34)).unwrap().len(), 1);
}

#[test]
fn test_zero_records_count_as_activity_by_default() {
    let events: Vec<SalesEvent> = monthly_sales(5, 50, 34)
        .into_iter()
        .map(|e| SalesEvent {
            item_cnt_day: 0.0,
            ..e
        })
        .collect();

    let completed = SeriesCompleter::default().complete(&events).unwrap();
    assert!(completed.leaves()[0].values.iter().all(|v| *v == 0.0));

    let strict = SeriesCompleter::new(CompleterConfig {
        month_activity: MonthActivity::NonZero,
        ..CompleterConfig::default()
    });
    assert!(strict.complete(&events).is_err());
}

#[test]
fn test_series_share_one_gap_free_window() {
    let mut events = monthly_sales(1, 10, 36);
    // Starts two months later but still has 34 active months
    events.extend(monthly_sales(2, 20, 36).into_iter().skip(2));

    let completed = SeriesCompleter::default().complete(&events).unwrap();
    let days = completed.dates();
    assert_eq!(days.first().copied(), Some(NaiveDate::from_ymd_opt(2013, 1, 15).unwrap()));
    assert!(days.windows(2).all(|w| (w[1] - w[0]).num_days() == 1));

    let late = completed.leaf(LeafKey::new(2, 20)).unwrap();
    assert_eq!(late.values.len(), days.len());
    assert!(late.values[..59].iter().all(|v| *v == 0.0));
    assert_eq!(late.values[59], 1.0);
}

#[test]
fn test_raw_file_round_trip_through_prepared_file() {
    let mut raw = NamedTempFile::new().unwrap();
    writeln!(raw, "date,date_block_num,shop_id,item_id,item_price,item_cnt_day").unwrap();
    for event in monthly_sales(7, 70, 34) {
        writeln!(
            raw,
            "{},{},7,70,10.0,2.0",
            event.date.format("%d.%m.%Y"),
            event.date_block_num
        )
        .unwrap();
    }
    writeln!(raw, "16.01.2013,0,7,70,10.0,-1.0").unwrap();

    let events = DataLoader::load_sales(raw.path(), "%d.%m.%Y").unwrap();
    assert_eq!(events.len(), 35);
    let completed = SeriesCompleter::default().complete(&events).unwrap();

    let prepared = NamedTempFile::new().unwrap();
    DataLoader::write_prepared(prepared.path(), &completed).unwrap();
    let reloaded = DataLoader::load_prepared(prepared.path()).unwrap();

    assert_eq!(reloaded, completed);
    assert_eq!(reloaded.leaves()[0].values[..2].to_vec(), vec![2.0, -1.0]);
}

#[test]
fn test_bad_dates_are_reported() {
    let mut raw = NamedTempFile::new().unwrap();
    writeln!(raw, "date,date_block_num,shop_id,item_id,item_cnt_day").unwrap();
    writeln!(raw, "2013-01-02,0,1,1,1.0").unwrap();

    assert!(DataLoader::load_sales(raw.path(), "%d.%m.%Y").is_err());
}
