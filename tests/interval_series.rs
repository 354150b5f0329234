//! 区间序列集成测试
//! Interval series integration tests

mod common;

use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use valkit::intervals::IntervalSeries;
use valkit::pool::Pool;

async fn assert_get(series: &IntervalSeries, pool: &Pool, field: &str, expected: &[i64]) {
  assert_eq!(
    series.get(pool, field).await.unwrap(),
    expected,
    "unexpected series for field {field}"
  );
}

async fn assert_total(series: &IntervalSeries, pool: &Pool, field: &str, expected: i64) {
  assert_eq!(series.total(pool, field).await.unwrap(), expected);
}

async fn assert_bucket(pool: &Pool, key: &str, expected: &[(&str, &str)]) {
  let mut conn = pool.get().await.unwrap();
  let expected: HashMap<String, String> = expected
    .iter()
    .map(|(f, v)| (f.to_string(), v.to_string()))
    .collect();
  assert_eq!(common::hgetall(&mut conn, key).await, expected, "bucket {key} mismatch");
}

#[tokio::test]
async fn windowed_counters() {
  let pool = common::test_pool();
  common::flush_keys(&pool, "{iseries_test}*").await;

  let clock = common::TestClock::new(Utc.with_ymd_and_hms(2021, 11, 18, 12, 7, 3).unwrap());

  // 5 分钟 x 5 个桶的序列
  // a 5 minute x 5 bucket series
  let series = IntervalSeries::new("iseries_test", Duration::from_secs(5 * 60), 5)
    .with_now(clock.now_fn());

  series.record(&pool, "A", 2).await.unwrap();

  // 时间前进但还在同一个区间里
  // time moves forward but stays within the interval
  clock.set(Utc.with_ymd_and_hms(2021, 11, 18, 12, 9, 3).unwrap());

  series.record(&pool, "A", 7).await.unwrap();
  series.record(&pool, "B", 4).await.unwrap();

  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:05", &[("A", "9"), ("B", "4")]).await;

  assert_get(&series, &pool, "A", &[9, 0, 0, 0, 0]).await;
  assert_get(&series, &pool, "B", &[4, 0, 0, 0, 0]).await;
  assert_get(&series, &pool, "C", &[0, 0, 0, 0, 0]).await;
  assert_total(&series, &pool, "A", 9).await;
  assert_total(&series, &pool, "B", 4).await;
  assert_total(&series, &pool, "C", 0).await;

  // 进入下一个区间
  // move into the next interval
  clock.set(Utc.with_ymd_and_hms(2021, 11, 18, 12, 11, 3).unwrap());

  series.record(&pool, "A", 3).await.unwrap();
  series.record(&pool, "B", 2).await.unwrap();

  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:10", &[("A", "3"), ("B", "2")]).await;
  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:05", &[("A", "9"), ("B", "4")]).await;

  assert_get(&series, &pool, "A", &[3, 9, 0, 0, 0]).await;
  assert_get(&series, &pool, "B", &[2, 4, 0, 0, 0]).await;
  assert_total(&series, &pool, "A", 12).await;
  assert_total(&series, &pool, "B", 6).await;

  // 一口气跳过三个区间
  // jump three intervals ahead
  clock.set(Utc.with_ymd_and_hms(2021, 11, 18, 12, 26, 3).unwrap());

  series.record(&pool, "A", 10).await.unwrap();
  series.record(&pool, "B", 1).await.unwrap();

  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:25", &[("A", "10"), ("B", "1")]).await;
  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:20", &[]).await;
  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:15", &[]).await;

  assert_get(&series, &pool, "A", &[10, 0, 0, 3, 9]).await;
  assert_get(&series, &pool, "B", &[1, 0, 0, 2, 4]).await;
  assert_get(&series, &pool, "C", &[0, 0, 0, 0, 0]).await;
  assert_total(&series, &pool, "A", 22).await;
  assert_total(&series, &pool, "B", 7).await;

  // 最旧的桶滑出窗口后就不再计入
  // the oldest bucket stops counting once it slides out of the window
  clock.set(Utc.with_ymd_and_hms(2021, 11, 18, 12, 30, 3).unwrap());

  series.record(&pool, "A", 1).await.unwrap();

  assert_bucket(&pool, "{iseries_test}:2021-11-18T12:30", &[("A", "1")]).await;

  assert_get(&series, &pool, "A", &[1, 10, 0, 0, 3]).await;
  assert_get(&series, &pool, "B", &[0, 1, 0, 0, 2]).await;
  assert_get(&series, &pool, "C", &[0, 0, 0, 0, 0]).await;
  assert_total(&series, &pool, "A", 14).await;
  assert_total(&series, &pool, "B", 3).await;
}
