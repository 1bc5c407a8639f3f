// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/aggregate.rs - 观测日志汇总
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  frame::Timestamp,
  geometry::round2,
  registry::{Observation, TrackId},
};

/// 观测日志的汇总结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
  /// 每个时间戳上出现的不同目标数
  pub counts_by_timestamp: BTreeMap<Timestamp, usize>,
  /// 每个目标的平均体型指标
  pub summary_by_track: BTreeMap<TrackId, f64>,
  /// 同一时间戳上的最大目标数
  pub max_concurrent: usize,
}

impl Summary {
  pub fn is_empty(&self) -> bool {
    self.counts_by_timestamp.is_empty()
  }

  /// 出现过的不同时间戳数量
  pub fn total_timestamps(&self) -> usize {
    self.counts_by_timestamp.len()
  }
}

/// 每个时间戳的不同目标数
pub fn counts_by_timestamp<'a, I>(log: I) -> BTreeMap<Timestamp, usize>
where
  I: IntoIterator<Item = &'a Observation>,
{
  let mut ids: BTreeMap<Timestamp, BTreeSet<TrackId>> = BTreeMap::new();
  for observation in log {
    ids
      .entry(observation.timestamp())
      .or_default()
      .insert(observation.track_id());
  }
  ids
    .into_iter()
    .map(|(timestamp, ids)| (timestamp, ids.len()))
    .collect()
}

/// 每个目标全部观测的平均体型指标，保留两位小数
pub fn summary_by_track<'a, I>(log: I) -> BTreeMap<TrackId, f64>
where
  I: IntoIterator<Item = &'a Observation>,
{
  let mut sums: BTreeMap<TrackId, (f64, usize)> = BTreeMap::new();
  for observation in log {
    let entry = sums.entry(observation.track_id()).or_insert((0.0, 0));
    entry.0 += observation.weight_index();
    entry.1 += 1;
  }
  sums
    .into_iter()
    .map(|(id, (sum, count))| (id, round2(sum / count as f64)))
    .collect()
}

pub fn summarize<'a, I>(log: I) -> Summary
where
  I: IntoIterator<Item = &'a Observation> + Copy,
{
  let counts_by_timestamp = counts_by_timestamp(log);
  let max_concurrent = counts_by_timestamp.values().copied().max().unwrap_or(0);
  Summary {
    counts_by_timestamp,
    summary_by_track: summary_by_track(log),
    max_concurrent,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::ObservationLog;

  fn t(centis: u64) -> Timestamp {
    Timestamp::from_centis(centis)
  }

  #[test]
  fn empty_log_summarizes_to_nothing() {
    let log = ObservationLog::new();
    let summary = summarize(&log);
    assert!(summary.is_empty());
    assert!(summary.summary_by_track.is_empty());
    assert_eq!(summary.max_concurrent, 0);
    assert_eq!(summary, Summary::default());
  }

  #[test]
  fn counts_distinct_ids_per_timestamp() {
    let mut log = ObservationLog::new();
    log.record(t(3), 1, Some(1.0));
    log.record(t(7), 1, Some(1.0));
    log.record(t(7), 2, Some(1.0));
    // 同一时间戳重复出现的编号只计一次
    log.record(t(7), 2, Some(3.0));
    log.record(t(10), 3, Some(2.0));

    let counts = counts_by_timestamp(&log);
    assert_eq!(counts.get(&t(3)), Some(&1));
    assert_eq!(counts.get(&t(7)), Some(&2));
    assert_eq!(counts.get(&t(10)), Some(&1));
    assert_eq!(summarize(&log).max_concurrent, 2);
  }

  #[test]
  fn means_are_rounded() {
    let mut log = ObservationLog::new();
    log.record(t(1), 9, Some(1.0));
    log.record(t(2), 9, Some(1.0));
    log.record(t(3), 9, Some(2.0));
    let means = summary_by_track(&log);
    assert_eq!(means.get(&9), Some(&1.33));
  }

  #[test]
  fn single_observation() {
    let mut log = ObservationLog::new();
    log.record(t(4), 42, Some(2.5));
    let summary = summarize(&log);
    assert_eq!(summary.total_timestamps(), 1);
    assert_eq!(summary.summary_by_track.get(&42), Some(&2.5));
    assert_eq!(summary.max_concurrent, 1);
  }

  #[test]
  fn summarize_is_idempotent() {
    let mut log = ObservationLog::new();
    log.record(t(4), 5, Some(4.0));
    log.record(t(8), 5, Some(4.0));
    log.record(t(8), 7, Some(4.0));
    let first = summarize(&log);
    let second = summarize(&log);
    assert_eq!(first, second);
    assert_eq!(log.len(), 3);
  }

  #[test]
  fn timestamps_are_ordered() {
    let mut log = ObservationLog::new();
    for centis in [4, 8, 12, 100, 104] {
      log.record(t(centis), 1, Some(1.0));
    }
    let keys: Vec<_> = summarize(&log).counts_by_timestamp.into_keys().collect();
    assert_eq!(keys, vec![t(4), t(8), t(12), t(100), t(104)]);
  }
}
