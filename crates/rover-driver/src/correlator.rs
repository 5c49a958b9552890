//! 检测关联器
//!
//! 维护 label -> 时间区间的映射，回答"某时刻经过的障碍物对应哪个标签"。
//!
//! # 匹配规则
//!
//! 查询窗口 `[t - lead, t + lag]` 与每个区间 `[first_seen, last_seen]` 求重叠：
//! `max(0, min(end) - max(start))`。取重叠严格为正且最大的标签；
//! 按到达顺序扫描、用 `>=` 替换，因此重叠相同时后到达的标签胜出。
//! 黑名单中的标签不参与匹配，也不再记录新的观测。
//!
//! 所有操作在同一把 `parking_lot::Mutex` 下完成，观测与查询可以并发调用。

use parking_lot::Mutex;
use rover_protocol::Detection;
use rover_tools::DetectionSettings;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

/// 单个标签的观测区间
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LabelInterval {
    /// 首次观测时间（ns）
    pub first_seen: u64,
    /// 最近观测时间（ns），始终 >= first_seen
    pub last_seen: u64,
    /// 观测到的最高置信度
    pub best_confidence: f32,
    /// 观测次数
    pub observations: u64,
    /// 首次插入顺序（用于平局裁决）
    pub arrival: u64,
}

impl LabelInterval {
    /// 与 `[start, end]` 的重叠长度（ns）
    #[inline]
    pub fn overlap(&self, start: u64, end: u64) -> u64 {
        self.last_seen
            .min(end)
            .saturating_sub(self.first_seen.max(start))
    }
}

/// 匹配结果
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatch {
    pub label: String,
    pub overlap_ns: u64,
    pub confidence: f32,
}

/// 检测事件过滤器
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    /// 最低置信度
    pub min_confidence: f32,
    /// 静态排除的标签
    pub excluded_labels: HashSet<String>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::from_settings(&DetectionSettings::default())
    }
}

impl DetectionFilter {
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self {
            min_confidence: settings.min_confidence,
            excluded_labels: settings.excluded_labels.iter().cloned().collect(),
        }
    }

    /// 不过滤任何事件
    pub fn accept_all() -> Self {
        Self {
            min_confidence: 0.0,
            excluded_labels: HashSet::new(),
        }
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence
            && !self.excluded_labels.contains(&detection.label)
    }
}

#[derive(Debug, Default)]
struct Inner {
    intervals: HashMap<String, LabelInterval>,
    blacklist: HashSet<String>,
    next_arrival: u64,
}

impl Inner {
    fn observe(&mut self, label: &str, now: u64, confidence: f32) -> bool {
        if self.blacklist.contains(label) {
            trace!("Ignoring blacklisted label {}", label);
            return false;
        }
        match self.intervals.get_mut(label) {
            Some(interval) => {
                interval.first_seen = interval.first_seen.min(now);
                interval.last_seen = interval.last_seen.max(now);
                interval.best_confidence = interval.best_confidence.max(confidence);
                interval.observations += 1;
            },
            None => {
                let arrival = self.next_arrival;
                self.next_arrival += 1;
                self.intervals.insert(
                    label.to_string(),
                    LabelInterval {
                        first_seen: now,
                        last_seen: now,
                        best_confidence: confidence,
                        observations: 1,
                        arrival,
                    },
                );
            },
        }
        true
    }
}

/// 检测关联器
#[derive(Debug, Default)]
pub struct Correlator {
    filter: DetectionFilter,
    inner: Mutex<Inner>,
}

impl Correlator {
    pub fn new(filter: DetectionFilter) -> Self {
        Self {
            filter,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn filter(&self) -> &DetectionFilter {
        &self.filter
    }

    /// 记录一次观测（不经过过滤器）
    ///
    /// 返回 false 表示标签在黑名单中被忽略。
    pub fn observe(&self, label: &str, now: u64) -> bool {
        self.inner.lock().observe(label, now, 0.0)
    }

    /// 过滤后记录检测事件
    pub fn ingest(&self, detection: &Detection) -> bool {
        if !self.filter.accepts(detection) {
            trace!(
                "Filtered detection {} ({:.2})",
                detection.label, detection.confidence
            );
            return false;
        }
        self.inner
            .lock()
            .observe(&detection.label, detection.timestamp_ns, detection.confidence)
    }

    /// 以 `query_time` 为中心查询最佳匹配
    pub fn match_window(&self, query_time: u64, lead: Duration, lag: Duration) -> Option<LabelMatch> {
        let start = query_time.saturating_sub(lead.as_nanos() as u64);
        let end = query_time.saturating_add(lag.as_nanos() as u64);

        let inner = self.inner.lock();
        let mut candidates: Vec<(&String, &LabelInterval)> = inner
            .intervals
            .iter()
            .filter(|(label, _)| !inner.blacklist.contains(*label))
            .collect();
        candidates.sort_by_key(|(_, interval)| interval.arrival);

        let mut best: Option<LabelMatch> = None;
        for (label, interval) in candidates {
            let overlap = interval.overlap(start, end);
            if overlap == 0 {
                continue;
            }
            if best.as_ref().is_none_or(|b| overlap >= b.overlap_ns) {
                best = Some(LabelMatch {
                    label: label.clone(),
                    overlap_ns: overlap,
                    confidence: interval.best_confidence,
                });
            }
        }

        debug!(
            "Match query at {} window [{}, {}]: {:?}",
            query_time,
            start,
            end,
            best.as_ref().map(|m| m.label.as_str())
        );
        best
    }

    /// 标记标签已被匹配：加入黑名单，按需释放区间
    pub fn consume(&self, label: &str, evict: bool) {
        let mut inner = self.inner.lock();
        inner.blacklist.insert(label.to_string());
        if evict {
            inner.intervals.remove(label);
        }
    }

    /// 释放区间（不加入黑名单）
    pub fn evict(&self, label: &str) -> Option<LabelInterval> {
        self.inner.lock().intervals.remove(label)
    }

    pub fn is_blacklisted(&self, label: &str) -> bool {
        self.inner.lock().blacklist.contains(label)
    }

    pub fn blacklist(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.inner.lock().blacklist.iter().cloned().collect();
        labels.sort();
        labels
    }

    /// 按到达顺序排列的区间快照
    pub fn snapshot(&self) -> Vec<(String, LabelInterval)> {
        let inner = self.inner.lock();
        let mut entries: Vec<(String, LabelInterval)> = inner
            .intervals
            .iter()
            .map(|(label, interval)| (label.clone(), interval.clone()))
            .collect();
        entries.sort_by_key(|(_, interval)| interval.arrival);
        entries
    }

    /// 清空区间与黑名单（每次任务开始时调用）
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.intervals.clear();
        inner.blacklist.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAD: Duration = Duration::from_nanos(750);
    const LAG: Duration = Duration::from_nanos(1500);

    #[test]
    fn test_overlap_match() {
        let correlator = Correlator::default();
        correlator.observe("A", 1000);
        correlator.observe("A", 2000);

        let m = correlator.match_window(2500, LEAD, LAG).unwrap();
        assert_eq!(m.label, "A");
        assert_eq!(m.overlap_ns, 250);
    }

    #[test]
    fn test_blacklisted_label_never_matches() {
        let correlator = Correlator::default();
        correlator.observe("A", 1000);
        correlator.observe("A", 2000);
        correlator.consume("A", false);

        assert!(correlator.match_window(2500, LEAD, LAG).is_none());
        assert!(!correlator.observe("A", 2600));
        assert!(correlator.match_window(2500, LEAD, LAG).is_none());
        assert!(correlator.is_blacklisted("A"));
    }

    #[test]
    fn test_no_positive_overlap_is_none() {
        let correlator = Correlator::default();
        correlator.observe("A", 100);
        correlator.observe("A", 200);
        // 单次观测的区间长度为 0
        correlator.observe("B", 2500);
        assert!(correlator.match_window(2500, LEAD, LAG).is_none());
    }

    #[test]
    fn test_largest_overlap_wins_and_ties_go_to_later_arrival() {
        let correlator = Correlator::default();
        for (label, a, b) in [("A", 1000, 1900), ("B", 1800, 3000), ("C", 1800, 3000)] {
            correlator.observe(label, a);
            correlator.observe(label, b);
        }
        // 窗口 [1750, 4000]：A=150，B=C=1200，C 后到达
        assert_eq!(correlator.match_window(2500, LEAD, LAG).unwrap().label, "C");

        // 释放后重新观测的标签排到最后
        correlator.evict("B");
        correlator.observe("B", 1800);
        correlator.observe("B", 3000);
        assert_eq!(correlator.match_window(2500, LEAD, LAG).unwrap().label, "B");
    }

    #[test]
    fn test_interval_never_shrinks() {
        let correlator = Correlator::default();
        correlator.observe("A", 500);
        correlator.observe("A", 300);
        correlator.observe("A", 400);
        let snapshot = correlator.snapshot();
        assert_eq!(snapshot[0].1.first_seen, 300);
        assert_eq!(snapshot[0].1.last_seen, 500);
        assert_eq!(snapshot[0].1.observations, 3);
    }

    #[test]
    fn test_ingest_applies_filter() {
        let correlator = Correlator::new(DetectionFilter::default());
        assert!(!correlator.ingest(&Detection::new("12", 0.5, 10)));
        assert!(!correlator.ingest(&Detection::new("45", 0.99, 10)));
        assert!(correlator.ingest(&Detection::new("12", 0.9, 10)));
        assert!(correlator.ingest(&Detection::new("12", 0.8, 20)));

        let snapshot = correlator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!((snapshot[0].1.best_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_consume_with_eviction_and_reset() {
        let correlator = Correlator::default();
        correlator.observe("A", 1);
        correlator.observe("B", 1);
        correlator.consume("A", true);
        correlator.consume("B", false);
        let labels: Vec<String> = correlator.snapshot().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["B".to_string()]);
        assert_eq!(correlator.blacklist(), vec!["A".to_string(), "B".to_string()]);

        correlator.reset();
        assert!(correlator.snapshot().is_empty());
        assert!(!correlator.is_blacklisted("A"));
    }
}
