//! Worker 数据模型：状态、配置、日程、代理策略、活动日志与只读投影

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::health::{derive_health, HealthStatus};
use crate::command::{Action, Platform};

/// Worker ID
pub type WorkerId = String;

/// Worker 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Running,
    Paused,
    Error,
}

impl WorkerStatus {
    /// 是否允许 start（running 时 start 为幂等空操作）
    pub fn can_start(&self) -> bool {
        matches!(self, WorkerStatus::Idle | WorkerStatus::Paused | WorkerStatus::Error)
    }
}

/// 当前代理分配的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    /// 已分配可用代理
    Active,
    /// 未分配代理
    Inactive,
    /// 最近一次轮换失败，沿用旧分配
    Expired,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseMovement {
    Natural,
    Direct,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollStyle {
    Variable,
    Constant,
    Jump,
}

/// 行为配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// 动作间隔抖动范围（毫秒）
    pub action_delay_range: (u64, u64),
    pub mouse_movement: MouseMovement,
    pub scroll_style: ScrollStyle,
    /// 0..=1
    pub randomness_factor: f64,
    pub behavior_profile: String,
}

impl WorkerConfig {
    /// 集群内所有 Worker 共用的模板
    pub fn template() -> Self {
        Self {
            action_delay_range: (1500, 3000),
            mouse_movement: MouseMovement::Natural,
            scroll_style: ScrollStyle::Variable,
            randomness_factor: 0.8,
            behavior_profile: "Gen-Z Content Consumer".to_string(),
        }
    }
}

/// 运行时间窗口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub active: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 休息时长范围（分钟）
    pub break_duration_range: (u32, u32),
    pub days_active: Vec<Weekday>,
}

pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl Schedule {
    /// 从 start 起持续 hours 小时，全周开放，休息 15-30 分钟；超出日期范围时截断到可表示的最大时间
    pub fn for_window(start: DateTime<Utc>, hours: f64) -> Self {
        let millis = (hours.max(0.0) * 3_600_000.0).round();
        let end_time = if millis < i64::MAX as f64 {
            Duration::try_milliseconds(millis as i64).and_then(|d| start.checked_add_signed(d))
        } else {
            None
        }
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            active: true,
            start_time: start,
            end_time,
            break_duration_range: (15, 30),
            days_active: ALL_WEEKDAYS.to_vec(),
        }
    }
}

/// 默认代理供应商（固定常量，不随 Task 变化）
pub const DEFAULT_PROXY_PROVIDER: &str = "luminati";
/// 默认代理区域
pub const DEFAULT_PROXY_REGIONS: [&str; 4] = ["us", "ca", "uk", "au"];

/// 代理轮换策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyPolicy {
    pub use_rotation: bool,
    pub rotation_frequency_minutes: u64,
    pub provider: String,
    pub regions: Vec<String>,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            use_rotation: true,
            rotation_frequency_minutes: 60,
            provider: DEFAULT_PROXY_PROVIDER.to_string(),
            regions: DEFAULT_PROXY_REGIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// WorkerConfig 的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub action_delay_range: Option<(u64, u64)>,
    pub mouse_movement: Option<MouseMovement>,
    pub scroll_style: Option<ScrollStyle>,
    pub randomness_factor: Option<f64>,
    pub behavior_profile: Option<String>,
}

impl ConfigPatch {
    pub fn apply(self, config: &mut WorkerConfig) {
        if let Some((min, max)) = self.action_delay_range {
            config.action_delay_range = (min.min(max), min.max(max));
        }
        if let Some(v) = self.mouse_movement {
            config.mouse_movement = v;
        }
        if let Some(v) = self.scroll_style {
            config.scroll_style = v;
        }
        if let Some(v) = self.randomness_factor {
            config.randomness_factor = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.behavior_profile {
            config.behavior_profile = v;
        }
    }
}

/// Schedule 的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePatch {
    pub active: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub break_duration_range: Option<(u32, u32)>,
    pub days_active: Option<Vec<Weekday>>,
}

impl SchedulePatch {
    pub fn apply(self, schedule: &mut Schedule) {
        if let Some(v) = self.active {
            schedule.active = v;
        }
        if let Some(v) = self.start_time {
            schedule.start_time = v;
        }
        if let Some(v) = self.end_time {
            schedule.end_time = v;
        }
        if let Some((min, max)) = self.break_duration_range {
            schedule.break_duration_range = (min.min(max), min.max(max));
        }
        if let Some(days) = self.days_active {
            let mut unique = Vec::with_capacity(days.len());
            for day in days {
                if !unique.contains(&day) {
                    unique.push(day);
                }
            }
            schedule.days_active = unique;
        }
    }
}

/// ProxyPolicy 的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPolicyPatch {
    pub use_rotation: Option<bool>,
    pub rotation_frequency_minutes: Option<u64>,
    pub provider: Option<String>,
    pub regions: Option<Vec<String>>,
}

impl ProxyPolicyPatch {
    pub fn apply(self, policy: &mut ProxyPolicy) {
        if let Some(v) = self.use_rotation {
            policy.use_rotation = v;
        }
        if let Some(v) = self.rotation_frequency_minutes {
            policy.rotation_frequency_minutes = v;
        }
        if let Some(v) = self.provider {
            policy.provider = v;
        }
        if let Some(v) = self.regions {
            policy.regions = v;
        }
    }
}

/// 资源消耗
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Consumption {
    /// CPU 占用 0-100
    pub cpu: f64,
    pub memory_mb: f64,
    pub network_kbps: f64,
    /// 配额使用 0-100
    pub quota: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Create,
    Start,
    Stop,
    Action,
    Config,
    IpRotation,
    Account,
    Error,
}

/// 活动日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// 创建 Worker 所需的全部描述（由集群规划产出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    pub description: String,
    pub platform: Platform,
    pub action: Action,
    /// 该 Worker 在集群中分摊的目标数，仅用于描述与日志
    pub share: u64,
    pub target_url: Option<String>,
    pub config: WorkerConfig,
    pub schedule: Schedule,
    pub proxy_policy: ProxyPolicy,
}

/// 集群单元；由 WorkerRegistry 独占
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub description: String,
    pub platform: Platform,
    pub action: Action,
    pub share: u64,
    pub target_url: Option<String>,
    pub status: WorkerStatus,
    pub consumption: Consumption,
    pub health_percentage: u8,
    pub health: HealthStatus,
    pub proxy_status: ProxyStatus,
    pub config: WorkerConfig,
    pub schedule: Schedule,
    pub proxy_policy: ProxyPolicy,
    pub assigned_proxy: Option<String>,
    pub email_accounts: Vec<String>,
    pub session_id: Option<String>,
    pub activity: VecDeque<ActivityEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
    /// 每次 start / stop / pause 递增；异步会话结果只在 epoch 未变时落地
    #[serde(skip)]
    pub(crate) run_epoch: u64,
}

impl Worker {
    pub(crate) fn from_spec(id: WorkerId, spec: WorkerSpec) -> Self {
        let now = Utc::now();
        let mut worker = Self {
            id,
            name: spec.name,
            description: spec.description,
            platform: spec.platform,
            action: spec.action,
            share: spec.share,
            target_url: spec.target_url,
            status: WorkerStatus::Idle,
            consumption: Consumption::default(),
            health_percentage: 100,
            health: HealthStatus::Healthy,
            proxy_status: ProxyStatus::Inactive,
            config: spec.config,
            schedule: spec.schedule,
            proxy_policy: spec.proxy_policy,
            assigned_proxy: None,
            email_accounts: Vec::new(),
            session_id: None,
            activity: VecDeque::new(),
            created_at: now,
            updated_at: now,
            last_active: None,
            run_epoch: 0,
        };
        worker.refresh_health();
        worker
    }

    /// 由消耗与代理状态重新推导健康度；不允许直接写 health_percentage
    pub(crate) fn refresh_health(&mut self) {
        self.health_percentage = derive_health(&self.consumption, self.proxy_status);
        self.health = HealthStatus::from_percentage(self.health_percentage);
    }

    /// 追加活动日志，超过 cap 时丢弃最旧的条目
    pub(crate) fn record(
        &mut self,
        kind: ActivityKind,
        description: impl Into<String>,
        cap: usize,
    ) -> ActivityEntry {
        let entry = ActivityEntry {
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        };
        self.activity.push_back(entry.clone());
        while self.activity.len() > cap.max(1) {
            self.activity.pop_front();
        }
        self.updated_at = entry.timestamp;
        entry
    }

    /// 仍处于 epoch 这一轮运行中
    pub fn in_run(&self, epoch: u64) -> bool {
        self.status == WorkerStatus::Running && self.run_epoch == epoch
    }

    pub fn view(&self) -> WorkerView {
        WorkerView {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            health_percentage: self.health_percentage,
            health: self.health,
            consumption: self.consumption,
            activity: self.activity.iter().cloned().collect(),
        }
    }
}

/// 面板渲染用的只读投影
#[derive(Debug, Clone, Serialize)]
pub struct WorkerView {
    pub id: WorkerId,
    pub name: String,
    pub status: WorkerStatus,
    pub health_percentage: u8,
    pub health: HealthStatus,
    pub consumption: Consumption,
    pub activity: Vec<ActivityEntry>,
}

/// 列表过滤条件；空字段表示不过滤
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerFilter {
    pub statuses: Vec<WorkerStatus>,
    pub platforms: Vec<Platform>,
    pub health: Vec<HealthStatus>,
    pub search: Option<String>,
}

impl WorkerFilter {
    pub fn matches(&self, worker: &Worker) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&worker.status) {
            return false;
        }
        if !self.platforms.is_empty() && !self.platforms.contains(&worker.platform) {
            return false;
        }
        if !self.health.is_empty() && !self.health.contains(&worker.health) {
            return false;
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            if !worker.name.to_lowercase().contains(&term)
                && !worker.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

/// 注册表广播给订阅者（UI、测试）的事件
#[derive(Debug, Clone, Serialize)]
pub struct WorkerEvent {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub health_percentage: u8,
    pub entry: ActivityEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            name: "YouTube Viewer Bot".into(),
            description: "test".into(),
            platform: Platform::Youtube,
            action: Action::View,
            share: 100,
            target_url: None,
            config: WorkerConfig::template(),
            schedule: Schedule::for_window(Utc::now(), 1.0),
            proxy_policy: ProxyPolicy::default(),
        }
    }

    #[test]
    fn test_activity_log_is_bounded() {
        let mut worker = Worker::from_spec("w1".into(), spec());
        for i in 0..60 {
            worker.record(ActivityKind::Action, format!("event {i}"), 50);
        }
        assert_eq!(worker.activity.len(), 50);
        assert_eq!(worker.activity.front().unwrap().description, "event 10");
        assert_eq!(worker.activity.back().unwrap().description, "event 59");
    }

    #[test]
    fn test_schedule_window() {
        let start = Utc::now();
        let schedule = Schedule::for_window(start, 1.5);
        assert_eq!(schedule.end_time - start, Duration::minutes(90));
        assert_eq!(schedule.days_active.len(), 7);
        assert_eq!(schedule.break_duration_range, (15, 30));
    }

    #[test]
    fn test_schedule_window_saturates() {
        let start = Utc::now();
        // 约 38 万年，超出 chrono 可表示范围
        let schedule = Schedule::for_window(start, 3.3e9);
        assert_eq!(schedule.end_time, DateTime::<Utc>::MAX_UTC);
        assert_eq!(Schedule::for_window(start, f64::INFINITY).end_time, DateTime::<Utc>::MAX_UTC);
        assert_eq!(Schedule::for_window(start, f64::NAN).end_time, start);
    }

    #[test]
    fn test_config_patch_merges() {
        let mut config = WorkerConfig::template();
        ConfigPatch {
            randomness_factor: Some(1.7),
            action_delay_range: Some((4000, 2000)),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.randomness_factor, 1.0);
        assert_eq!(config.action_delay_range, (2000, 4000));
        assert_eq!(config.behavior_profile, "Gen-Z Content Consumer");
    }

    #[test]
    fn test_schedule_patch_dedups_days() {
        let mut schedule = Schedule::for_window(Utc::now(), 1.0);
        SchedulePatch {
            days_active: Some(vec![Weekday::Mon, Weekday::Mon, Weekday::Fri]),
            ..Default::default()
        }
        .apply(&mut schedule);
        assert_eq!(schedule.days_active, vec![Weekday::Mon, Weekday::Fri]);
        assert!(schedule.active);
    }

    #[test]
    fn test_filter() {
        let worker = Worker::from_spec("w1".into(), spec());
        assert!(WorkerFilter::default().matches(&worker));
        let by_search = WorkerFilter {
            search: Some("viewer".into()),
            ..Default::default()
        };
        assert!(by_search.matches(&worker));
        let by_status = WorkerFilter {
            statuses: vec![WorkerStatus::Running],
            ..Default::default()
        };
        assert!(!by_status.matches(&worker));
    }
}
