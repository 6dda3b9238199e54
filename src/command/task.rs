//! Task：从原始指令解析出的结构化意图

use std::fmt;

use serde::{Deserialize, Serialize};

/// 支持的平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Youtube,
    Spotify,
    Instagram,
    Tiktok,
    Facebook,
    Twitter,
    Telegram,
}

impl Platform {
    pub fn id(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Telegram => "telegram",
        }
    }

    /// 用于 Worker 命名的展示名
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Spotify => "Spotify",
            Platform::Instagram => "Instagram",
            Platform::Tiktok => "TikTok",
            Platform::Facebook => "Facebook",
            Platform::Twitter => "Twitter",
            Platform::Telegram => "Telegram",
        }
    }

    /// 指令里没有动作关键词时使用的默认动作
    pub fn default_action(&self) -> Action {
        match self {
            Platform::Spotify => Action::Listen,
            _ => Action::View,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Worker 执行的动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Listen,
    View,
    Like,
    Comment,
    Follow,
    Subscribe,
    React,
    Generate,
    Parse,
}

impl Action {
    pub fn id(&self) -> &'static str {
        match self {
            Action::Listen => "listen",
            Action::View => "view",
            Action::Like => "like",
            Action::Comment => "comment",
            Action::Follow => "follow",
            Action::Subscribe => "subscribe",
            Action::React => "react",
            Action::Generate => "generate",
            Action::Parse => "parse",
        }
    }

    /// Worker 名称中的角色名词，如 "YouTube Viewer Bot"
    pub fn noun(&self) -> &'static str {
        match self {
            Action::Listen => "Listener",
            Action::View => "Viewer",
            Action::Like => "Liker",
            Action::Comment => "Commenter",
            Action::Follow => "Follower",
            Action::Subscribe => "Subscriber",
            Action::React => "Reactor",
            Action::Generate => "Generator",
            Action::Parse => "Parser",
        }
    }

    /// 每分钟可完成的动作数；None 表示按固定 60 分钟估算
    pub fn throughput_per_minute(&self) -> Option<f64> {
        match self {
            Action::Listen => Some(2.0),
            Action::View => Some(5.0),
            Action::Like => Some(10.0),
            Action::Comment => Some(0.5),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// 未匹配吞吐表的动作使用的固定估算时长（分钟）
const BASELINE_MINUTES: f64 = 60.0;

/// 按吞吐表估算完成 target_count 次动作所需的小时数
pub fn estimate_duration_hours(action: Action, target_count: u64) -> f64 {
    let minutes = match action.throughput_per_minute() {
        Some(rate) => target_count as f64 / rate,
        None => BASELINE_MINUTES,
    };
    minutes / 60.0
}

/// 解析后的意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub platform: Platform,
    pub action: Action,
    pub target_count: u64,
    pub target_url: Option<String>,
    pub estimated_duration_hours: f64,
}

impl Task {
    pub fn new(platform: Platform, action: Action, target_count: u64) -> Self {
        Self {
            platform,
            action,
            target_count,
            target_url: None,
            estimated_duration_hours: estimate_duration_hours(action, target_count),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }
}
