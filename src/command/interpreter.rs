//! 指令解析：原始文本 → Task
//!
//! 平台与动作均由静态关键词表匹配（关键词需出现在词首）；多处命中时取最长关键词，等长按表顺序。
//! 数量取 URL 之外的第一个整数，缺省 100；URL 取第一个 http(s) 字面量。

use std::sync::OnceLock;

use regex::Regex;

use super::task::{Action, Platform, Task};
use crate::core::InterpretationError;

/// 指令中没有数量时的默认目标数
pub const DEFAULT_TARGET_COUNT: u64 = 100;

const PLATFORM_KEYWORDS: &[(&[&str], Platform)] = &[
    (&["youtube", "youtu.be", "ютуб"], Platform::Youtube),
    (&["spotify", "спотифай"], Platform::Spotify),
    (&["instagram", "insta", "инстаграм"], Platform::Instagram),
    (&["tiktok", "tik tok", "тикток"], Platform::Tiktok),
    (&["facebook", "fb.com"], Platform::Facebook),
    (&["twitter", "tweet"], Platform::Twitter),
    (&["telegram", "t.me"], Platform::Telegram),
];

const ACTION_KEYWORDS: &[(&[&str], Action)] = &[
    (&["listen", "play", "stream", "прослуш"], Action::Listen),
    (&["view", "watch", "просмотр"], Action::View),
    (&["like", "лайк"], Action::Like),
    (&["comment", "коммент"], Action::Comment),
    (&["follow", "подпис"], Action::Follow),
    (&["subscribe", "subs"], Action::Subscribe),
    (&["react", "reaction"], Action::React),
    (&["generate", "create content"], Action::Generate),
    (&["parse", "scrape", "analyze", "collect"], Action::Parse),
];

static URL_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"\b\d+\b").unwrap())
}

/// 指令解析器：纯函数式，无状态
#[derive(Debug, Default, Clone)]
pub struct CommandInterpreter;

impl CommandInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// 解析指令；找不到平台时返回 PlatformNotIdentified（终止性，不重试）
    pub fn interpret(&self, command: &str) -> Result<Task, InterpretationError> {
        let text = command.to_lowercase();

        let platform = best_match(&text, PLATFORM_KEYWORDS)
            .ok_or(InterpretationError::PlatformNotIdentified)?;
        let action = best_match(&text, ACTION_KEYWORDS).unwrap_or_else(|| platform.default_action());

        let target_url = extract_url(command);
        let target_count = extract_count(command).unwrap_or(DEFAULT_TARGET_COUNT);

        let mut task = Task::new(platform, action, target_count);
        task.target_url = target_url;

        tracing::debug!(
            platform = %task.platform,
            action = %task.action,
            target_count = task.target_count,
            "Command interpreted"
        );
        Ok(task)
    }
}

/// 在关键词表中找最佳命中：最长关键词优先，等长时表中靠前者优先
fn best_match<T: Copy>(text: &str, table: &[(&[&str], T)]) -> Option<T> {
    let mut best: Option<(usize, T)> = None;
    for (keywords, value) in table {
        for keyword in keywords.iter() {
            if !contains_at_word_start(text, keyword) {
                continue;
            }
            let len = keyword.chars().count();
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, *value));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// keyword 是否在 text 中出现，且前一个字符不是字母数字（即位于词首）
fn contains_at_word_start(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(idx, _)| {
        text[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}

/// 第一个 http(s) URL，去掉句末标点
fn extract_url(text: &str) -> Option<String> {
    url_re().find(text).map(|m| {
        m.as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')' | '!' | '?' | '"' | '\''))
            .to_string()
    })
}

/// URL 之外的第一个正整数；0 或溢出视为未指定
fn extract_count(text: &str) -> Option<u64> {
    let without_urls = url_re().replace_all(text, " ");
    let literal = number_re().find(&without_urls)?;
    match literal.as_str().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(literal = literal.as_str(), error = %e, "Count literal out of range, using default");
            None
        }
    }
}
