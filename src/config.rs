//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__PROXY__PROVIDER=http`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub proxy: ProxySection,
    #[serde(default)]
    pub session: SessionSection,
}

/// [app] 段：应用名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [fleet] 段：集群创建后的行为
#[derive(Debug, Clone, Deserialize)]
pub struct FleetSection {
    /// 注册成功后是否立即启动 Worker（启动即后台建立会话）
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    /// 注册成功后是否立即为 Worker 分配首个代理
    #[serde(default = "default_assign_proxy_on_create")]
    pub assign_proxy_on_create: bool,
}

fn default_auto_start() -> bool {
    true
}

fn default_assign_proxy_on_create() -> bool {
    true
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            auto_start: default_auto_start(),
            assign_proxy_on_create: default_assign_proxy_on_create(),
        }
    }
}

/// [registry] 段：Worker 容量、并发运行上限、活动日志长度
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    /// 注册表可容纳的 Worker 总数，超出时创建失败（AllocationError）
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 同时处于 running 的 Worker 上限
    #[serde(default = "default_max_running")]
    pub max_running: usize,
    /// 每个 Worker 保留的活动日志条数
    #[serde(default = "default_activity_log_cap")]
    pub activity_log_cap: usize,
}

fn default_max_workers() -> usize {
    100
}

fn default_max_running() -> usize {
    10
}

fn default_activity_log_cap() -> usize {
    50
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_running: default_max_running(),
            activity_log_cap: default_activity_log_cap(),
        }
    }
}

/// [proxy] 段：供应商选择、探测地址、启动时是否加载
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySection {
    /// 供应商：static / file / http
    #[serde(default = "default_proxy_provider")]
    pub provider: String,
    /// static 供应商的地址列表（host:port）
    #[serde(default)]
    pub addresses: Vec<String>,
    /// file 供应商读取的 TOML 代理列表
    pub file: Option<PathBuf>,
    /// http 供应商的列表接口
    pub endpoint: Option<String>,
    /// 存放 http 供应商 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// 延迟探测请求的目标地址
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// 构建编排器时是否立即从供应商加载代理
    #[serde(default = "default_load_on_start")]
    pub load_on_start: bool,
}

fn default_proxy_provider() -> String {
    "static".to_string()
}

fn default_api_key_env() -> String {
    "HIVE_PROXY_API_KEY".to_string()
}

fn default_probe_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_load_on_start() -> bool {
    true
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            provider: default_proxy_provider(),
            addresses: Vec::new(),
            file: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
            load_on_start: default_load_on_start(),
        }
    }
}

/// [session] 段：会话建立超时与并发
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 单个 Worker 会话建立（创建会话 + 导航）的超时（秒）
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
    /// 同时进行的会话建立数上限
    #[serde(default = "default_max_concurrent_setups")]
    pub max_concurrent_setups: usize,
}

fn default_setup_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_setups() -> usize {
    5
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            setup_timeout_secs: default_setup_timeout_secs(),
            max_concurrent_setups: default_max_concurrent_setups(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
