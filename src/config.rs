//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DREAMWEAVER__*` 覆盖
//! （双下划线表示嵌套，如 `DREAMWEAVER__PIPELINE__MAX_REVISION_ATTEMPTS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

/// [pipeline] 段：修订上限、调研规模、超时
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 审核被拒后最多修订几次
    #[serde(default = "default_max_revision_attempts")]
    pub max_revision_attempts: u32,
    /// 规划阶段最多保留的搜索任务数
    #[serde(default = "default_max_searches")]
    pub max_searches: usize,
    /// 进入撰写前至少需要的调研结果数；0 表示不设下限
    #[serde(default)]
    pub min_research_results: usize,
    /// 请求中必须存在的属性名（缺失则在规划前失败）
    #[serde(default)]
    pub required_attributes: Vec<String>,
    /// 单次阶段调用（规划 / 撰写 / 审核 / 修订）超时（秒）
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// 单个搜索子任务超时（秒）
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
}

fn default_max_revision_attempts() -> u32 {
    3
}

fn default_max_searches() -> usize {
    5
}

fn default_stage_timeout_secs() -> u64 {
    120
}

fn default_search_timeout_secs() -> u64 {
    60
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_revision_attempts: default_max_revision_attempts(),
            max_searches: default_max_searches(),
            min_research_results: 0,
            required_attributes: Vec::new(),
            stage_timeout_secs: default_stage_timeout_secs(),
            search_timeout_secs: default_search_timeout_secs(),
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
        }
    }
}

/// [prompts] 段：覆盖各角色的 system prompt，未设置时用内置模板
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub planner: Option<String>,
    pub researcher: Option<String>,
    pub writer: Option<String>,
    pub guardian: Option<String>,
}

/// 从 config 目录加载配置，环境变量 DREAMWEAVER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DREAMWEAVER__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("DREAMWEAVER")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("pipeline.required_attributes")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
