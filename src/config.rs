//! Configuration types for page-to-deck export.
//!
//! All export behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. Every knob lives in one struct so a config can be
//! shared across tasks and logged (credentials redacted) as a whole.

use crate::cdp::BrowserSource;
use crate::error::DeckError;
use crate::progress::ExportProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default document API base URL.
pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com";
/// `Notion-Version` header sent with every document API request.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
/// Default Responses API base URL.
pub const DEFAULT_RESHAPER_BASE_URL: &str = "https://api.openai.com";
/// Default reshaper model.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// The two opaque credential strings.
///
/// Read-only to the pipeline. `Debug` never prints the values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub document_token: Option<String>,
    pub reshaper_key: Option<String>,
}

impl Credentials {
    /// The document API token, if present and non-blank.
    pub fn document_token(&self) -> Option<&str> {
        non_blank(&self.document_token)
    }

    /// The reshaper API key, if present and non-blank.
    pub fn reshaper_key(&self) -> Option<&str> {
        non_blank(&self.reshaper_key)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if non_blank(v).is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("document_token", &redact(&self.document_token))
            .field("reshaper_key", &redact(&self.reshaper_key))
            .finish()
    }
}

/// Configuration for one export.
///
/// # Example
/// ```rust
/// use page2deck::ExportConfig;
///
/// let config = ExportConfig::builder()
///     .document_token("secret_abc")
///     .reshaper_key("sk-xyz")
///     .model("gpt-5-mini")
///     .load_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_size, 100);
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    pub credentials: Credentials,

    /// Document API base URL. Default: `https://api.notion.com`.
    pub notion_base_url: String,

    /// `Notion-Version` header. Default: `2022-06-28`.
    pub notion_version: String,

    /// Blocks requested per page of results. Range 1–100. Default: 100.
    pub page_size: u32,

    /// Cap on total blocks retrieved. Default: `None` (unbounded).
    ///
    /// Exceeding the cap fails the export rather than truncating the deck.
    pub max_blocks: Option<usize>,

    /// Responses API base URL. Default: `https://api.openai.com`.
    pub reshaper_base_url: String,

    /// Reshaper model. Default: `gpt-5-mini`.
    pub model: String,

    /// `edgequake_llm` provider name (e.g. `"anthropic"`, `"ollama"`).
    /// When set, the Responses endpoint is bypassed.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom reshaper prompt. If None, uses the built-in Marp prompt.
    pub system_prompt: Option<String>,

    /// Per-reshaper-call timeout in seconds. Default: 300.
    ///
    /// Long documents produce long decks; a reasoning model can take minutes.
    pub api_timeout_secs: u64,

    /// Per-request timeout for document retrieval in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Browser used for capture. Default: launch a private headless Chrome.
    pub browser: BrowserSource,

    /// Bound on waiting for the rendered document to load, in seconds.
    /// Default: `None` (wait indefinitely).
    pub load_timeout_secs: Option<u64>,

    /// Output title. When `None`, the page's own title is used.
    pub title: Option<String>,

    /// Extra CSS appended to the slide theme.
    pub extra_css: Option<String>,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<Arc<dyn ExportProgressCallback>>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            notion_base_url: DEFAULT_NOTION_BASE_URL.to_string(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            page_size: 100,
            max_blocks: None,
            reshaper_base_url: DEFAULT_RESHAPER_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            system_prompt: None,
            api_timeout_secs: 300,
            download_timeout_secs: 120,
            browser: BrowserSource::default(),
            load_timeout_secs: None,
            title: None,
            extra_css: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("credentials", &self.credentials)
            .field("notion_base_url", &self.notion_base_url)
            .field("notion_version", &self.notion_version)
            .field("page_size", &self.page_size)
            .field("max_blocks", &self.max_blocks)
            .field("reshaper_base_url", &self.reshaper_base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("browser", &self.browser)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .field("title", &self.title)
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// The document token, or [`DeckError::MissingCredential`].
    pub fn require_document_token(&self) -> Result<&str, DeckError> {
        self.credentials
            .document_token()
            .ok_or(DeckError::MissingCredential {
                name: "document_token",
            })
    }

    /// Whether the reshaper owns its credential (pre-built or named provider).
    pub fn uses_provider(&self) -> bool {
        self.provider.is_some() || self.provider_name.is_some()
    }

    /// Fail fast if a credential needed for a full export is missing.
    ///
    /// The reshaper key is only required when no provider is configured.
    pub fn check_credentials(&self) -> Result<(), DeckError> {
        self.require_document_token()?;
        if !self.uses_provider() && self.credentials.reshaper_key().is_none() {
            return Err(DeckError::MissingCredential {
                name: "reshaper_key",
            });
        }
        Ok(())
    }
}

/// Builder for [`ExportConfig`].
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl fmt::Debug for ExportConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExportConfigBuilder {
    pub fn document_token(mut self, token: impl Into<String>) -> Self {
        self.config.credentials.document_token = Some(token.into());
        self
    }

    pub fn reshaper_key(mut self, key: impl Into<String>) -> Self {
        self.config.credentials.reshaper_key = Some(key.into());
        self
    }

    pub fn notion_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.notion_base_url = url.into();
        self
    }

    pub fn notion_version(mut self, version: impl Into<String>) -> Self {
        self.config.notion_version = version.into();
        self
    }

    pub fn page_size(mut self, n: u32) -> Self {
        self.config.page_size = n.clamp(1, 100);
        self
    }

    pub fn max_blocks(mut self, n: usize) -> Self {
        self.config.max_blocks = Some(n);
        self
    }

    pub fn reshaper_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.reshaper_base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn browser(mut self, source: BrowserSource) -> Self {
        self.config.browser = source;
        self
    }

    /// Connect to a running browser instead of launching one.
    pub fn browser_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.browser = BrowserSource::Connect {
            endpoint: endpoint.into(),
        };
        self
    }

    /// Launch this browser binary.
    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        let headless = match &self.config.browser {
            BrowserSource::Launch { headless, .. } => *headless,
            BrowserSource::Connect { .. } => true,
        };
        self.config.browser = BrowserSource::Launch {
            executable: Some(path.into()),
            headless,
        };
        self
    }

    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_timeout_secs = Some(secs);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn extra_css(mut self, css: impl Into<String>) -> Self {
        self.config.extra_css = Some(css.into());
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ExportProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Credentials are not checked here; see
    /// [`ExportConfig::check_credentials`].
    pub fn build(self) -> Result<ExportConfig, DeckError> {
        let c = &self.config;
        for (name, url) in [
            ("notion_base_url", &c.notion_base_url),
            ("reshaper_base_url", &c.reshaper_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DeckError::InvalidConfig(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if c.model.trim().is_empty() {
            return Err(DeckError::InvalidConfig("model must not be empty".into()));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(DeckError::InvalidConfig("timeouts must be ≥ 1 second".into()));
        }
        if c.load_timeout_secs == Some(0) {
            return Err(DeckError::InvalidConfig(
                "load_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        if c.max_blocks == Some(0) {
            return Err(DeckError::InvalidConfig("max_blocks must be ≥ 1 when set".into()));
        }
        if let BrowserSource::Connect { endpoint } = &c.browser {
            if endpoint.trim().is_empty() {
                return Err(DeckError::InvalidConfig("browser endpoint must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}
