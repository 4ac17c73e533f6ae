//! Headless Chrome engine over CDP (chromiumoxide).
//!
//! One browser process (or remote DevTools connection) is shared; every
//! crawl gets its own CDP browser context, so cookies and storage never
//! leak between requests. Contexts are disposed on close and, failing
//! that, on drop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, GrantPermissionsParams, PermissionType,
};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetCookiesParams, SetExtraHttpHeadersParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::{Handler, HandlerConfig};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AcquireError, BrowserEngineConfig, Fingerprint, PageView, RenderContext, RenderEngine,
};
use crate::sites::SiteCookie;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Resolves once no new resource has started loading for 500ms.
const NETWORK_QUIET_SCRIPT: &str = r#"
    new Promise((resolve) => {
        const quietMs = 500;
        let seen = performance.getEntriesByType('resource').length;
        let stableSince = Date.now();
        const timer = setInterval(() => {
            const count = performance.getEntriesByType('resource').length;
            if (count !== seen) {
                seen = count;
                stableSince = Date.now();
            } else if (Date.now() - stableSince >= quietMs) {
                clearInterval(timer);
                resolve(true);
            }
        }, 100);
    })
"#;

/// Find a Chrome executable: configured path, common locations, then PATH.
fn find_chrome(configured: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.clone());
        }
        warn!("Configured Chrome path {} does not exist", path.display());
    }

    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow!(
        "Chrome/Chromium not found. Please install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - Or set CHROME_PATH / BROWSER_URL"
    ))
}

/// Drive the CDP connection until it closes, then mark the engine dead.
fn spawn_handler(mut handler: Handler, alive: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
        alive.store(false, Ordering::SeqCst);
        warn!("Browser connection closed");
    })
}

struct Running {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    launched: bool,
}

/// Shared Chrome instance with an explicit start/stop lifecycle.
pub struct ChromiumEngine {
    config: BrowserEngineConfig,
    running: RwLock<Option<Running>>,
    active: Arc<AtomicUsize>,
}

impl ChromiumEngine {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            running: RwLock::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Launch Chrome, or connect to `remote_url` when configured.
    /// Starting an already running engine is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if running
            .as_ref()
            .is_some_and(|r| r.alive.load(Ordering::SeqCst))
        {
            return Ok(());
        }

        let started = match self.config.remote_url.as_deref() {
            Some(url) => self.connect_remote(url).await?,
            None => self.launch().await?,
        };
        *running = Some(started);
        Ok(())
    }

    /// Whether the engine is started and its connection is still up.
    pub async fn is_running(&self) -> bool {
        self.running
            .read()
            .await
            .as_ref()
            .is_some_and(|r| r.alive.load(Ordering::SeqCst))
    }

    /// Close the browser (or drop the remote connection).
    pub async fn stop(&self) {
        let Some(running) = self.running.write().await.take() else {
            return;
        };

        if running.launched {
            match Arc::try_unwrap(running.browser) {
                Ok(mut browser) => {
                    if let Err(e) = browser.close().await {
                        debug!("Browser close failed: {}", e);
                    }
                    let _ = browser.wait().await;
                }
                Err(_) => warn!("Browser still in use at shutdown; dropping handle"),
            }
        }
        running.handler.abort();
        info!("Browser engine stopped");
    }

    fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout)
    }

    async fn launch(&self) -> Result<Running> {
        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = find_chrome(self.config.executable.as_ref())?;
        let viewport = Fingerprint::default().viewport;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(self.handler_timeout());

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!(
                "--window-size={},{}",
                viewport.width, viewport.height
            ))
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let alive = Arc::new(AtomicBool::new(true));
        Ok(Running {
            browser: Arc::new(browser),
            handler: spawn_handler(handler, Arc::clone(&alive)),
            alive,
            launched: true,
        })
    }

    async fn connect_remote(&self, url: &str) -> Result<Running> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.command_timeout
        );

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .timeout(self.handler_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let resp: serde_json::Value = client
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("No webSocketDebuggerUrl in response"))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let handler_config = HandlerConfig {
            request_timeout: self.handler_timeout(),
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        let alive = Arc::new(AtomicBool::new(true));
        Ok(Running {
            browser: Arc::new(browser),
            handler: spawn_handler(handler, Arc::clone(&alive)),
            alive,
            launched: false,
        })
    }

    async fn open_context(
        &self,
        browser: Arc<Browser>,
        alive: Arc<AtomicBool>,
        fingerprint: &Fingerprint,
        cookies: &[SiteCookie],
    ) -> Result<ChromiumContext> {
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?
            .result
            .browser_context_id;

        self.active.fetch_add(1, Ordering::SeqCst);
        let lease = ContextLease {
            browser: Arc::clone(&browser),
            id: Some(context_id.clone()),
            active: Arc::clone(&self.active),
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("Invalid target params: {}", e))?;
        let page = browser
            .new_page(target)
            .await
            .context("Failed to open page")?;

        let context = ChromiumContext {
            page: ChromiumPage {
                page,
                budget: self.config.script_budget(),
            },
            lease,
            alive,
        };

        apply_fingerprint(&browser, &context.page.page, &context_id, fingerprint).await?;
        apply_cookies(&context.page.page, cookies).await?;

        Ok(context)
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn new_context(
        &self,
        fingerprint: &Fingerprint,
        cookies: &[SiteCookie],
    ) -> Result<Box<dyn RenderContext>, AcquireError> {
        let (browser, alive) = {
            let running = self.running.read().await;
            let running = running
                .as_ref()
                .ok_or_else(|| AcquireError::Unavailable("browser not started".to_string()))?;
            if !running.alive.load(Ordering::SeqCst) {
                return Err(AcquireError::Unavailable(
                    "browser connection lost".to_string(),
                ));
            }
            (Arc::clone(&running.browser), Arc::clone(&running.alive))
        };

        let setup = self.open_context(browser, alive, fingerprint, cookies);
        match tokio::time::timeout(self.handler_timeout(), setup).await {
            Ok(Ok(context)) => Ok(Box::new(context)),
            Ok(Err(e)) => Err(AcquireError::Unavailable(format!("{:#}", e))),
            Err(_) => Err(AcquireError::Unavailable(
                "timed out opening browser context".to_string(),
            )),
        }
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

async fn apply_fingerprint(
    browser: &Browser,
    page: &Page,
    context_id: &BrowserContextId,
    fingerprint: &Fingerprint,
) -> Result<()> {
    let user_agent = SetUserAgentOverrideParams::builder()
        .user_agent(fingerprint.user_agent.clone())
        .accept_language(fingerprint.accept_language())
        .platform(fingerprint.platform.clone())
        .build()
        .map_err(|e| anyhow!("Invalid user agent override: {}", e))?;
    page.execute(user_agent).await?;

    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
        fingerprint.headers_json(),
    )))
    .await?;

    page.execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
        .await?;
    page.execute(
        SetLocaleOverrideParams::builder()
            .locale(fingerprint.locale.clone())
            .build(),
    )
    .await?;
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(fingerprint.viewport.width),
        i64::from(fingerprint.viewport.height),
        1.0,
        false,
    ))
    .await?;

    if let Some(geo) = fingerprint.geolocation {
        let grant = GrantPermissionsParams::builder()
            .permissions(vec![PermissionType::Geolocation])
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| anyhow!("Invalid permission grant: {}", e))?;
        browser.execute(grant).await?;

        page.execute(
            SetGeolocationOverrideParams::builder()
                .latitude(geo.latitude)
                .longitude(geo.longitude)
                .accuracy(geo.accuracy)
                .build(),
        )
        .await?;
    }

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        fingerprint.init_script(),
    ))
    .await?;

    Ok(())
}

async fn apply_cookies(page: &Page, cookies: &[SiteCookie]) -> Result<()> {
    if cookies.is_empty() {
        return Ok(());
    }

    let params = cookies
        .iter()
        .map(|cookie| {
            CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone())
                .path(cookie.path.clone())
                .build()
                .map_err(|e| anyhow!("Failed to build cookie {}: {}", cookie.name, e))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("Setting {} site cookies", params.len());
    page.execute(SetCookiesParams::new(params)).await?;
    Ok(())
}

async fn dispose_context(browser: &Browser, id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(id))
        .await
    {
        debug!("Failed to dispose browser context: {}", e);
    }
}

/// Ownership of one CDP browser context. Disposes it when dropped unless
/// already released.
struct ContextLease {
    browser: Arc<Browser>,
    id: Option<BrowserContextId>,
    active: Arc<AtomicUsize>,
}

impl ContextLease {
    async fn release(&mut self) {
        if let Some(id) = self.id.take() {
            dispose_context(&self.browser, id).await;
        }
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let browser = Arc::clone(&self.browser);
                    handle.spawn(async move { dispose_context(&browser, id).await });
                }
                Err(_) => warn!("No runtime to dispose browser context; it will leak"),
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One isolated Chrome browsing context holding a single page.
pub struct ChromiumContext {
    page: ChromiumPage,
    lease: ContextLease,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AcquireError> {
        let deadline = tokio::time::Instant::now() + timeout;
        info!("Navigating to {}", url);

        match tokio::time::timeout_at(deadline, self.page.page.goto(url)).await {
            Err(_) | Ok(Err(CdpError::Timeout)) => return Err(AcquireError::Timeout),
            Ok(Err(e)) if !self.alive.load(Ordering::SeqCst) => {
                return Err(AcquireError::Unavailable(e.to_string()))
            }
            Ok(Err(e)) => return Err(AcquireError::Navigation(e.to_string())),
            Ok(Ok(_)) => {}
        }

        match tokio::time::timeout_at(deadline, self.page.page.evaluate(NETWORK_QUIET_SCRIPT))
            .await
        {
            Err(_) => return Err(AcquireError::Timeout),
            Ok(Err(e)) => debug!("Network quiet check failed: {}", e),
            Ok(Ok(_)) => {}
        }

        // Chrome swaps in an internal error page when the load itself fails.
        let landed = self.page.url().await.unwrap_or_default();
        if landed.starts_with("chrome-error://") {
            return Err(AcquireError::Navigation(format!("failed to load {}", url)));
        }

        Ok(())
    }

    fn page(&self) -> &dyn PageView {
        &self.page
    }

    async fn close(mut self: Box<Self>) {
        self.lease.release().await;
    }
}

/// Run a page read, failing once `budget` has elapsed.
async fn within<T>(budget: Duration, read: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(budget, read)
        .await
        .map_err(|_| anyhow!("page did not respond within {:?}", budget))?
}

/// [`PageView`] over a CDP page; every DOM read is a small script bounded
/// by `budget`.
struct ChromiumPage {
    page: Page,
    budget: Duration,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        within(self.budget, async {
            self.page
                .evaluate(script)
                .await
                .context("Script evaluation failed")?
                .into_value::<T>()
                .map_err(|e| anyhow!("Unexpected script result: {}", e))
        })
        .await
    }
}

#[async_trait]
impl PageView for ChromiumPage {
    async fn url(&self) -> Result<String> {
        within(self.budget, async {
            Ok(self
                .page
                .url()
                .await
                .context("Failed to get URL")?
                .map(|u| u.to_string())
                .unwrap_or_default())
        })
        .await
    }

    async fn title(&self) -> Result<String> {
        self.eval("document.title || ''".to_string()).await
    }

    async fn body_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn select_text(&self, selector: &str) -> Result<Option<String>> {
        let found: Vec<String> = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); return el ? [el.textContent || ''] : []; }})()",
                json!(selector)
            ))
            .await?;
        Ok(found.into_iter().next().map(|t| t.trim().to_string()))
    }

    async fn select_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let found: Vec<String> = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); const v = el ? el.getAttribute({}) : null; return v === null ? [] : [v]; }})()",
                json!(selector),
                json!(name)
            ))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn select_all_text(&self, selector: &str) -> Result<Vec<String>> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({})).map(el => el.textContent || '')",
            json!(selector)
        ))
        .await
    }

    async fn click_if_visible(&self, selector: &str) -> Result<bool> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelector({});
                if (!el) return false;
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                if (rect.width === 0 || rect.height === 0 || style.visibility === 'hidden' || style.display === 'none') return false;
                el.click();
                return true;
            }})()"#,
            json!(selector)
        ))
        .await
    }

    async fn scroll_to(&self, y: i64) -> Result<()> {
        let _: bool = self
            .eval(format!("(() => {{ window.scrollTo(0, {}); return true; }})()", y))
            .await?;
        Ok(())
    }
}
