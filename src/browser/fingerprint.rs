//! Browsing-context fingerprint: what the storefront sees of the client.
//!
//! Every context gets the same shape: a desktop Windows Chrome in New York
//! with US English, a 1080p viewport, browser-like request headers, and the
//! stealth scripts registered before the first document loads.

use serde_json::{Map, Value};

/// Stealth evasion JavaScript to inject into pages.
/// Based on puppeteer-extra-plugin-stealth techniques.
///
/// Each script is self-contained; [`Fingerprint::init_script`] wraps them so
/// a failure in one doesn't stop the rest.
pub const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix permissions
    r#"
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
    );
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
            { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
        ],
        configurable: true
    });
    "#,
    // Remove automation-related properties
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
    // Fix WebGL vendor/renderer (common detection vector)
    r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) {
            return 'Intel Inc.';
        }
        if (parameter === 37446) {
            return 'Intel Iris OpenGL Engine';
        }
        return getParameter.call(this, parameter);
    };
    "#,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Context attributes applied before navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub user_agent: String,
    /// `navigator.platform` value matching the user agent.
    pub platform: String,
    /// BCP 47 locale, e.g. `en-US`.
    pub locale: String,
    /// IANA timezone, e.g. `America/New_York`.
    pub timezone: String,
    pub viewport: Viewport,
    pub geolocation: Option<Geolocation>,
    /// Extra request headers sent with every request.
    pub headers: Vec<(String, String)>,
}

const CHROME_VERSION: &str = "121";

impl Default for Fingerprint {
    fn default() -> Self {
        let user_agent = format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{CHROME_VERSION}.0.0.0 Safari/537.36"
        );
        let sec_ch_ua = format!(
            "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"{CHROME_VERSION}\", \"Chromium\";v=\"{CHROME_VERSION}\""
        );

        let headers = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Cache-Control", "no-cache"),
            ("Pragma", "no-cache"),
            ("Sec-Ch-Ua", sec_ch_ua.as_str()),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", "\"Windows\""),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Upgrade-Insecure-Requests", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            user_agent,
            platform: "Win32".to_string(),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            geolocation: Some(Geolocation {
                latitude: 40.7128,
                longitude: -74.0060,
                accuracy: 100.0,
            }),
            headers,
        }
    }
}

impl Fingerprint {
    /// Value of a configured header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Accept-Language`, derived from the locale when not set explicitly.
    pub fn accept_language(&self) -> String {
        self.header("Accept-Language")
            .map(str::to_string)
            .unwrap_or_else(|| self.locale.clone())
    }

    /// Headers as a JSON object, the shape CDP's `setExtraHTTPHeaders` wants.
    pub fn headers_json(&self) -> Value {
        let map: Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }

    /// Script to evaluate before any page script runs: the stealth set plus
    /// `navigator.languages`/`platform` overrides consistent with this
    /// fingerprint.
    pub fn init_script(&self) -> String {
        let language = self.locale.split('-').next().unwrap_or("en");
        let languages = serde_json::json!([self.locale, language]);
        let platform = Value::String(self.platform.clone());

        let overrides = format!(
            r#"
    Object.defineProperty(navigator, 'languages', {{
        get: () => {languages},
        configurable: true
    }});
    Object.defineProperty(navigator, 'platform', {{
        get: () => {platform},
        configurable: true
    }});
    "#
        );

        STEALTH_SCRIPTS
            .iter()
            .copied()
            .chain(std::iter::once(overrides.as_str()))
            .map(|script| format!("(() => {{ try {{ {script} }} catch (e) {{}} }})();"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
