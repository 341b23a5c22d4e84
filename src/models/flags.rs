//! Optional gateway behaviors, toggled from a comma-separated string.

use tracing::debug;

/// Independent feature toggles.
///
/// Recognized tokens are `disallowRobots`, `emulatePages` and
/// `listDirectories`. Unknown tokens are ignored so that newer configuration
/// keeps working with older binaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Answer `robots.txt` with a blanket disallow instead of hitting the store.
    pub disallow_robots: bool,
    /// Static-site conventions: `index.html` fallback, trailing-slash
    /// redirects, `404.html`, hidden `_headers`.
    pub emulate_pages: bool,
    /// Render an HTML index for prefixes that have no object of their own.
    pub list_directories: bool,
}

impl FeatureFlags {
    pub fn parse(raw: &str) -> Self {
        let mut flags = Self::default();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "disallowRobots" => flags.disallow_robots = true,
                "emulatePages" => flags.emulate_pages = true,
                "listDirectories" => flags.list_directories = true,
                other => debug!("ignoring unknown flag `{}`", other),
            }
        }
        flags
    }
}
