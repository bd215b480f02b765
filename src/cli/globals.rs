const DEFAULT_SESSION_TTL_SECONDS: u64 = 2 * 60 * 60;

/// Runtime settings shared by the server and every request handler.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub session_ttl_seconds: u64,
    pub secure_cookies: bool,
    pub bootstrap_admin: bool,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalArgs {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            secure_cookies: false,
            bootstrap_admin: true,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_bootstrap_admin(mut self, enabled: bool) -> Self {
        self.bootstrap_admin = enabled;
        self
    }
}
