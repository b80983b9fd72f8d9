use rand::seq::SliceRandom;

// Common desktop Chrome user agents
const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Launch-time identity of the browser session.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
}

impl Fingerprint {
    /// Random user agent with the given window size.
    pub fn randomized(window_width: u32, window_height: u32) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        Self {
            user_agent: user_agent.to_string(),
            window_width,
            window_height,
        }
    }

    /// Chromium command-line switches for this fingerprint.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--lang=en-US".to_string(),
        ]
    }
}
