pub mod defaults {
    use crate::ResourceLimits;
    use tokio::time::Duration;

    pub fn default_test_limits() -> ResourceLimits {
        #[cfg(target_os = "linux")]
        {
            ResourceLimits {
                cpu_time: 5,                   // 5 seconds
                memory: 256 * 1024 * 1024,     // 256MB
                file_size: 10 * 1024 * 1024,   // 10MB
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            // RSS accounting is unreliable off Linux; budget generously
            ResourceLimits {
                cpu_time: 5,
                memory: 4 * 1024 * 1024 * 1024,
                file_size: 10 * 1024 * 1024,
            }
        }
    }

    pub fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn extended_timeout() -> Duration {
        Duration::from_secs(20)
    }
}

pub fn skip_if_not_available(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools
        .iter()
        .filter(|tool| which::which(**tool).is_err())
        .map(|s| (*s).to_string())
        .collect();

    if !missing.is_empty() {
        eprintln!("Skipping test: {} not available", missing.join(", "));
        return true;
    }
    false
}
