use std::path::PathBuf;

/// Run configuration, loaded from environment variables.
pub struct Config {
    /// Ring overlay PNG; its width sets the output size.
    pub ring_path: PathBuf,
    /// Headshot used when no path is given on the command line.
    pub test_image: PathBuf,
    /// Haar cascade model file.
    pub cascade_path: PathBuf,
}

impl Config {
    /// Load configuration from `RINGSHOT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("RINGSHOT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| ringshot_core::default_model_dir());

        let cascade_path = std::env::var("RINGSHOT_CASCADE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| model_dir.join(ringshot_core::cascade::DEFAULT_CASCADE_FILE));

        Self {
            ring_path: env_path("RINGSHOT_RING_PATH", "assets/gold-ring.png"),
            test_image: env_path("RINGSHOT_TEST_IMAGE", "assets/test-headshot.jpg"),
            cascade_path,
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
