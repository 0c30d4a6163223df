use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

#[derive(Deserialize)]
struct SecretFile {
    #[serde(default)]
    openai_api_key: String,
}

/// Resolve the generation API key once at startup: the JSON secrets file
/// first, then `OPENAI_API_KEY`. `None` leaves the server running with every
/// job failing on missing credentials.
pub fn load_api_key(path: &Path) -> Option<String> {
    resolve(path, std::env::var("OPENAI_API_KEY").ok())
}

fn resolve(path: &Path, env_key: Option<String>) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<SecretFile>(&bytes) {
            Ok(file) if !file.openai_api_key.trim().is_empty() => {
                info!(path = %path.display(), "loaded API key from secrets file");
                return Some(file.openai_api_key.trim().to_string());
            }
            Ok(_) => warn!(path = %path.display(), "secrets file has no openai_api_key"),
            Err(err) => warn!(path = %path.display(), error = %err, "secrets file unreadable"),
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "secrets file unreadable"),
    }
    let key = env_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    if key.is_some() {
        info!("loaded API key from OPENAI_API_KEY");
    } else {
        warn!("no OpenAI API key configured; generation jobs will fail");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_wins_over_env() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("openai.json");
        std::fs::write(&path, r#"{"openai_api_key": " sk-file "}"#).expect("write");
        assert_eq!(
            resolve(&path, Some("sk-env".into())).as_deref(),
            Some("sk-file")
        );
    }

    #[test]
    fn blank_or_missing_file_falls_back_to_env() {
        let dir = tempdir().expect("tempdir");
        let blank = dir.path().join("blank.json");
        std::fs::write(&blank, r#"{"openai_api_key": ""}"#).expect("write");
        assert_eq!(resolve(&blank, Some("sk-env".into())).as_deref(), Some("sk-env"));

        let missing = dir.path().join("missing.json");
        assert_eq!(resolve(&missing, Some("sk-env".into())).as_deref(), Some("sk-env"));

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, b"{not json").expect("write");
        assert_eq!(resolve(&corrupt, Some("sk-env".into())).as_deref(), Some("sk-env"));
    }

    #[test]
    fn nothing_configured_is_none() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(resolve(&dir.path().join("x.json"), None), None);
        assert_eq!(resolve(&dir.path().join("x.json"), Some("   ".into())), None);
    }
}
