use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolve a model setting to a local file.
///
/// - `http://` / `https://` URLs are downloaded once into the cache directory.
/// - Absolute paths are used as-is.
/// - Relative paths are looked up next to the executable (and two levels
///   up, for the target/debug layout), then in the working directory.
pub fn resolve_model_path(input: &str) -> Result<PathBuf> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return fetch_cached(input);
    }

    let as_path = Path::new(input);
    if as_path.is_absolute() {
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }
        anyhow::bail!("Model not found at {}", as_path.display());
    }

    let candidates = relative_candidates(as_path);
    for candidate in &candidates {
        if candidate.exists() {
            log::info!("Using model from path: {}", candidate.display());
            return Ok(candidate.clone());
        }
    }

    anyhow::bail!(
        "Model not found at {} (searched: {})",
        input,
        candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn relative_candidates(relative: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));
    if let Some(dir) = exe_dir {
        candidates.push(dir.join(relative));
        if let Some(parent) = dir.parent() {
            candidates.push(parent.join(relative));
            if let Some(grandparent) = parent.parent() {
                candidates.push(grandparent.join(relative));
            }
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(relative));
    }
    candidates
}

fn model_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine cache directory")?;
    let dir = base.join("genrelens").join("models");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create model cache dir: {}", dir.display()))?;
    Ok(dir)
}

/// Cache file name for a URL: its last path segment.
fn cache_file_name(url: &str) -> Result<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if name.is_empty() || name.contains(':') {
        anyhow::bail!("Cannot derive a file name from model URL '{}'", url);
    }
    Ok(name.to_string())
}

fn fetch_cached(url: &str) -> Result<PathBuf> {
    let cached_path = model_cache_dir()?.join(cache_file_name(url)?);
    if cached_path.exists() {
        log::info!("Using cached model: {}", cached_path.display());
        return Ok(cached_path);
    }

    log::info!("Downloading model from {}...", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch model from {}", url))?
        .error_for_status()
        .with_context(|| format!("Model download failed: {}", url))?;
    let bytes = response.bytes().context("Failed to read model response body")?;

    // Write to a temporary name first so a partial download is never picked up.
    let partial = cached_path.with_extension("part");
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, &cached_path)
        .with_context(|| format!("Failed to move model into {}", cached_path.display()))?;

    log::info!("Model saved to {} ({} bytes)", cached_path.display(), bytes.len());
    Ok(cached_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_file_name_ignores_query() {
        assert_eq!(
            cache_file_name("https://example.com/models/genre.onnx?download=1").unwrap(),
            "genre.onnx"
        );
        assert!(cache_file_name("https://example.com/").is_err());
    }

    #[test]
    fn missing_relative_path_lists_search_locations() {
        let err = resolve_model_path("no/such/model.onnx").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Model not found"));
        assert!(msg.contains("searched"));
    }

    #[test]
    fn existing_absolute_path_resolves() {
        let path = std::env::temp_dir().join("genrelens-artifact-test.onnx");
        std::fs::write(&path, b"stub").unwrap();
        assert_eq!(resolve_model_path(path.to_str().unwrap()).unwrap(), path);
        std::fs::remove_file(&path).ok();
    }
}
