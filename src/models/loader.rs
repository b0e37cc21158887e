use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::embedded;
use super::manifest::ModelManifest;

pub struct LoadedModel {
    pub manifest: ModelManifest,
    pub fragment_shader: String,
    /// Where the model came from, for logging.
    pub origin: String,
}

/// Discover the models directory next to the executable, falling back to the
/// crate root in development.
pub fn find_models_dir() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(ref dir) = exe_dir {
        // next to the binary, then up through target/<profile>/
        for candidate in dir.ancestors().take(3) {
            let models_dir = candidate.join("models");
            if models_dir.exists() {
                return models_dir;
            }
        }
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}

pub fn list_models() -> Result<Vec<String>> {
    let dir = find_models_dir();
    let mut names: Vec<String> = embedded::embedded_models()
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    if dir.exists() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.path().join("manifest.json").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

/// Resolve a model identifier: a directory holding `manifest.json`, a model
/// name under the models directory, or a built-in.
pub fn load_model(identifier: &str) -> Result<LoadedModel> {
    let as_path = Path::new(identifier);
    if as_path.join("manifest.json").exists() {
        return load_from_dir(as_path);
    }

    let named = find_models_dir().join(identifier);
    if named.join("manifest.json").exists() {
        return load_from_dir(&named);
    }

    if let Some(model) = embedded::embedded_model(identifier) {
        let manifest = parse_manifest(model.manifest_json, identifier)?;
        return Ok(LoadedModel {
            manifest,
            fragment_shader: model.fragment_wgsl.to_string(),
            origin: format!("built-in '{}'", identifier),
        });
    }

    anyhow::bail!(
        "Model '{}' not found. Available models: {:?}",
        identifier,
        list_models().unwrap_or_default()
    );
}

pub fn load_from_dir(dir: &Path) -> Result<LoadedModel> {
    let manifest_path = dir.join("manifest.json");
    let manifest_str = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
    let manifest = parse_manifest(&manifest_str, &manifest_path.display().to_string())?;

    let fragment_path = dir.join(&manifest.shaders.fragment);
    let fragment_shader = std::fs::read_to_string(&fragment_path)
        .with_context(|| format!("Failed to read shader: {}", fragment_path.display()))?;

    Ok(LoadedModel {
        manifest,
        fragment_shader,
        origin: dir.display().to_string(),
    })
}

fn parse_manifest(json: &str, origin: &str) -> Result<ModelManifest> {
    let manifest: ModelManifest = serde_json::from_str(json)
        .with_context(|| format!("Failed to parse manifest: {}", origin))?;
    if manifest.latent_dim == 0 {
        anyhow::bail!("Model '{}' declares a zero latent dimension", manifest.name);
    }
    Ok(manifest)
}

/// Split `key=value` overrides; malformed entries are ignored with a warning.
pub fn parse_param_overrides(params: &[String]) -> HashMap<String, String> {
    params
        .iter()
        .filter_map(|s| {
            let parsed = s.split_once('=');
            if parsed.is_none() {
                log::warn!("Ignoring malformed parameter '{}', expected key=value", s);
            }
            parsed.map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Prepend model parameters to the shader source as WGSL `const`s.
pub fn inject_params(
    shader_src: &str,
    manifest: &ModelManifest,
    overrides: &HashMap<String, String>,
) -> String {
    for key in overrides.keys() {
        if !manifest.parameters.contains_key(key) {
            log::warn!("Model '{}' has no parameter '{}'", manifest.name, key);
        }
    }

    if manifest.parameters.is_empty() {
        return shader_src.to_string();
    }

    let consts: String = manifest
        .parameters
        .iter()
        .map(|(name, def)| def.wgsl_consts(name, overrides.get(name).map(String::as_str)))
        .collect();
    format!("// Model parameters\n{}\n{}", consts, shader_src)
}
