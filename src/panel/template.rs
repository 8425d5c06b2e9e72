use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Placeholder carrying the surface's security origin
pub const CSP_PLACEHOLDER: &str = "cspSource";

pub const DIFFER_TEMPLATE: &str = "views/differ/differ.html";
pub const LOADING_TEMPLATE: &str = "views/loading/loading.html";

/// Copies of the bundled templates, used when the asset root lacks them.
fn builtin(id: &str) -> Option<&'static str> {
    match id {
        DIFFER_TEMPLATE => Some(include_str!("../../assets/views/differ/differ.html")),
        LOADING_TEMPLATE => Some(include_str!("../../assets/views/loading/loading.html")),
        _ => None,
    }
}

/// Read `<asset_root>/<id>`, falling back to the embedded copy.
pub fn load_template(asset_root: &Path, id: &str) -> Result<String> {
    let path = asset_root.join(id);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => builtin(id)
            .map(|t| t.to_string())
            .with_context(|| format!("Template {} not found", path.display())),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(assets:[^{}]*|[A-Za-z_][A-Za-z0-9_-]*)\}").expect("static regex")
    })
}

/// Substitute `{cspSource}`, `{assets:<ref>}` and `{name}` placeholders in
/// one left-to-right pass. Substituted text is never scanned again, and
/// placeholders with no value are left exactly as written.
pub fn substitute<F>(
    template: &str,
    csp_source: &str,
    values: &HashMap<String, String>,
    resolve_asset: F,
) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder_pattern()
        .replace_all(template, |caps: &Captures| {
            let whole = &caps[0];
            let name = &caps[1];
            if let Some(asset) = name.strip_prefix("assets:") {
                return resolve_asset(asset).unwrap_or_else(|| whole.to_string());
            }
            if name == CSP_PLACEHOLDER {
                return csp_source.to_string();
            }
            values.get(name).cloned().unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// Resolve an asset reference found in template `template_id`.
///
/// Absolute references (`/style.css`) are relative to the asset root;
/// anything else is relative to the template's own directory. Returns
/// `None` when the reference climbs out of the asset root.
pub fn resolve_asset_path(asset_root: &Path, template_id: &str, reference: &str) -> Option<PathBuf> {
    let relative = match reference.strip_prefix('/') {
        Some(rooted) => PathBuf::from(rooted),
        None => Path::new(template_id)
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(reference),
    };

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(asset_root.join(clean))
}
